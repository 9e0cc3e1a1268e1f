use serde::Deserialize;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Generative service API key; adapter stays inactive without one
    #[serde(default)]
    pub generative_api_key: Option<String>,

    /// Generative service base URL (OpenAI-compatible chat endpoint)
    #[serde(default = "default_generative_api_url")]
    pub generative_api_url: String,

    /// Path to the restaurant dataset JSON file
    #[serde(default = "default_dataset_path")]
    pub dataset_path: String,

    /// Allowed CORS origin for the frontend
    #[serde(default = "default_frontend_origin")]
    pub frontend_origin: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum recommendations returned per request
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Neighbors considered by the collaborative recommender
    #[serde(default = "default_top_k_similar")]
    pub top_k_similar: usize,

    /// Minimum relevance score for text-search matches
    #[serde(default = "default_min_relevance")]
    pub min_relevance: f64,

    /// Fuzzy name-similarity ratio above which two entries are merged
    #[serde(default = "default_dedup_name_threshold")]
    pub dedup_name_threshold: f64,

    /// Maximum attempts against the generative service
    #[serde(default = "default_max_attempts")]
    pub generative_max_attempts: u32,

    /// Exponential backoff base delay in milliseconds
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Backoff ceiling in milliseconds
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Per-attempt timeout for generative calls, milliseconds
    #[serde(default = "default_generative_timeout_ms")]
    pub generative_timeout_ms: u64,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_generative_api_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_dataset_path() -> String {
    "data/restaurants.json".to_string()
}

fn default_frontend_origin() -> String {
    "http://localhost:9002".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_results() -> usize {
    9
}

fn default_top_k_similar() -> usize {
    5
}

fn default_min_relevance() -> f64 {
    0.1
}

fn default_dedup_name_threshold() -> f64 {
    0.85
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    250
}

fn default_backoff_max_ms() -> u64 {
    5_000
}

fn default_generative_timeout_ms() -> u64 {
    10_000
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }
}

impl Default for Config {
    fn default() -> Self {
        // envy fills every field from its serde default when the
        // environment is empty; mirror that here for tests
        Config {
            redis_url: default_redis_url(),
            generative_api_key: None,
            generative_api_url: default_generative_api_url(),
            dataset_path: default_dataset_path(),
            frontend_origin: default_frontend_origin(),
            host: default_host(),
            port: default_port(),
            max_results: default_max_results(),
            top_k_similar: default_top_k_similar(),
            min_relevance: default_min_relevance(),
            dedup_name_threshold: default_dedup_name_threshold(),
            generative_max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            generative_timeout_ms: default_generative_timeout_ms(),
        }
    }
}
