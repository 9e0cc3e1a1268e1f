use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{PreferenceRecord, Restaurant};
use crate::services::resilience::{retry, RetryPolicy};

/// Upper bound on suggestions merged from one generative call
const MAX_SUGGESTIONS: usize = 5;

const SYSTEM_PROMPT: &str = "You are a restaurant recommendation assistant. \
    Respond with a JSON array of restaurant objects and nothing else. Each \
    object must have the fields: restaurantName, cuisine, location, address, \
    ambiance, popularDishes (array of strings), dietaryOptions (array of \
    strings), priceRange.";

/// Text-completion backend for the generative recommender
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> AppResult<String>;
}

/// OpenAI-compatible chat-completions client
pub struct OpenAiClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(config: &Config, api_key: String) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.generative_timeout_ms))
            .build()?;
        Ok(Self {
            http,
            api_url: config.generative_api_url.clone(),
            api_key,
            model: "gpt-4o-mini".to_string(),
        })
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[async_trait]
impl GenerativeClient for OpenAiClient {
    async fn complete(&self, system: &str, user: &str) -> AppResult<String> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "temperature": 0.7,
        });

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::UpstreamUnavailable(format!(
                "Generative service returned {}",
                status
            )));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            AppError::UpstreamUnavailable(format!("Malformed completion envelope: {}", e))
        })?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AppError::UpstreamUnavailable("Completion had no choices".to_string()))
    }
}

/// One suggested restaurant as returned by the model. Every field but
/// the name is optional; the model frequently omits some.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Suggestion {
    restaurant_name: String,
    #[serde(default)]
    cuisine: String,
    #[serde(default)]
    location: String,
    #[serde(default)]
    address: String,
    #[serde(default)]
    contact_details: Option<String>,
    #[serde(default)]
    ambiance: String,
    #[serde(default)]
    popular_dishes: Vec<String>,
    #[serde(default)]
    dietary_options: Vec<String>,
    #[serde(default)]
    price_range: String,
}

/// Fetches model-generated restaurant suggestions with retry, and
/// converts them into ephemeral pool entries.
pub struct GenerativeAdapter {
    client: Arc<dyn GenerativeClient>,
    policy: RetryPolicy,
}

impl GenerativeAdapter {
    pub fn new(client: Arc<dyn GenerativeClient>, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// Builds the user prompt from the full preference bundle. Free-text
    /// query and notes lead so the model anchors on them.
    fn build_prompt(prefs: &PreferenceRecord) -> String {
        let mut lines = Vec::new();
        if let Some(query) = &prefs.search_query {
            lines.push(format!("Looking for: {}", query));
        }
        if let Some(notes) = &prefs.additional_notes {
            lines.push(format!("Additional notes: {}", notes));
        }
        lines.push(format!(
            "Preferences: mood {}, occasion {}, cuisine {}, dietary preference {}, time {}.",
            prefs.mood, prefs.occasion, prefs.cuisine, prefs.dietary_preference, prefs.time
        ));
        if !prefs.location.is_empty() {
            lines.push(format!("Area: {}.", prefs.location));
        }
        lines.push(format!(
            "Suggest up to {} real-sounding restaurants that fit.",
            MAX_SUGGESTIONS
        ));
        lines.join("\n")
    }

    /// Parses the model output into restaurants. Tolerates markdown code
    /// fences and a single object in place of an array; anything else is
    /// a failed attempt.
    fn parse_suggestions(raw: &str, next_id: u32) -> AppResult<Vec<Restaurant>> {
        let trimmed = raw.trim();
        let stripped = trimmed
            .strip_prefix("```json")
            .or_else(|| trimmed.strip_prefix("```"))
            .and_then(|s| s.strip_suffix("```"))
            .unwrap_or(trimmed)
            .trim();

        let value: Value = serde_json::from_str(stripped).map_err(|e| {
            AppError::UpstreamUnavailable(format!("Suggestions were not valid JSON: {}", e))
        })?;
        let items = match value {
            Value::Array(items) => items,
            object @ Value::Object(_) => vec![object],
            _ => {
                return Err(AppError::UpstreamUnavailable(
                    "Suggestions were not a JSON array".to_string(),
                ))
            }
        };

        let mut restaurants = Vec::new();
        for (offset, item) in items.into_iter().take(MAX_SUGGESTIONS).enumerate() {
            let suggestion: Suggestion = match serde_json::from_value(item) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping malformed suggestion");
                    continue;
                }
            };
            if suggestion.restaurant_name.trim().is_empty() {
                continue;
            }
            restaurants.push(Restaurant {
                id: next_id + offset as u32,
                name: suggestion.restaurant_name.trim().to_string(),
                cuisine: suggestion.cuisine.to_lowercase(),
                location: suggestion.location,
                address: suggestion.address,
                contact_details: suggestion.contact_details,
                ambiance: suggestion.ambiance,
                popular_dishes: suggestion.popular_dishes,
                dietary_options: suggestion.dietary_options,
                price_range: suggestion.price_range,
                mood_scores: Default::default(),
                occasion_scores: Default::default(),
                time_scores: Default::default(),
                ephemeral: true,
            });
        }
        Ok(restaurants)
    }

    /// Fetches suggestions for one request. Ids are assigned starting
    /// from `next_id` so the entries never collide with the pool.
    pub async fn fetch(
        &self,
        prefs: &PreferenceRecord,
        next_id: u32,
    ) -> AppResult<Vec<Restaurant>> {
        let prompt = Self::build_prompt(prefs);
        retry(&self.policy, AppError::is_retryable, |_attempt| {
            let prompt = prompt.clone();
            async move {
                let raw = self.client.complete(SYSTEM_PROMPT, &prompt).await?;
                Self::parse_suggestions(&raw, next_id)
            }
        })
        .await
    }
}
