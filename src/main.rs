use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use palate_api::api::{create_router, AppState};
use palate_api::config::Config;
use palate_api::db::{
    create_redis_client, Dataset, InteractionLog, KvStore, MemoryKv, RecommendationCache, RedisKv,
};
use palate_api::services::{
    GenerativeAdapter, OpenAiClient, RecommendationEngine, RetryPolicy,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "palate_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    // Redis is preferred; an in-memory store keeps the service usable
    // without it
    let kv: Arc<dyn KvStore> = match create_redis_client(&config.redis_url) {
        Ok(client) => {
            tracing::info!(url = %config.redis_url, "Using Redis store");
            Arc::new(RedisKv::new(client))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Redis unavailable, using in-memory store");
            Arc::new(MemoryKv::new())
        }
    };

    let cache = Arc::new(RecommendationCache::new(kv.clone()));
    let interactions = Arc::new(InteractionLog::new(kv));

    let dataset = Dataset::load(&config.dataset_path);
    tracing::info!(
        restaurants = dataset.restaurants.len(),
        path = %config.dataset_path,
        "Dataset loaded"
    );

    let generative = match &config.generative_api_key {
        Some(api_key) => {
            let client = OpenAiClient::new(&config, api_key.clone())?;
            let policy = RetryPolicy::from_config(&config);
            tracing::info!("Generative suggestions enabled");
            Some(GenerativeAdapter::new(Arc::new(client), policy))
        }
        None => {
            tracing::info!("No generative API key, suggestions disabled");
            None
        }
    };

    let engine = Arc::new(RecommendationEngine::new(
        config.clone(),
        dataset,
        cache,
        interactions.clone(),
        generative,
    ));

    let state = AppState::new(engine, interactions);
    let app = create_router(state, &config.frontend_origin);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
