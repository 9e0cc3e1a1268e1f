pub mod cache;
pub mod dataset;
pub mod interactions;
pub mod kv;
pub mod redis;

pub use cache::RecommendationCache;
pub use dataset::{static_fallback, Dataset};
pub use interactions::InteractionLog;
pub use kv::{KvStore, MemoryKv};
pub use redis::{create_redis_client, RedisKv};
