use redis::{AsyncCommands, Client};

use crate::db::kv::KvStore;
use crate::error::AppResult;

/// Creates a Redis client for the durable stores
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Redis-backed KV store.
///
/// Each SET is an atomic full-value replace and is awaited, so a caller
/// holding a writer lock across a read-modify-write cycle releases it
/// only after the new value is committed.
#[derive(Clone)]
pub struct RedisKv {
    client: Client,
}

impl RedisKv {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl KvStore for RedisKv {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: String) -> AppResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn.set(key, value).await?;
        Ok(())
    }
}
