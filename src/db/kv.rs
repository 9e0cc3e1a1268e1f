use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::AppResult;

/// Transactional key-value interface backing the durable stores.
///
/// Any store with atomic full-value replace can implement this; scoring
/// logic never sees the concrete backend. `put` must be replace-or-fail,
/// never partial. Read-modify-write cycles are serialized by each
/// higher-level store's writer lock, which the store holds until the
/// put has committed.
#[async_trait::async_trait]
pub trait KvStore: Send + Sync {
    /// Reads the last fully committed value for a key
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Atomically replaces the value for a key
    async fn put(&self, key: &str, value: String) -> AppResult<()>;
}

/// In-memory KV store for tests and single-process deployments
#[derive(Clone, Default)]
pub struct MemoryKv {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: String) -> AppResult<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }
}
