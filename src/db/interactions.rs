use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::kv::KvStore;
use crate::error::{AppError, AppResult};
use crate::models::Interaction;

const LOG_KEY: &str = "interactions:log";

/// Append-only log of user interactions.
///
/// Appends are serialized through a writer lock and committed with an
/// awaited atomic replace, so a snapshot never observes a partial
/// write. Reads see the last committed state only.
pub struct InteractionLog {
    kv: Arc<dyn KvStore>,
    writer: Mutex<()>,
}

impl InteractionLog {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            writer: Mutex::new(()),
        }
    }

    /// Appends one interaction to the log
    pub async fn append(&self, interaction: Interaction) -> AppResult<()> {
        let _guard = self.writer.lock().await;

        let mut log = self.read_committed().await?;
        log.push(interaction);

        let json = serde_json::to_string(&log)
            .map_err(|e| AppError::Internal(format!("Interaction serialization error: {}", e)))?;
        self.kv.put(LOG_KEY, json).await?;

        tracing::debug!(total = log.len(), "Interaction appended");
        Ok(())
    }

    /// Snapshot of every committed interaction
    pub async fn snapshot(&self) -> AppResult<Vec<Interaction>> {
        self.read_committed().await
    }

    async fn read_committed(&self) -> AppResult<Vec<Interaction>> {
        match self.kv.get(LOG_KEY).await? {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| AppError::Internal(format!("Interaction deserialization error: {}", e))),
            None => Ok(Vec::new()),
        }
    }
}
