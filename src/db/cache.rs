use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::db::kv::KvStore;
use crate::error::{AppError, AppResult};
use crate::models::{CachedRecommendations, Recommendation, Restaurant};

const LAST_KNOWN_GOOD_KEY: &str = "recs:last_known_good";
const ENRICHMENTS_KEY: &str = "recs:enrichments";

fn normalized(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Durable cache of recommendation results and generative enrichments.
///
/// Writes are append-and-dedup: the stored set only ever gains unique
/// entries. Each mutation holds the writer lock from read through
/// committed put, so concurrent requests cannot lose each other's
/// updates. A failed commit surfaces as `CacheWrite` for the caller to
/// log and drop.
pub struct RecommendationCache {
    kv: Arc<dyn KvStore>,
    writer: Mutex<()>,
}

impl RecommendationCache {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            writer: Mutex::new(()),
        }
    }

    /// Reads the last-known-good recommendation set
    pub async fn read_last_known_good(&self) -> AppResult<CachedRecommendations> {
        match self.kv.get(LAST_KNOWN_GOOD_KEY).await? {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| AppError::CacheRead(format!("Cache deserialization error: {}", e))),
            None => Ok(CachedRecommendations::default()),
        }
    }

    /// Merges fresh results into the stored set, keeping every
    /// previously stored unique entry
    pub async fn append_recommendations(&self, fresh: &[Recommendation]) -> AppResult<()> {
        let _guard = self.writer.lock().await;

        let mut stored = match self.read_last_known_good().await {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!(error = %e, "Cache read failed before append, starting empty");
                CachedRecommendations::default()
            }
        };

        for rec in fresh {
            let duplicate = stored.entries.iter_mut().find(|existing| {
                normalized(&existing.restaurant.name) == normalized(&rec.restaurant.name)
            });
            match duplicate {
                Some(existing) => {
                    // Keep the better score and remember every source
                    if rec.score > existing.score {
                        existing.score = rec.score;
                        existing.rationale = rec.rationale.clone();
                    }
                    existing.sources.extend(rec.sources.iter().copied());
                }
                None => stored.entries.push(rec.clone()),
            }
        }
        stored.stored_at = Some(Utc::now());

        self.commit(LAST_KNOWN_GOOD_KEY, &stored).await
    }

    /// Previously fetched generative restaurants
    pub async fn read_enrichments(&self) -> AppResult<Vec<Restaurant>> {
        match self.kv.get(ENRICHMENTS_KEY).await? {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| AppError::CacheRead(format!("Cache deserialization error: {}", e))),
            None => Ok(Vec::new()),
        }
    }

    /// Stores generative restaurants, skipping ones already present by
    /// normalized name or address. Returns the entries actually added.
    pub async fn append_enrichments(&self, fetched: &[Restaurant]) -> AppResult<Vec<Restaurant>> {
        let _guard = self.writer.lock().await;

        let mut stored = match self.read_enrichments().await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "Enrichment read failed before append, starting empty");
                Vec::new()
            }
        };

        let mut added = Vec::new();
        for restaurant in fetched {
            let duplicate = stored.iter().chain(added.iter()).any(|existing| {
                normalized(&existing.name) == normalized(&restaurant.name)
                    || (!restaurant.address.trim().is_empty()
                        && normalized(&existing.address) == normalized(&restaurant.address))
            });
            if !duplicate {
                added.push(restaurant.clone());
            }
        }

        if !added.is_empty() {
            stored.extend(added.iter().cloned());
            self.commit(ENRICHMENTS_KEY, &stored).await?;
        }

        Ok(added)
    }

    /// Serializes and commits under the held writer lock
    async fn commit<T: serde::Serialize>(&self, key: &str, value: &T) -> AppResult<()> {
        let json = serde_json::to_string(value)
            .map_err(|e| AppError::CacheWrite(format!("Cache serialization error: {}", e)))?;
        self.kv
            .put(key, json)
            .await
            .map_err(|e| AppError::CacheWrite(format!("Cache commit failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::kv::MemoryKv;
    use crate::models::SourceLabel;
    use std::collections::{BTreeSet, HashMap};

    fn restaurant(id: u32, name: &str, address: &str) -> Restaurant {
        Restaurant {
            id,
            name: name.to_string(),
            cuisine: "italian".to_string(),
            location: "Downtown".to_string(),
            address: address.to_string(),
            contact_details: None,
            ambiance: String::new(),
            popular_dishes: vec![],
            dietary_options: vec![],
            price_range: String::new(),
            mood_scores: HashMap::new(),
            occasion_scores: HashMap::new(),
            time_scores: HashMap::new(),
            ephemeral: false,
        }
    }

    fn rec(id: u32, name: &str, score: f64, source: SourceLabel) -> Recommendation {
        Recommendation {
            restaurant: restaurant(id, name, ""),
            score,
            rationale: "match".to_string(),
            sources: BTreeSet::from([source]),
        }
    }

    #[tokio::test]
    async fn test_append_never_loses_stored_entries() {
        let cache = RecommendationCache::new(Arc::new(MemoryKv::new()));

        cache
            .append_recommendations(&[rec(1, "Bella Napoli", 0.8, SourceLabel::Content)])
            .await
            .unwrap();
        cache
            .append_recommendations(&[rec(2, "Taco Verde", 0.7, SourceLabel::Search)])
            .await
            .unwrap();

        let stored = cache.read_last_known_good().await.unwrap();
        assert_eq!(stored.entries.len(), 2);
        assert!(stored.stored_at.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_appends_preserve_every_unique_entry() {
        let cache = Arc::new(RecommendationCache::new(Arc::new(MemoryKv::new())));

        let mut tasks = Vec::new();
        for i in 0..10u32 {
            let cache = cache.clone();
            tasks.push(tokio::spawn(async move {
                cache
                    .append_recommendations(&[rec(
                        i,
                        &format!("Place {}", i),
                        0.5,
                        SourceLabel::Content,
                    )])
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let stored = cache.read_last_known_good().await.unwrap();
        assert_eq!(stored.entries.len(), 10);
    }

    #[tokio::test]
    async fn test_append_dedups_by_name_keeping_higher_score() {
        let cache = RecommendationCache::new(Arc::new(MemoryKv::new()));

        cache
            .append_recommendations(&[rec(1, "Bella Napoli", 0.6, SourceLabel::Content)])
            .await
            .unwrap();
        cache
            .append_recommendations(&[rec(1, "bella napoli", 0.9, SourceLabel::Generative)])
            .await
            .unwrap();

        let stored = cache.read_last_known_good().await.unwrap();
        assert_eq!(stored.entries.len(), 1);
        assert_eq!(stored.entries[0].score, 0.9);
        assert!(stored.entries[0].sources.contains(&SourceLabel::Content));
        assert!(stored.entries[0].sources.contains(&SourceLabel::Generative));
    }

    #[tokio::test]
    async fn test_enrichments_skip_duplicates_by_address() {
        let cache = RecommendationCache::new(Arc::new(MemoryKv::new()));

        let added = cache
            .append_enrichments(&[restaurant(100, "Sakura", "1 Oak Ave")])
            .await
            .unwrap();
        assert_eq!(added.len(), 1);

        // Same address, different name: still a duplicate
        let added = cache
            .append_enrichments(&[restaurant(101, "Sakura Sushi", "1 Oak Ave")])
            .await
            .unwrap();
        assert!(added.is_empty());

        let stored = cache.read_enrichments().await.unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn test_read_corrupt_cache_is_a_cache_read_error() {
        let kv = Arc::new(MemoryKv::new());
        kv.put(LAST_KNOWN_GOOD_KEY, "not json".to_string())
            .await
            .unwrap();
        let cache = RecommendationCache::new(kv);

        let err = cache.read_last_known_good().await.unwrap_err();
        assert!(matches!(err, AppError::CacheRead(_)));
    }
}
