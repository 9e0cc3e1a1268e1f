use std::collections::BTreeSet;
use std::fmt::Display;
use std::sync::Arc;

use crate::config::Config;
use crate::db::{static_fallback, Dataset, InteractionLog, RecommendationCache};
use crate::error::{AppError, AppResult};
use crate::models::{
    DietaryPreference, PreferenceRecord, RawPreferences, Recommendation, Restaurant, SourceLabel,
};
use crate::services::aggregator::{Aggregator, SourceScores};
use crate::services::collaborative::CollaborativeModel;
use crate::services::content::ContentScorer;
use crate::services::generative::GenerativeAdapter;
use crate::services::resilience::{with_fallbacks, Degraded};
use crate::services::search::{extract_query_preferences, TextIndex};
use crate::services::weights::WeightPolicy;

/// Multiplier for text-search matches before aggregation
const SEARCH_BOOST: f64 = 1.2;
/// Novelty multiplier for freshly fetched generative entries
const GENERATIVE_BOOST: f64 = 1.1;
/// Raw collaborative scores are similarity sums; rescaled into [0,1]
const COLLABORATIVE_SCALE: f64 = 5.0;

/// Lifecycle of one recommendation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Validating,
    Scoring,
    Aggregating,
    Complete,
    Degraded,
    Failed,
}

impl Display for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RequestState::Validating => "validating",
            RequestState::Scoring => "scoring",
            RequestState::Aggregating => "aggregating",
            RequestState::Complete => "complete",
            RequestState::Degraded => "degraded",
            RequestState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

fn transition(state: RequestState) {
    tracing::debug!(state = %state, "Request state");
}

/// Orchestrates the full hybrid pipeline: normalization, concurrent
/// local scoring, sequential generative enrichment, weight
/// redistribution, aggregation, and the degradation ladder.
pub struct RecommendationEngine {
    config: Config,
    base_pool: Vec<Restaurant>,
    cache: Arc<RecommendationCache>,
    interactions: Arc<InteractionLog>,
    generative: Option<GenerativeAdapter>,
    content: ContentScorer,
    weights: WeightPolicy,
}

impl RecommendationEngine {
    pub fn new(
        config: Config,
        dataset: Dataset,
        cache: Arc<RecommendationCache>,
        interactions: Arc<InteractionLog>,
        generative: Option<GenerativeAdapter>,
    ) -> Self {
        Self {
            config,
            base_pool: dataset.restaurants,
            cache,
            interactions,
            generative,
            content: ContentScorer::default(),
            weights: WeightPolicy::default(),
        }
    }

    pub fn generative_enabled(&self) -> bool {
        self.generative.is_some()
    }

    pub fn pool_size(&self) -> usize {
        self.base_pool.len()
    }

    /// Runs the pipeline for one request. Validation errors surface as
    /// 400s; any later failure walks the cache-then-static ladder, so
    /// the only hard failure mode is `Terminal`.
    pub async fn recommend(
        &self,
        raw: RawPreferences,
        use_ai_fetch: bool,
    ) -> AppResult<Degraded<Vec<Recommendation>>> {
        transition(RequestState::Validating);
        let mut prefs = PreferenceRecord::normalize(raw)?;
        apply_query_overrides(&mut prefs);

        let result = with_fallbacks(
            self.run_pipeline(&prefs, use_ai_fetch),
            async {
                let cached = self.cache.read_last_known_good().await?;
                if cached.entries.is_empty() {
                    return Ok(None);
                }
                // The stored set grows append-only; serve its best slice
                let mut entries = cached.entries;
                entries.sort_by(|a, b| {
                    b.score
                        .partial_cmp(&a.score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                entries.truncate(self.config.max_results);
                Ok(Some(entries))
            },
            || fallback_recommendations(prefs.dietary_preference),
        )
        .await;

        match &result {
            Ok(outcome) if outcome.degraded => transition(RequestState::Degraded),
            Ok(_) => transition(RequestState::Complete),
            Err(_) => transition(RequestState::Failed),
        }
        result
    }

    async fn run_pipeline(
        &self,
        prefs: &PreferenceRecord,
        use_ai_fetch: bool,
    ) -> AppResult<Vec<Recommendation>> {
        transition(RequestState::Scoring);

        // A failed contributor only zeroes its weight while other
        // sources can still fill the result set. It becomes a pipeline
        // error below if nothing fills it.
        let mut source_failed = false;

        // Immutable pool snapshot: dataset plus persisted enrichments
        let mut pool = self.base_pool.clone();
        match self.cache.read_enrichments().await {
            Ok(enrichments) => pool.extend(enrichments),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping enrichments");
                source_failed = true;
            }
        }

        // Generative enrichment runs before the local scorers so its
        // entries join the snapshot
        let mut generative_scores: Vec<(u32, f64)> = Vec::new();
        if use_ai_fetch && wants_generative(prefs) {
            if let Some(adapter) = &self.generative {
                let next_id = pool.iter().map(|r| r.id).max().unwrap_or(0) + 1;
                match adapter.fetch(prefs, next_id).await {
                    Ok(fetched) if !fetched.is_empty() => {
                        let added = match self.cache.append_enrichments(&fetched).await {
                            Ok(added) => added,
                            Err(e) => {
                                tracing::warn!(error = %e, "Enrichment persistence failed");
                                fetched
                            }
                        };
                        for restaurant in &added {
                            let score = generative_match_score(restaurant, prefs);
                            generative_scores
                                .push((restaurant.id, (score * GENERATIVE_BOOST).min(1.0)));
                        }
                        pool.extend(added);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "Generative suggestions unavailable");
                        source_failed = true;
                    }
                }
            }
        }

        let index = TextIndex::build(&pool);

        let content_task = async { self.content.score_pool(prefs, &pool, &index) };
        let search_task = async {
            prefs
                .search_query
                .as_deref()
                .map(|query| index.search(query, &pool, self.config.min_relevance))
                .unwrap_or_default()
        };
        let history = if prefs.user_id.is_some() {
            match self.interactions.snapshot().await {
                Ok(history) => history,
                Err(e) => {
                    tracing::warn!(error = %e, "Interaction history unavailable");
                    source_failed = true;
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };
        let collaborative_task = async {
            match prefs.user_id.as_deref() {
                Some(user_id) => {
                    CollaborativeModel::build(&history).recommend(user_id, self.config.top_k_similar)
                }
                None => Vec::new(),
            }
        };
        let (content_scores, search_hits, collaborative_raw) =
            tokio::join!(content_task, search_task, collaborative_task);

        let sources = vec![
            SourceScores {
                source: SourceLabel::Content,
                weight: 0.0,
                scores: content_scores
                    .into_iter()
                    .map(|s| (s.restaurant_id, s.score))
                    .collect(),
            },
            SourceScores {
                source: SourceLabel::Collaborative,
                weight: 0.0,
                scores: collaborative_raw
                    .into_iter()
                    .map(|(id, raw)| (id, (raw / COLLABORATIVE_SCALE).min(1.0)))
                    .collect(),
            },
            SourceScores {
                source: SourceLabel::Search,
                weight: 0.0,
                scores: search_hits
                    .into_iter()
                    .map(|hit| (pool[hit.pool_index].id, (hit.score * SEARCH_BOOST).min(1.0)))
                    .collect(),
            },
            SourceScores {
                source: SourceLabel::Generative,
                weight: 0.0,
                scores: generative_scores,
            },
        ];

        // Inactive sources drop out; their weight is redistributed
        let active: BTreeSet<SourceLabel> = sources
            .iter()
            .filter(|s| s.scores.iter().any(|&(_, score)| score > 0.0))
            .map(|s| s.source)
            .collect();
        let shares = self.weights.renormalize(&active);
        let sources: Vec<SourceScores> = sources
            .into_iter()
            .filter_map(|mut s| {
                shares.get(&s.source).map(|&weight| {
                    s.weight = weight;
                    s
                })
            })
            .collect();

        transition(RequestState::Aggregating);
        let aggregator = Aggregator::new(self.config.max_results, self.config.dedup_name_threshold);
        let recommendations = aggregator.aggregate(&pool, &sources, prefs);

        // An empty result is legitimate only when candidates existed and
        // every source reported in; otherwise hand off to the ladder
        if recommendations.is_empty() && (pool.is_empty() || source_failed) {
            return Err(AppError::UpstreamUnavailable(
                "live sources produced no usable candidates".to_string(),
            ));
        }

        if !recommendations.is_empty() {
            if let Err(e) = self.cache.append_recommendations(&recommendations).await {
                tracing::warn!(error = %e, "Cache update failed");
            }
        }

        Ok(recommendations)
    }
}

fn wants_generative(prefs: &PreferenceRecord) -> bool {
    prefs.search_query.is_some() || prefs.additional_notes.is_some()
}

/// Structured fields recognized inside the free-text query win over the
/// submitted form values
fn apply_query_overrides(prefs: &mut PreferenceRecord) {
    let Some(query) = prefs.search_query.as_deref() else {
        return;
    };
    let extracted = extract_query_preferences(query);
    if let Some(mood) = extracted.mood {
        prefs.mood = mood;
    }
    if let Some(occasion) = extracted.occasion {
        prefs.occasion = occasion;
    }
    if let Some(cuisine) = extracted.cuisine {
        prefs.cuisine = cuisine;
    }
    if let Some(dietary) = extracted.dietary {
        if let Ok(parsed) = dietary.parse() {
            prefs.dietary_preference = parsed;
        }
    }
}

/// Base relevance for a generative entry: 0.5, plus cuisine agreement
/// and strong mood/occasion signals when the model supplied them
fn generative_match_score(restaurant: &Restaurant, prefs: &PreferenceRecord) -> f64 {
    let mut score: f64 = 0.5;
    if prefs.cuisine == "any" || restaurant.cuisine.eq_ignore_ascii_case(&prefs.cuisine) {
        score += 0.2;
    }
    if restaurant.mood_score(&prefs.mood) > 0.7 {
        score += 0.2;
    }
    if restaurant.occasion_score(&prefs.occasion) > 0.7 {
        score += 0.1;
    }
    score.min(1.0)
}

/// Last rung of the ladder: the static set with a flat score, still
/// honoring the dietary preference. `None` when nothing in the static
/// set qualifies, which surfaces as a terminal error.
fn fallback_recommendations(diet: DietaryPreference) -> Option<Vec<Recommendation>> {
    let entries: Vec<Recommendation> = static_fallback()
        .into_iter()
        .filter(|restaurant| restaurant.supports_diet(diet))
        .map(|restaurant| Recommendation {
            restaurant,
            score: 0.5,
            rationale: "A dependable choice while personalized results are unavailable."
                .to_string(),
            sources: BTreeSet::new(),
        })
        .collect();
    (!entries.is_empty()).then_some(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryKv;
    use crate::models::Interaction;
    use crate::services::generative::MockGenerativeClient;
    use crate::services::resilience::RetryPolicy;
    use std::collections::HashMap;
    use std::time::Duration;

    fn restaurant(id: u32, name: &str, cuisine: &str) -> Restaurant {
        Restaurant {
            id,
            name: name.to_string(),
            cuisine: cuisine.to_string(),
            location: "Downtown".to_string(),
            address: format!("{} Main St", id),
            contact_details: None,
            ambiance: "cozy and quiet".to_string(),
            popular_dishes: vec!["house special".to_string()],
            dietary_options: vec!["vegetarian".to_string()],
            price_range: "$$".to_string(),
            mood_scores: HashMap::from([("happy".to_string(), 0.9)]),
            occasion_scores: HashMap::from([("celebration".to_string(), 0.8)]),
            time_scores: HashMap::from([("dinner".to_string(), 0.9)]),
            ephemeral: false,
        }
    }

    fn raw_prefs() -> RawPreferences {
        RawPreferences {
            mood: "happy".to_string(),
            occasion: "celebration".to_string(),
            cuisine: "any".to_string(),
            dietary_preference: "vegetarian".to_string(),
            time: "dinner".to_string(),
            location: "Downtown".to_string(),
            ..Default::default()
        }
    }

    fn engine_with(pool: Vec<Restaurant>, generative: Option<GenerativeAdapter>) -> RecommendationEngine {
        let kv = Arc::new(MemoryKv::new());
        RecommendationEngine::new(
            Config::default(),
            Dataset::from_restaurants(pool),
            Arc::new(RecommendationCache::new(kv.clone())),
            Arc::new(InteractionLog::new(kv)),
            generative,
        )
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            jitter: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_invalid_preferences_surface_as_validation() {
        let engine = engine_with(vec![restaurant(1, "A", "italian")], None);
        let mut raw = raw_prefs();
        raw.mood = String::new();
        let err = engine.recommend(raw, false).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_content_only_pipeline_returns_fresh_results() {
        let engine = engine_with(
            vec![restaurant(1, "Verdi", "italian"), restaurant(2, "Sakura", "japanese")],
            None,
        );
        let outcome = engine.recommend(raw_prefs(), false).await.unwrap();
        assert!(!outcome.degraded);
        assert_eq!(outcome.value.len(), 2);
        assert!(outcome.value[0]
            .sources
            .contains(&SourceLabel::Content));
    }

    #[tokio::test]
    async fn test_empty_pool_serves_the_static_fallback() {
        let engine = engine_with(Vec::new(), None);
        let outcome = engine.recommend(raw_prefs(), false).await.unwrap();
        assert!(outcome.degraded);
        assert!(outcome.message.unwrap().contains("default set"));
        assert!(!outcome.value.is_empty());
        assert!(outcome
            .value
            .iter()
            .all(|r| r.restaurant.supports_diet(DietaryPreference::Vegetarian)));
    }

    #[tokio::test]
    async fn test_unmatched_candidates_are_a_fresh_empty_result() {
        let mut steakhouse = restaurant(1, "Steakhouse", "american");
        steakhouse.dietary_options = vec!["non-vegetarian".to_string()];
        let engine = engine_with(vec![steakhouse], None);
        let outcome = engine.recommend(raw_prefs(), false).await.unwrap();
        // Candidates existed and every source reported in, so an empty
        // set is the honest answer, not a degradation
        assert!(!outcome.degraded);
        assert!(outcome.value.is_empty());
    }

    #[tokio::test]
    async fn test_cached_results_served_when_live_sources_fail() {
        let mut client = MockGenerativeClient::new();
        client
            .expect_complete()
            .times(2)
            .returning(|_, _| Err(AppError::UpstreamUnavailable("503".to_string())));
        let adapter = GenerativeAdapter::new(Arc::new(client), fast_policy());
        let engine = engine_with(Vec::new(), Some(adapter));
        engine
            .cache
            .append_recommendations(&[Recommendation {
                restaurant: restaurant(42, "Old Favourite", "italian"),
                score: 0.8,
                rationale: "match".to_string(),
                sources: BTreeSet::from([SourceLabel::Content]),
            }])
            .await
            .unwrap();

        let mut raw = raw_prefs();
        raw.search_query = Some("anything good".to_string());
        let outcome = engine.recommend(raw, true).await.unwrap();
        assert!(outcome.degraded);
        assert!(outcome.message.unwrap().contains("previously computed"));
        assert_eq!(outcome.value.len(), 1);
        assert_eq!(outcome.value[0].restaurant.name, "Old Favourite");
    }

    #[tokio::test]
    async fn test_all_rungs_exhausted_is_terminal() {
        let engine = engine_with(Vec::new(), None);
        let mut raw = raw_prefs();
        // The static set has no vegan entries, so every rung comes up
        // empty
        raw.dietary_preference = "vegan".to_string();
        let err = engine.recommend(raw, false).await.unwrap_err();
        assert!(matches!(err, AppError::Terminal(_)));
    }

    #[tokio::test]
    async fn test_collaborative_source_contributes_for_known_user() {
        let engine = engine_with(
            vec![restaurant(1, "Verdi", "italian"), restaurant(2, "Sakura", "japanese")],
            None,
        );
        // Two users overlapping on 1; neighbor also rated 2
        for (user, id) in [("alice", 1), ("bob", 1), ("bob", 2)] {
            engine
                .interactions
                .append(Interaction::new(user.to_string(), id, Some(5.0), true, true))
                .await
                .unwrap();
        }

        let mut raw = raw_prefs();
        raw.user_id = Some("alice".to_string());
        let outcome = engine.recommend(raw, false).await.unwrap();
        let sakura = outcome
            .value
            .iter()
            .find(|r| r.restaurant.name == "Sakura")
            .unwrap();
        assert!(sakura.sources.contains(&SourceLabel::Collaborative));
    }

    #[tokio::test]
    async fn test_search_query_overrides_structured_fields() {
        let mut vegan_spot = restaurant(1, "Green Bowl", "italian");
        vegan_spot.dietary_options = vec!["vegan".to_string()];
        let meat_spot = restaurant(2, "Steakhouse", "american");
        let engine = engine_with(vec![vegan_spot, meat_spot], None);

        let mut raw = raw_prefs();
        raw.search_query = Some("vegan pasta for a date".to_string());
        let outcome = engine.recommend(raw, false).await.unwrap();
        // Vegan extracted from the query filters the pool
        assert_eq!(outcome.value.len(), 1);
        assert_eq!(outcome.value[0].restaurant.name, "Green Bowl");
    }

    #[tokio::test]
    async fn test_generative_entries_join_results_with_label() {
        let mut client = MockGenerativeClient::new();
        client.expect_complete().times(1).returning(|_, _| {
            Ok("[{\"restaurantName\": \"Hidden Gem\", \"cuisine\": \"italian\", \
                \"dietaryOptions\": [\"vegetarian\"]}]"
                .to_string())
        });
        let adapter = GenerativeAdapter::new(Arc::new(client), fast_policy());
        let engine = engine_with(vec![restaurant(1, "Verdi", "italian")], Some(adapter));

        let mut raw = raw_prefs();
        raw.search_query = Some("a hidden gem".to_string());
        let outcome = engine.recommend(raw, true).await.unwrap();
        let gem = outcome
            .value
            .iter()
            .find(|r| r.restaurant.name == "Hidden Gem")
            .unwrap();
        assert!(gem.restaurant.ephemeral);
        assert!(gem.sources.contains(&SourceLabel::Generative));
    }

    #[tokio::test]
    async fn test_generative_failure_degrades_gracefully() {
        let mut client = MockGenerativeClient::new();
        client
            .expect_complete()
            .times(2)
            .returning(|_, _| Err(AppError::UpstreamUnavailable("503".to_string())));
        let adapter = GenerativeAdapter::new(Arc::new(client), fast_policy());
        let engine = engine_with(vec![restaurant(1, "Verdi", "italian")], Some(adapter));

        let mut raw = raw_prefs();
        raw.search_query = Some("anything good".to_string());
        let outcome = engine.recommend(raw, true).await.unwrap();
        // Other sources still produce a fresh result
        assert!(!outcome.degraded);
        assert!(!outcome.value.is_empty());
    }

    #[tokio::test]
    async fn test_no_fetch_without_query_or_notes() {
        // Mock with zero expected calls panics on use
        let client = MockGenerativeClient::new();
        let adapter = GenerativeAdapter::new(Arc::new(client), fast_policy());
        let engine = engine_with(vec![restaurant(1, "Verdi", "italian")], Some(adapter));
        let outcome = engine.recommend(raw_prefs(), true).await.unwrap();
        assert!(!outcome.value.is_empty());
    }

    #[test]
    fn test_generative_match_score_bands() {
        let prefs = PreferenceRecord::normalize(raw_prefs()).unwrap();
        let strong = restaurant(10, "Strong", "italian");
        // any-cuisine + mood 0.9 + occasion 0.8
        assert!((generative_match_score(&strong, &prefs) - 1.0).abs() < 1e-9);

        let bare = Restaurant {
            mood_scores: HashMap::new(),
            occasion_scores: HashMap::new(),
            ..restaurant(11, "Bare", "italian")
        };
        assert!((generative_match_score(&bare, &prefs) - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_query_overrides_ignore_unrecognized_fields() {
        let mut prefs = PreferenceRecord::normalize(raw_prefs()).unwrap();
        prefs.search_query = Some("somewhere nice tonight".to_string());
        let before = prefs.clone();
        apply_query_overrides(&mut prefs);
        assert_eq!(prefs.mood, before.mood);
        assert_eq!(prefs.cuisine, before.cuisine);
        assert_eq!(prefs.dietary_preference, DietaryPreference::Vegetarian);
    }
}
