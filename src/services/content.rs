use crate::models::{PreferenceRecord, Restaurant};
use crate::services::search::TextIndex;

/// Factor weights for the content-based score. Mood and occasion
/// dominate; the rest share the remainder evenly.
#[derive(Debug, Clone)]
pub struct ContentWeights {
    pub mood: f64,
    pub occasion: f64,
    pub time: f64,
    pub cuisine: f64,
    pub similarity: f64,
    pub notes: f64,
}

impl Default for ContentWeights {
    fn default() -> Self {
        Self {
            mood: 0.30,
            occasion: 0.30,
            time: 0.10,
            cuisine: 0.10,
            similarity: 0.10,
            notes: 0.10,
        }
    }
}

/// Cuisine compatibility: exact match or "any" gets full credit, a
/// mismatch keeps partial credit rather than zero.
pub fn cuisine_match(restaurant_cuisine: &str, preferred: &str) -> f64 {
    if preferred.eq_ignore_ascii_case("any")
        || restaurant_cuisine.eq_ignore_ascii_case(preferred)
    {
        1.0
    } else {
        0.3
    }
}

/// Aspects recognized in free-text notes
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NotesPreferences {
    pub spicy: bool,
    pub quiet: bool,
    pub romantic: bool,
    pub family_friendly: bool,
    pub healthy: bool,
    pub fast: bool,
    pub affordable: bool,
    pub upscale: bool,
}

impl NotesPreferences {
    pub fn extract(notes: Option<&str>) -> Self {
        let Some(notes) = notes else {
            return Self::default();
        };
        let notes = notes.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| notes.contains(w));

        Self {
            spicy: has(&["spicy", "hot", "heat", "fiery"]),
            quiet: has(&["quiet", "peaceful", "calm", "serene"]),
            romantic: has(&["romantic", "date", "intimate", "cozy"]),
            family_friendly: has(&["family", "kids", "children"]),
            healthy: has(&["healthy", "fresh", "light", "nutritious"]),
            fast: has(&["fast", "quick", "quickly", "hurry"]),
            affordable: has(&["cheap", "affordable", "budget", "inexpensive"]),
            upscale: has(&["fancy", "upscale", "elegant", "fine dining"]),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Scores a restaurant against extracted note aspects. No aspects
/// extracted means a neutral 1.0.
pub fn notes_score(restaurant: &Restaurant, notes: &NotesPreferences) -> f64 {
    if notes.is_empty() {
        return 1.0;
    }

    let ambiance = restaurant.ambiance.to_lowercase();
    let price = restaurant.price_range.to_lowercase();
    let cuisine = restaurant.cuisine.to_lowercase();
    let ambiance_has = |words: &[&str]| words.iter().any(|w| ambiance.contains(w));

    let mut score = 0.0;
    let mut total = 0.0;

    if notes.spicy {
        // Cuisine-based heuristic for heat
        if ["indian", "mexican", "thai", "chinese"].contains(&cuisine.as_str()) {
            score += 0.3;
        }
        total += 0.3;
    }
    if notes.quiet {
        if ambiance_has(&["quiet", "peaceful", "serene", "calm"]) {
            score += 0.2;
        }
        total += 0.2;
    }
    if notes.romantic {
        if ambiance_has(&["romantic", "intimate", "cozy", "elegant"]) {
            score += 0.2;
        }
        total += 0.2;
    }
    if notes.family_friendly {
        if ambiance_has(&["family", "casual", "friendly"]) {
            score += 0.2;
        }
        total += 0.2;
    }
    if notes.healthy {
        if ambiance_has(&["healthy", "fresh", "light"]) {
            score += 0.2;
        }
        total += 0.2;
    }
    if notes.affordable {
        if price == "affordable" {
            score += 0.2;
        }
        total += 0.2;
    }
    if notes.upscale {
        if price == "expensive" || price == "moderate" {
            score += 0.2;
        }
        total += 0.2;
    }

    if total > 0.0 {
        score / total
    } else {
        1.0
    }
}

/// A content-scored candidate, identified by restaurant id
#[derive(Debug, Clone, PartialEq)]
pub struct ContentScore {
    pub restaurant_id: u32,
    pub score: f64,
}

/// Content-based scorer over an immutable candidate-pool snapshot
pub struct ContentScorer {
    weights: ContentWeights,
}

impl Default for ContentScorer {
    fn default() -> Self {
        Self {
            weights: ContentWeights::default(),
        }
    }
}

impl ContentScorer {
    pub fn new(weights: ContentWeights) -> Self {
        Self { weights }
    }

    fn preference_text(prefs: &PreferenceRecord) -> String {
        format!(
            "{} {} {} {}",
            prefs.cuisine, prefs.dietary_preference, prefs.mood, prefs.occasion
        )
    }

    /// Scores every dietary-compatible restaurant in the pool.
    /// Output is descending by score, ties broken by ascending id.
    pub fn score_pool(
        &self,
        prefs: &PreferenceRecord,
        pool: &[Restaurant],
        index: &TextIndex,
    ) -> Vec<ContentScore> {
        let notes = NotesPreferences::extract(prefs.additional_notes.as_deref());
        let preference_text = Self::preference_text(prefs);

        let mut scored: Vec<ContentScore> = pool
            .iter()
            .enumerate()
            .filter(|(_, r)| r.supports_diet(prefs.dietary_preference))
            .map(|(idx, restaurant)| {
                let w = &self.weights;
                let score = restaurant.mood_score(&prefs.mood) * w.mood
                    + restaurant.occasion_score(&prefs.occasion) * w.occasion
                    + restaurant.time_score(&prefs.time) * w.time
                    + cuisine_match(&restaurant.cuisine, &prefs.cuisine) * w.cuisine
                    + index.similarity(&preference_text, idx) * w.similarity
                    + notes_score(restaurant, &notes) * w.notes;
                ContentScore {
                    restaurant_id: restaurant.id,
                    score: score.clamp(0.0, 1.0),
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.restaurant_id.cmp(&b.restaurant_id))
        });
        scored
    }
}
