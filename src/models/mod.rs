use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt::Display;
use std::str::FromStr;

use crate::error::{AppError, AppResult};

/// Fixed set of supported dietary preferences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DietaryPreference {
    Vegetarian,
    NonVegetarian,
    Vegan,
    GlutenFree,
}

impl FromStr for DietaryPreference {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "vegetarian" => Ok(DietaryPreference::Vegetarian),
            "non-vegetarian" => Ok(DietaryPreference::NonVegetarian),
            "vegan" => Ok(DietaryPreference::Vegan),
            "gluten-free" => Ok(DietaryPreference::GlutenFree),
            other => Err(AppError::Validation(format!(
                "Unknown dietary preference: {}",
                other
            ))),
        }
    }
}

impl Display for DietaryPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DietaryPreference::Vegetarian => "vegetarian",
            DietaryPreference::NonVegetarian => "non-vegetarian",
            DietaryPreference::Vegan => "vegan",
            DietaryPreference::GlutenFree => "gluten-free",
        };
        write!(f, "{}", s)
    }
}

/// Raw, unvalidated preference fields as supplied by a collaborator
/// (form or voice extractor). Re-validated regardless of origin.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPreferences {
    #[serde(default)]
    pub mood: String,
    #[serde(default)]
    pub occasion: String,
    #[serde(default)]
    pub cuisine: String,
    #[serde(default)]
    pub dietary_preference: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub additional_notes: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub search_query: Option<String>,
}

/// Canonical, validated preference bundle. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct PreferenceRecord {
    pub mood: String,
    pub occasion: String,
    pub cuisine: String,
    pub dietary_preference: DietaryPreference,
    pub time: String,
    pub location: String,
    pub additional_notes: Option<String>,
    pub user_id: Option<String>,
    pub search_query: Option<String>,
}

impl PreferenceRecord {
    /// Validates and canonicalizes raw input. Pure; the only way to
    /// obtain a `PreferenceRecord`.
    pub fn normalize(raw: RawPreferences) -> AppResult<Self> {
        let required = |field: &str, name: &str| -> AppResult<String> {
            let trimmed = field.trim();
            if trimmed.is_empty() {
                Err(AppError::Validation(format!(
                    "Missing required field: {}",
                    name
                )))
            } else {
                Ok(trimmed.to_lowercase())
            }
        };

        let optional = |field: Option<String>| -> Option<String> {
            field
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };

        Ok(PreferenceRecord {
            mood: required(&raw.mood, "mood")?,
            occasion: required(&raw.occasion, "occasion")?,
            cuisine: required(&raw.cuisine, "cuisine")?,
            dietary_preference: raw.dietary_preference.parse()?,
            time: required(&raw.time, "time")?,
            location: raw.location.trim().to_string(),
            additional_notes: optional(raw.additional_notes),
            user_id: optional(raw.user_id),
            search_query: optional(raw.search_query),
        })
    }
}

/// A restaurant entity in the candidate pool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Restaurant {
    pub id: u32,
    #[serde(rename = "restaurantName")]
    pub name: String,
    #[serde(default)]
    pub cuisine: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub contact_details: Option<String>,
    #[serde(default)]
    pub ambiance: String,
    #[serde(default)]
    pub popular_dishes: Vec<String>,
    #[serde(default)]
    pub dietary_options: Vec<String>,
    #[serde(default)]
    pub price_range: String,
    #[serde(default)]
    pub mood_scores: HashMap<String, f64>,
    #[serde(default)]
    pub occasion_scores: HashMap<String, f64>,
    #[serde(default)]
    pub time_scores: HashMap<String, f64>,
    /// True for generative-derived entries merged into the pool for a
    /// single request.
    #[serde(default)]
    pub ephemeral: bool,
}

impl Restaurant {
    /// Per-mood compatibility; missing entries score 0
    pub fn mood_score(&self, mood: &str) -> f64 {
        self.mood_scores
            .get(&mood.to_lowercase())
            .copied()
            .unwrap_or(0.0)
    }

    pub fn occasion_score(&self, occasion: &str) -> f64 {
        self.occasion_scores
            .get(&occasion.to_lowercase())
            .copied()
            .unwrap_or(0.0)
    }

    pub fn time_score(&self, time: &str) -> f64 {
        self.time_scores
            .get(&time.to_lowercase())
            .copied()
            .unwrap_or(0.0)
    }

    /// Whether the restaurant can serve the given dietary preference
    pub fn supports_diet(&self, diet: DietaryPreference) -> bool {
        let options: Vec<String> = self
            .dietary_options
            .iter()
            .map(|o| o.to_lowercase())
            .collect();
        match diet {
            // A restaurant without an explicit vegetarian-only menu can
            // serve non-vegetarian diners
            DietaryPreference::NonVegetarian => {
                options.iter().any(|o| o == "non-vegetarian")
                    || !options.iter().any(|o| o == "vegetarian")
            }
            other => options.iter().any(|o| o == &other.to_string()),
        }
    }

    /// All descriptive text, used by the text-similarity index
    pub fn searchable_text(&self) -> String {
        let mut parts = vec![
            self.name.clone(),
            self.cuisine.clone(),
            self.location.clone(),
            self.address.clone(),
            self.ambiance.clone(),
            self.popular_dishes.join(" "),
            self.dietary_options.join(" "),
            self.price_range.clone(),
        ];
        parts.retain(|p| !p.trim().is_empty());
        parts.join(" ").to_lowercase()
    }
}

/// A single user interaction with a restaurant. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    pub user_id: String,
    pub restaurant_id: u32,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub clicked: bool,
    #[serde(default)]
    pub viewed: bool,
    pub timestamp: DateTime<Utc>,
}

impl Interaction {
    pub fn new(
        user_id: String,
        restaurant_id: u32,
        rating: Option<f64>,
        clicked: bool,
        viewed: bool,
    ) -> Self {
        Self {
            user_id,
            restaurant_id,
            rating: rating.map(|r| r.clamp(0.0, 5.0)),
            clicked,
            viewed,
            timestamp: Utc::now(),
        }
    }

    /// Weighted interaction strength: rating dominates clicks and views
    pub fn strength(&self) -> f64 {
        let mut score = self.rating.unwrap_or(0.0) * 2.0;
        if self.clicked {
            score += 1.0;
        }
        if self.viewed {
            score += 0.5;
        }
        score
    }
}

/// Which recommender contributed to a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceLabel {
    Content,
    Collaborative,
    Search,
    Generative,
}

impl Display for SourceLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SourceLabel::Content => "content",
            SourceLabel::Collaborative => "collaborative",
            SourceLabel::Search => "search",
            SourceLabel::Generative => "generative",
        };
        write!(f, "{}", s)
    }
}

/// A ranked recommendation produced by the aggregator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub restaurant: Restaurant,
    pub score: f64,
    pub rationale: String,
    pub sources: BTreeSet<SourceLabel>,
}

/// A stored last-known-good recommendation set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CachedRecommendations {
    pub entries: Vec<Recommendation>,
    pub stored_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(dietary: &str) -> RawPreferences {
        RawPreferences {
            mood: "Happy".to_string(),
            occasion: "Celebration".to_string(),
            cuisine: "Any".to_string(),
            dietary_preference: dietary.to_string(),
            time: "Dinner".to_string(),
            location: "Downtown".to_string(),
            additional_notes: None,
            user_id: None,
            search_query: None,
        }
    }

    #[test]
    fn test_normalize_lowercases_categorical_fields() {
        let record = PreferenceRecord::normalize(raw("vegetarian")).unwrap();
        assert_eq!(record.mood, "happy");
        assert_eq!(record.occasion, "celebration");
        assert_eq!(record.cuisine, "any");
        assert_eq!(record.time, "dinner");
        assert_eq!(record.dietary_preference, DietaryPreference::Vegetarian);
    }

    #[test]
    fn test_normalize_rejects_missing_mood() {
        let mut input = raw("vegan");
        input.mood = "   ".to_string();
        let err = PreferenceRecord::normalize(input).unwrap_err();
        assert!(err.to_string().contains("mood"));
    }

    #[test]
    fn test_normalize_rejects_unknown_dietary_preference() {
        let err = PreferenceRecord::normalize(raw("pescatarian")).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_normalize_drops_blank_optionals() {
        let mut input = raw("vegan");
        input.additional_notes = Some("  ".to_string());
        input.search_query = Some(" sushi place ".to_string());
        let record = PreferenceRecord::normalize(input).unwrap();
        assert_eq!(record.additional_notes, None);
        assert_eq!(record.search_query, Some("sushi place".to_string()));
    }

    #[test]
    fn test_dietary_preference_round_trip() {
        for s in ["vegetarian", "non-vegetarian", "vegan", "gluten-free"] {
            let parsed: DietaryPreference = s.parse().unwrap();
            assert_eq!(parsed.to_string(), s);
        }
    }

    #[test]
    fn test_restaurant_missing_scores_default_to_zero() {
        let restaurant = Restaurant {
            id: 1,
            name: "Test".to_string(),
            cuisine: "italian".to_string(),
            location: String::new(),
            address: String::new(),
            contact_details: None,
            ambiance: String::new(),
            popular_dishes: vec![],
            dietary_options: vec![],
            price_range: String::new(),
            mood_scores: HashMap::new(),
            occasion_scores: HashMap::new(),
            time_scores: HashMap::new(),
            ephemeral: false,
        };
        assert_eq!(restaurant.mood_score("happy"), 0.0);
        assert_eq!(restaurant.occasion_score("celebration"), 0.0);
        assert_eq!(restaurant.time_score("dinner"), 0.0);
    }

    #[test]
    fn test_supports_diet_non_vegetarian_fallback() {
        let mut restaurant = Restaurant {
            id: 1,
            name: "Grill".to_string(),
            cuisine: "american".to_string(),
            location: String::new(),
            address: String::new(),
            contact_details: None,
            ambiance: String::new(),
            popular_dishes: vec![],
            dietary_options: vec!["gluten-free".to_string()],
            price_range: String::new(),
            mood_scores: HashMap::new(),
            occasion_scores: HashMap::new(),
            time_scores: HashMap::new(),
            ephemeral: false,
        };
        // No vegetarian-only declaration, so non-vegetarian is fine
        assert!(restaurant.supports_diet(DietaryPreference::NonVegetarian));
        assert!(restaurant.supports_diet(DietaryPreference::GlutenFree));
        assert!(!restaurant.supports_diet(DietaryPreference::Vegan));

        restaurant.dietary_options = vec!["vegetarian".to_string()];
        assert!(!restaurant.supports_diet(DietaryPreference::NonVegetarian));
    }

    #[test]
    fn test_interaction_strength_weighting() {
        let interaction = Interaction::new("u1".to_string(), 7, Some(4.0), true, true);
        assert_eq!(interaction.strength(), 4.0 * 2.0 + 1.0 + 0.5);

        let view_only = Interaction::new("u1".to_string(), 7, None, false, true);
        assert_eq!(view_only.strength(), 0.5);
    }

    #[test]
    fn test_interaction_rating_clamped() {
        let interaction = Interaction::new("u1".to_string(), 7, Some(9.5), false, false);
        assert_eq!(interaction.rating, Some(5.0));
    }

    #[test]
    fn test_restaurant_deserializes_original_shape() {
        let json = r#"{
            "id": 3,
            "restaurantName": "Bella Napoli",
            "cuisine": "italian",
            "location": "Downtown",
            "address": "12 Vine St",
            "contactDetails": "555-0112",
            "ambiance": "cozy romantic",
            "popularDishes": ["Margherita Pizza"],
            "dietaryOptions": ["vegetarian", "non-vegetarian"],
            "priceRange": "moderate",
            "moodScores": {"happy": 0.9},
            "occasionScores": {"date night": 0.8},
            "timeScores": {"dinner": 0.9}
        }"#;
        let restaurant: Restaurant = serde_json::from_str(json).unwrap();
        assert_eq!(restaurant.name, "Bella Napoli");
        assert_eq!(restaurant.mood_score("HAPPY"), 0.9);
        assert_eq!(restaurant.occasion_score("date night"), 0.8);
        assert!(!restaurant.ephemeral);
    }
}
