use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::models::Restaurant;

#[derive(Debug, Deserialize)]
struct DatasetFile {
    #[serde(default)]
    restaurants: Vec<Restaurant>,
}

/// Read-only supplier of the base restaurant set.
///
/// Loaded once at process start; the curation of the file itself is
/// someone else's job. A missing or unreadable file yields an empty
/// base set, leaving the static fallback as the floor.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub restaurants: Vec<Restaurant>,
}

impl Dataset {
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<DatasetFile>(&raw) {
                Ok(file) => {
                    tracing::info!(
                        count = file.restaurants.len(),
                        path = %path.display(),
                        "Restaurant dataset loaded"
                    );
                    Self {
                        restaurants: file.restaurants,
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, path = %path.display(), "Dataset parse failed");
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "Dataset file unavailable");
                Self::default()
            }
        }
    }

    pub fn from_restaurants(restaurants: Vec<Restaurant>) -> Self {
        Self { restaurants }
    }
}

/// Built-in last-resort candidates, served only when both the live
/// pipeline and the cache come up empty.
pub fn static_fallback() -> Vec<Restaurant> {
    let entry = |id: u32,
                 name: &str,
                 cuisine: &str,
                 address: &str,
                 dish: &str,
                 ambiance: &str|
     -> Restaurant {
        Restaurant {
            id,
            name: name.to_string(),
            cuisine: cuisine.to_string(),
            location: "City Center".to_string(),
            address: address.to_string(),
            contact_details: None,
            ambiance: ambiance.to_string(),
            popular_dishes: vec![dish.to_string()],
            dietary_options: vec![
                "vegetarian".to_string(),
                "non-vegetarian".to_string(),
            ],
            price_range: "moderate".to_string(),
            mood_scores: HashMap::from([("happy".to_string(), 0.7)]),
            occasion_scores: HashMap::from([("casual meal".to_string(), 0.8)]),
            time_scores: HashMap::from([
                ("lunch".to_string(), 0.8),
                ("dinner".to_string(), 0.8),
            ]),
            ephemeral: false,
        }
    };

    vec![
        entry(
            9001,
            "The Corner Bistro",
            "american",
            "101 Main St",
            "Classic Burger",
            "casual friendly",
        ),
        entry(
            9002,
            "Trattoria Roma",
            "italian",
            "88 Olive Way",
            "Spaghetti Carbonara",
            "cozy family",
        ),
        entry(
            9003,
            "Lotus Garden",
            "chinese",
            "7 Lantern Rd",
            "Vegetable Dumplings",
            "calm casual",
        ),
    ]
}
