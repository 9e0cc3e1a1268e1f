use std::collections::{HashMap, HashSet};

use crate::models::Restaurant;

/// Common English words excluded from the vector space
const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "it", "in", "on", "of", "to", "and", "or", "for", "with", "this",
    "that", "be", "are", "was", "were", "have", "has", "had", "do", "does", "did", "will",
    "would", "could", "should", "can", "not", "no", "but", "if", "at", "by", "from", "as",
    "into", "about", "so", "its", "you", "your", "i", "my", "we", "our", "they", "them",
    "their", "near", "me", "some", "place",
];

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1 && !STOP_WORDS.contains(t))
        .map(|t| t.to_string())
        .collect()
}

/// TF-IDF vector space over the candidate pool's descriptive text.
///
/// Built once at engine init and rebuilt whenever the pool gains
/// generative enrichments; never rebuilt per request. Vectors are
/// unit-normalized so cosine similarity is a sparse dot product.
#[derive(Debug, Clone, Default)]
pub struct TextIndex {
    /// term -> dimension
    vocabulary: HashMap<String, usize>,
    /// IDF weight per dimension
    idf: Vec<f64>,
    /// One sparse unit vector per restaurant, in pool order
    vectors: Vec<HashMap<usize, f64>>,
}

/// A text-search hit: position in the pool plus the combined score
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub pool_index: usize,
    pub score: f64,
}

impl TextIndex {
    pub fn build(pool: &[Restaurant]) -> Self {
        let documents: Vec<Vec<String>> = pool
            .iter()
            .map(|r| tokenize(&r.searchable_text()))
            .collect();
        let n = documents.len() as f64;

        let mut vocabulary: HashMap<String, usize> = HashMap::new();
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        for tokens in &documents {
            let unique: HashSet<&str> = tokens.iter().map(|t| t.as_str()).collect();
            for term in unique {
                *doc_freq.entry(term.to_string()).or_insert(0) += 1;
                let next = vocabulary.len();
                vocabulary.entry(term.to_string()).or_insert(next);
            }
        }

        let mut idf = vec![0.0; vocabulary.len()];
        for (term, &dim) in &vocabulary {
            let df = doc_freq[term] as f64;
            idf[dim] = (n / df).ln() + 1.0;
        }

        let vectors = documents
            .iter()
            .map(|tokens| Self::vectorize_tokens(tokens, &vocabulary, &idf))
            .collect();

        Self {
            vocabulary,
            idf,
            vectors,
        }
    }

    fn vectorize_tokens(
        tokens: &[String],
        vocabulary: &HashMap<String, usize>,
        idf: &[f64],
    ) -> HashMap<usize, f64> {
        let mut tf: HashMap<usize, f64> = HashMap::new();
        for token in tokens {
            if let Some(&dim) = vocabulary.get(token) {
                *tf.entry(dim).or_insert(0.0) += 1.0;
            }
        }
        for (dim, value) in tf.iter_mut() {
            *value *= idf[*dim];
        }
        let norm: f64 = tf.values().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for value in tf.values_mut() {
                *value /= norm;
            }
        }
        tf
    }

    fn vectorize(&self, text: &str) -> HashMap<usize, f64> {
        Self::vectorize_tokens(&tokenize(text), &self.vocabulary, &self.idf)
    }

    /// Cosine similarity between free text and a pooled restaurant.
    /// Restaurants with empty descriptive text score 0.
    pub fn similarity(&self, text: &str, pool_index: usize) -> f64 {
        let Some(restaurant_vector) = self.vectors.get(pool_index) else {
            return 0.0;
        };
        let query_vector = self.vectorize(text);
        let dot: f64 = query_vector
            .iter()
            .filter_map(|(dim, value)| restaurant_vector.get(dim).map(|rv| rv * value))
            .sum();
        dot.max(0.0)
    }

    /// Query words longer than 2 characters, used for keyword matching
    fn keywords(query: &str) -> Vec<String> {
        query
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 2)
            .map(|w| w.to_string())
            .collect()
    }

    fn keyword_match_score(restaurant: &Restaurant, keywords: &[String]) -> f64 {
        if keywords.is_empty() {
            return 0.0;
        }
        let haystack = restaurant.searchable_text();
        let matches = keywords.iter().filter(|k| haystack.contains(*k)).count();
        matches as f64 / keywords.len() as f64
    }

    /// Scores every pooled restaurant against a free-text query:
    /// 70% cosine similarity, 30% keyword-hit ratio. Hits below
    /// `min_score` are discarded; output is descending by score.
    pub fn search(&self, query: &str, pool: &[Restaurant], min_score: f64) -> Vec<SearchHit> {
        if query.trim().is_empty() {
            return Vec::new();
        }
        let keywords = Self::keywords(query);
        let query_vector = self.vectorize(query);

        let mut hits: Vec<SearchHit> = pool
            .iter()
            .enumerate()
            .filter_map(|(idx, restaurant)| {
                let semantic: f64 = self
                    .vectors
                    .get(idx)
                    .map(|vector| {
                        query_vector
                            .iter()
                            .filter_map(|(dim, value)| vector.get(dim).map(|rv| rv * value))
                            .sum::<f64>()
                            .max(0.0)
                    })
                    .unwrap_or(0.0);
                let keyword = Self::keyword_match_score(restaurant, &keywords);
                let score = semantic * 0.7 + keyword * 0.3;
                (score >= min_score).then_some(SearchHit {
                    pool_index: idx,
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.pool_index.cmp(&b.pool_index))
        });
        hits
    }
}

/// Preferences recognized inside a free-text query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPreferences {
    pub mood: Option<String>,
    pub occasion: Option<String>,
    pub cuisine: Option<String>,
    pub dietary: Option<String>,
}

/// Keyword extraction of structured preferences from a free-text query.
/// Extracted values override the corresponding structured fields.
pub fn extract_query_preferences(query: &str) -> QueryPreferences {
    let query = query.to_lowercase();
    let contains_any = |words: &[&str]| words.iter().any(|w| query.contains(w));

    let mood_table: [(&str, &[&str]); 6] = [
        ("happy", &["happy", "cheerful", "joyful", "excited"]),
        ("sad", &["sad", "down", "depressed", "blue"]),
        ("stressed", &["stressed", "tired", "exhausted", "busy"]),
        ("adventurous", &["adventurous", "exciting", "new", "try"]),
        ("relaxed", &["relaxed", "calm", "peaceful", "chill"]),
        ("celebratory", &["celebrate", "celebration", "special", "party"]),
    ];
    let occasion_table: [(&str, &[&str]); 5] = [
        ("casual meal", &["casual", "simple"]),
        (
            "celebration",
            &["celebration", "birthday", "anniversary", "special"],
        ),
        ("quick bite", &["quick", "fast", "grab"]),
        ("date night", &["date", "romantic"]),
        ("family dinner", &["family", "kids", "children"]),
    ];
    let cuisine_table: [(&str, &[&str]); 6] = [
        ("italian", &["italian", "pasta", "pizza"]),
        ("mexican", &["mexican", "taco", "burrito"]),
        ("indian", &["indian", "curry", "tikka"]),
        ("japanese", &["japanese", "sushi", "ramen"]),
        ("chinese", &["chinese", "dim sum"]),
        ("american", &["american", "burger", "bbq"]),
    ];

    let lookup = |table: &[(&str, &[&str])]| -> Option<String> {
        table
            .iter()
            .find(|(_, words)| contains_any(words))
            .map(|(value, _)| value.to_string())
    };

    let dietary = if contains_any(&["vegetarian", "veggie"]) {
        Some("vegetarian".to_string())
    } else if contains_any(&["vegan"]) {
        Some("vegan".to_string())
    } else if contains_any(&["gluten-free", "gluten free"]) {
        Some("gluten-free".to_string())
    } else {
        None
    };

    QueryPreferences {
        mood: lookup(&mood_table),
        occasion: lookup(&occasion_table),
        cuisine: lookup(&cuisine_table),
        dietary,
    }
}
