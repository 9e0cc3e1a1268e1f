use std::collections::{HashMap, HashSet};

use crate::models::Interaction;

/// User-based collaborative filtering over the interaction log.
///
/// Built per request from a committed snapshot of the log; cheap at the
/// interaction volumes a single process sees, and it keeps the model
/// consistent with the log without invalidation bookkeeping.
pub struct CollaborativeModel {
    /// user -> (similar user, cosine similarity), descending
    user_similarity: HashMap<String, Vec<(String, f64)>>,
    /// user -> restaurants they have interacted with
    user_items: HashMap<String, HashSet<u32>>,
}

impl CollaborativeModel {
    pub fn build(interactions: &[Interaction]) -> Self {
        // user -> restaurant -> accumulated interaction strength
        let mut matrix: HashMap<String, HashMap<u32, f64>> = HashMap::new();
        for interaction in interactions {
            *matrix
                .entry(interaction.user_id.clone())
                .or_default()
                .entry(interaction.restaurant_id)
                .or_insert(0.0) += interaction.strength();
        }

        let user_items: HashMap<String, HashSet<u32>> = matrix
            .iter()
            .map(|(user, items)| (user.clone(), items.keys().copied().collect()))
            .collect();

        let mut users: Vec<&String> = matrix.keys().collect();
        users.sort();

        let mut user_similarity: HashMap<String, Vec<(String, f64)>> = HashMap::new();
        for (i, user_a) in users.iter().enumerate() {
            for user_b in users.iter().skip(i + 1) {
                let vector_a = &matrix[*user_a];
                let vector_b = &matrix[*user_b];

                // Only user pairs sharing at least one item are comparable
                if vector_a.keys().all(|item| !vector_b.contains_key(item)) {
                    continue;
                }

                let similarity = cosine(vector_a, vector_b);
                if similarity > 0.0 {
                    user_similarity
                        .entry((*user_a).clone())
                        .or_default()
                        .push(((*user_b).clone(), similarity));
                    user_similarity
                        .entry((*user_b).clone())
                        .or_default()
                        .push(((*user_a).clone(), similarity));
                }
            }
        }

        for neighbors in user_similarity.values_mut() {
            neighbors.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.0.cmp(&b.0))
            });
        }

        Self {
            user_similarity,
            user_items,
        }
    }

    /// Top-K users most similar to the target
    pub fn similar_users(&self, user_id: &str, top_k: usize) -> Vec<(String, f64)> {
        self.user_similarity
            .get(user_id)
            .map(|neighbors| neighbors.iter().take(top_k).cloned().collect())
            .unwrap_or_default()
    }

    /// Per-restaurant scores from the top-K similar users' interactions,
    /// excluding restaurants the target has already interacted with.
    /// A user with no history gets an empty result (cold start).
    pub fn recommend(&self, user_id: &str, top_k: usize) -> Vec<(u32, f64)> {
        let neighbors = self.similar_users(user_id, top_k);
        if neighbors.is_empty() {
            return Vec::new();
        }

        let seen = self.user_items.get(user_id).cloned().unwrap_or_default();

        let mut scores: HashMap<u32, f64> = HashMap::new();
        for (neighbor, similarity) in &neighbors {
            if let Some(items) = self.user_items.get(neighbor) {
                for &restaurant_id in items {
                    if !seen.contains(&restaurant_id) {
                        *scores.entry(restaurant_id).or_insert(0.0) += similarity;
                    }
                }
            }
        }

        let mut ranked: Vec<(u32, f64)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        ranked
    }
}

fn cosine(a: &HashMap<u32, f64>, b: &HashMap<u32, f64>) -> f64 {
    let dot: f64 = a
        .iter()
        .filter_map(|(item, value)| b.get(item).map(|bv| bv * value))
        .sum();
    let norm_a: f64 = a.values().map(|v| v * v).sum::<f64>().sqrt();
    let norm_b: f64 = b.values().map(|v| v * v).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
