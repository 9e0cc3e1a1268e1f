use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::models::{PreferenceRecord, Recommendation, Restaurant, SourceLabel};

/// Lowercase, alphanumeric-only, whitespace-collapsed form used for
/// duplicate detection
pub fn normalize_text(text: &str) -> String {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, &ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// Similarity ratio in [0,1]: 1 - edit_distance / max_len
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

/// Per-source score list feeding the aggregator. Scores are already in
/// [0,1]; the weight is the renormalized share for this source.
#[derive(Debug, Clone)]
pub struct SourceScores {
    pub source: SourceLabel,
    pub weight: f64,
    pub scores: Vec<(u32, f64)>,
}

/// Merges weighted per-source scores, removes duplicate entities, and
/// ranks the top N.
pub struct Aggregator {
    top_n: usize,
    name_threshold: f64,
}

impl Aggregator {
    pub fn new(top_n: usize, name_threshold: f64) -> Self {
        Self {
            top_n,
            name_threshold,
        }
    }

    /// Two entries describe the same restaurant when their normalized
    /// names match, their normalized addresses match, or the names are
    /// near-identical (ratio above the configured cutoff, or one name
    /// containing the other).
    fn is_duplicate(&self, a: &Restaurant, b: &Restaurant) -> bool {
        let name_a = normalize_text(&a.name);
        let name_b = normalize_text(&b.name);
        if name_a.is_empty() || name_b.is_empty() {
            return false;
        }
        if name_a == name_b {
            return true;
        }

        let address_a = normalize_text(&a.address);
        let address_b = normalize_text(&b.address);
        if !address_a.is_empty() && address_a == address_b {
            return true;
        }

        if name_similarity(&name_a, &name_b) >= self.name_threshold {
            return true;
        }
        // Containment catches "luigi s" vs "luigi s trattoria"
        (name_a.len() > 5 && name_b.len() > 5)
            && (name_a.contains(&name_b) || name_b.contains(&name_a))
    }

    /// Sums weighted contributions per restaurant id, deduplicates, and
    /// returns the top N. Pool order provides the stable tie-break;
    /// permuting the per-source lists does not change the outcome.
    pub fn aggregate(
        &self,
        pool: &[Restaurant],
        sources: &[SourceScores],
        prefs: &PreferenceRecord,
    ) -> Vec<Recommendation> {
        let order: HashMap<u32, usize> = pool
            .iter()
            .enumerate()
            .map(|(idx, r)| (r.id, idx))
            .collect();
        let by_id: HashMap<u32, &Restaurant> = pool.iter().map(|r| (r.id, r)).collect();

        // BTreeMap keeps accumulation order deterministic regardless of
        // input ordering
        let mut totals: BTreeMap<u32, (f64, BTreeSet<SourceLabel>)> = BTreeMap::new();
        for source in sources {
            for &(restaurant_id, score) in &source.scores {
                if !by_id.contains_key(&restaurant_id) {
                    continue;
                }
                let entry = totals
                    .entry(restaurant_id)
                    .or_insert_with(|| (0.0, BTreeSet::new()));
                entry.0 += score.clamp(0.0, 1.0) * source.weight;
                if score > 0.0 {
                    entry.1.insert(source.source);
                }
            }
        }

        let mut merged: Vec<(u32, f64, BTreeSet<SourceLabel>)> = Vec::new();
        let mut candidate_ids: Vec<u32> = totals.keys().copied().collect();
        candidate_ids.sort_by_key(|id| order[id]);

        for id in candidate_ids {
            let (score, sources) = totals[&id].clone();
            let restaurant = by_id[&id];
            match merged
                .iter_mut()
                .find(|(existing_id, _, _)| self.is_duplicate(by_id[existing_id], restaurant))
            {
                Some(existing) => {
                    // Collapse: keep the higher score and every label
                    if score > existing.1 {
                        existing.1 = score;
                    }
                    existing.2.extend(sources);
                }
                None => merged.push((id, score, sources)),
            }
        }

        merged.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(order[&a.0].cmp(&order[&b.0]))
        });

        merged
            .into_iter()
            .take(self.top_n)
            .map(|(id, score, sources)| {
                let restaurant = by_id[&id];
                Recommendation {
                    restaurant: restaurant.clone(),
                    score,
                    rationale: rationale(restaurant, score, prefs),
                    sources,
                }
            })
            .collect()
    }
}

/// Human-readable reason derived from the score band and strong
/// mood/occasion sub-scores
pub fn rationale(restaurant: &Restaurant, score: f64, prefs: &PreferenceRecord) -> String {
    let mut reasons = vec![if score > 0.8 {
        "This is an excellent match for your preferences".to_string()
    } else if score > 0.6 {
        "This is a great match for your preferences".to_string()
    } else {
        "This matches your preferences".to_string()
    }];

    if restaurant.mood_score(&prefs.mood) > 0.7 {
        reasons.push(format!("perfect for your {} mood", prefs.mood));
    }
    if restaurant.occasion_score(&prefs.occasion) > 0.7 {
        reasons.push(format!("ideal for {}", prefs.occasion));
    }

    format!("{}.", reasons.join(". "))
}
