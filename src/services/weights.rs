use std::collections::{BTreeMap, BTreeSet};

use crate::models::SourceLabel;

/// Base weights for each recommendation source.
///
/// Renormalization over the active-source set is a pure function: it
/// does not care which concrete sources exist, only which are active.
#[derive(Debug, Clone)]
pub struct WeightPolicy {
    base: BTreeMap<SourceLabel, f64>,
}

impl Default for WeightPolicy {
    fn default() -> Self {
        Self {
            base: BTreeMap::from([
                (SourceLabel::Content, 0.40),
                (SourceLabel::Collaborative, 0.30),
                (SourceLabel::Search, 0.20),
                (SourceLabel::Generative, 0.10),
            ]),
        }
    }
}

impl WeightPolicy {
    pub fn new(base: BTreeMap<SourceLabel, f64>) -> Self {
        Self { base }
    }

    /// Drops inactive sources and renormalizes the remaining weights to
    /// sum to 1. An empty active set yields an empty map.
    pub fn renormalize(&self, active: &BTreeSet<SourceLabel>) -> BTreeMap<SourceLabel, f64> {
        let retained: BTreeMap<SourceLabel, f64> = self
            .base
            .iter()
            .filter(|(source, _)| active.contains(source))
            .map(|(source, weight)| (*source, *weight))
            .collect();

        let total: f64 = retained.values().sum();
        if total <= 0.0 {
            return BTreeMap::new();
        }

        retained
            .into_iter()
            .map(|(source, weight)| (source, weight / total))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum(weights: &BTreeMap<SourceLabel, f64>) -> f64 {
        weights.values().sum()
    }

    #[test]
    fn test_all_sources_active_sums_to_one() {
        let policy = WeightPolicy::default();
        let active = BTreeSet::from([
            SourceLabel::Content,
            SourceLabel::Collaborative,
            SourceLabel::Search,
            SourceLabel::Generative,
        ]);
        let weights = policy.renormalize(&active);
        assert!((sum(&weights) - 1.0).abs() < 1e-9);
        assert_eq!(weights[&SourceLabel::Content], 0.40);
    }

    #[test]
    fn test_cold_start_redistributes_collaborative_weight() {
        let policy = WeightPolicy::default();
        let active = BTreeSet::from([
            SourceLabel::Content,
            SourceLabel::Search,
            SourceLabel::Generative,
        ]);
        let weights = policy.renormalize(&active);
        assert!((sum(&weights) - 1.0).abs() < 1e-9);
        assert!(!weights.contains_key(&SourceLabel::Collaborative));
        // 0.4 / 0.7
        assert!((weights[&SourceLabel::Content] - 0.4 / 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_single_active_source_takes_full_weight() {
        let policy = WeightPolicy::default();
        let active = BTreeSet::from([SourceLabel::Content]);
        let weights = policy.renormalize(&active);
        assert_eq!(weights.len(), 1);
        assert!((weights[&SourceLabel::Content] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_active_set_yields_empty_weights() {
        let policy = WeightPolicy::default();
        let weights = policy.renormalize(&BTreeSet::new());
        assert!(weights.is_empty());
    }

    #[test]
    fn test_independent_of_concrete_source_count() {
        // A policy with only two sources behaves identically
        let policy = WeightPolicy::new(BTreeMap::from([
            (SourceLabel::Content, 0.6),
            (SourceLabel::Search, 0.2),
        ]));
        let weights = policy.renormalize(&BTreeSet::from([
            SourceLabel::Content,
            SourceLabel::Search,
        ]));
        assert!((weights[&SourceLabel::Content] - 0.75).abs() < 1e-9);
        assert!((weights[&SourceLabel::Search] - 0.25).abs() < 1e-9);
    }
}
