//! Equipment Voting Resolver
//!
//! Lets retrieved passages vote on which equipment a question concerns.
//! Runs over the top of an *unfiltered* ranked pool so the vote is unbiased:
//! the semantic search naturally surfaces the right manual, and the resolver
//! only has to identify which one won.

use std::collections::HashMap;

use crate::types::RetrievedPassage;

/// Outcome of one vote over a ranked passage pool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoteOutcome {
    pub equipment_type: Option<String>,
    pub brand: Option<String>,
    /// Fraction of rank-weighted type votes held by the winner. 0.0 when no
    /// passage carried a type label.
    pub dominance: f32,
}

/// Rank-weighted vote accumulation for one label dimension. Built fresh per
/// retrieval call, discarded after use.
#[derive(Debug, Default)]
struct VoteTally {
    weights: HashMap<String, usize>,
}

impl VoteTally {
    fn add(&mut self, label: &str, weight: usize) {
        *self.weights.entry(label.to_string()).or_insert(0) += weight;
    }

    fn total(&self) -> usize {
        self.weights.values().sum()
    }

    /// Highest accumulated weight wins; equal weights break toward the
    /// lexically smaller label so the outcome does not depend on provider
    /// result order.
    fn winner(&self) -> Option<(&str, usize)> {
        self.weights
            .iter()
            .max_by(|(label_a, weight_a), (label_b, weight_b)| {
                weight_a
                    .cmp(weight_b)
                    .then_with(|| label_b.cmp(label_a))
            })
            .map(|(label, weight)| (label.as_str(), *weight))
    }
}

/// Examine the top `top_n` passages of an unfiltered ranked retrieval. The
/// passage at 0-indexed rank `r` contributes weight `top_n - r` to its
/// equipment-type label and to its brand label; absent labels contribute
/// nothing. Pure function over its input.
pub fn vote(passages: &[RetrievedPassage], top_n: usize) -> VoteOutcome {
    let mut type_votes = VoteTally::default();
    let mut brand_votes = VoteTally::default();

    for (rank, passage) in passages.iter().take(top_n).enumerate() {
        let weight = top_n - rank;
        if let Some(equipment_type) = passage.metadata.equipment_type.as_deref() {
            type_votes.add(equipment_type, weight);
        }
        if let Some(brand) = passage.metadata.equipment_brand.as_deref() {
            brand_votes.add(brand, weight);
        }
    }

    let Some((winning_type, winner_weight)) = type_votes.winner() else {
        return VoteOutcome::default();
    };

    let total = type_votes.total();
    let dominance = if total > 0 {
        winner_weight as f32 / total as f32
    } else {
        0.0
    };

    let outcome = VoteOutcome {
        equipment_type: Some(winning_type.to_string()),
        brand: brand_votes.winner().map(|(brand, _)| brand.to_string()),
        dominance,
    };

    tracing::debug!(
        equipment_type = ?outcome.equipment_type,
        brand = ?outcome.brand,
        dominance = outcome.dominance,
        "equipment vote resolved"
    );

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PassageMetadata;

    fn passage(equipment_type: Option<&str>, brand: Option<&str>, score: f32) -> RetrievedPassage {
        RetrievedPassage {
            content: "text".to_string(),
            score,
            metadata: PassageMetadata {
                equipment_type: equipment_type.map(str::to_string),
                equipment_brand: brand.map(str::to_string),
                ..PassageMetadata::default()
            },
        }
    }

    #[test]
    fn unlabeled_pool_resolves_to_nothing() {
        let pool: Vec<_> = (0..12).map(|_| passage(None, None, 0.5)).collect();
        let outcome = vote(&pool, 12);
        assert_eq!(outcome, VoteOutcome::default());
        assert_eq!(outcome.dominance, 0.0);
    }

    #[test]
    fn uniform_pool_has_full_dominance() {
        let pool: Vec<_> = (0..12)
            .map(|_| passage(Some("Coffee_Maker"), Some("Metos"), 0.8))
            .collect();
        let outcome = vote(&pool, 12);
        assert_eq!(outcome.equipment_type.as_deref(), Some("Coffee_Maker"));
        assert_eq!(outcome.brand.as_deref(), Some("Metos"));
        assert_eq!(outcome.dominance, 1.0);
    }

    #[test]
    fn votes_are_rank_weighted() {
        // Two "Oven" passages at the top outweigh three "Fryer" passages at
        // the bottom: (12 + 11) vs (3 + 2 + 1).
        let mut pool = vec![
            passage(Some("Oven"), None, 0.9),
            passage(Some("Oven"), None, 0.85),
        ];
        pool.extend((0..7).map(|_| passage(None, None, 0.5)));
        pool.extend((0..3).map(|_| passage(Some("Fryer"), None, 0.3)));

        let outcome = vote(&pool, 12);
        assert_eq!(outcome.equipment_type.as_deref(), Some("Oven"));
        let expected = 23.0 / 29.0;
        assert!((outcome.dominance - expected).abs() < 1e-6);
    }

    #[test]
    fn only_top_n_passages_participate() {
        let mut pool: Vec<_> = (0..12).map(|_| passage(Some("POS"), None, 0.9)).collect();
        pool.extend((0..20).map(|_| passage(Some("Fryer"), None, 0.1)));

        let outcome = vote(&pool, 12);
        assert_eq!(outcome.equipment_type.as_deref(), Some("POS"));
        assert_eq!(outcome.dominance, 1.0);
    }

    #[test]
    fn ties_break_toward_lexically_smaller_label() {
        // Symmetric weights regardless of input order.
        let pool = vec![
            passage(Some("Oven"), None, 0.9),
            passage(Some("Fryer"), None, 0.8),
            passage(Some("Fryer"), None, 0.7),
            passage(Some("Oven"), None, 0.6),
        ];
        // Weights with top_n 4: Oven 4 + 1 = 5, Fryer 3 + 2 = 5.
        let outcome = vote(&pool, 4);
        assert_eq!(outcome.equipment_type.as_deref(), Some("Fryer"));
        assert!((outcome.dominance - 0.5).abs() < 1e-6);
    }

    #[test]
    fn dominant_majority_scores_expected_fraction() {
        // 9 of 12 passages share one type; weights 12..=4 for the majority
        // (ranks 0-8) and 3, 2, 1 for the rest.
        let mut pool: Vec<_> = (0..9)
            .map(|_| passage(Some("Coffee_Maker"), Some("Metos"), 0.8))
            .collect();
        pool.extend((0..3).map(|_| passage(Some("Espresso_Machine"), None, 0.4)));

        let outcome = vote(&pool, 12);
        assert_eq!(outcome.equipment_type.as_deref(), Some("Coffee_Maker"));
        let expected = 72.0 / 78.0;
        assert!((outcome.dominance - expected).abs() < 1e-6);
    }
}
