//! Service ranking and the ROVER reliability score.
//!
//! Reference: De Wilde, Lamel et al., "ROVER"-style voting as used for
//! entity linking combination (LREC 2008, paper 908).
//!
//! ```text
//! term(s) = (N - (rank(s) + rank_spacer)) * weight(s)
//! score   = Σ term(s) / N          for s in voters ∩ ranked
//! ```

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use super::error::CombineError;
use super::link_group::LinkGroup;

/// Ranked services with their weights, derived once from configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Ranking {
    /// Eligible services in rank order (rank 0 first)
    order: Vec<String>,
    ranks: HashMap<String, usize>,
    /// Full weight table of the active scheme and evaluation mode
    weights: BTreeMap<String, f64>,
    rank_spacer: f64,
    ceiling: f64,
}

impl Ranking {
    /// Rank `eligible` services by descending weight.
    ///
    /// Equal weights are ordered by service name. `weights` may contain
    /// services that are not eligible; they never vote but still count
    /// towards the ceiling.
    pub fn new<S: AsRef<str>>(
        eligible: &[S],
        weights: &BTreeMap<String, f64>,
        rank_spacer: f64,
    ) -> Result<Self, CombineError> {
        if !rank_spacer.is_finite() {
            return Err(CombineError::NonFiniteSpacer(rank_spacer));
        }

        for (service, value) in weights {
            if !value.is_finite() {
                return Err(CombineError::NonFiniteWeight {
                    service: service.clone(),
                    value: *value,
                });
            }
        }

        let mut order: Vec<String> = Vec::new();
        for service in eligible {
            let service = service.as_ref();
            if !weights.contains_key(service) {
                return Err(CombineError::MissingWeight {
                    service: service.to_string(),
                });
            }
            if !order.iter().any(|s| s == service) {
                order.push(service.to_string());
            }
        }

        if order.is_empty() {
            return Err(CombineError::EmptyRanking);
        }

        order.sort_by(|a, b| weights[b].total_cmp(&weights[a]).then_with(|| a.cmp(b)));

        let ranks = order
            .iter()
            .enumerate()
            .map(|(rank, service)| (service.clone(), rank))
            .collect();

        let ceiling = weights.values().copied().fold(f64::NEG_INFINITY, f64::max);

        Ok(Self {
            order,
            ranks,
            weights: weights.clone(),
            rank_spacer,
            ceiling,
        })
    }

    /// Number of ranked services (N in the formula)
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Always false: an empty ranking is rejected on construction
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Services in rank order
    pub fn services(&self) -> &[String] {
        &self.order
    }

    pub fn contains(&self, service: &str) -> bool {
        self.ranks.contains_key(service)
    }

    pub fn rank_of(&self, service: &str) -> Option<usize> {
        self.ranks.get(service).copied()
    }

    pub fn weight_of(&self, service: &str) -> Option<f64> {
        self.weights.get(service).copied()
    }

    /// Service with rank 0
    pub fn best_service(&self) -> &str {
        &self.order[0]
    }

    /// Highest weight in the active weight table
    pub fn ceiling(&self) -> f64 {
        self.ceiling
    }

    pub fn rank_spacer(&self) -> f64 {
        self.rank_spacer
    }

    pub fn weights(&self) -> &BTreeMap<String, f64> {
        &self.weights
    }
}

/// Computes ROVER scores for link groups
#[derive(Debug, Clone)]
pub struct RoverScorer {
    ranking: std::sync::Arc<Ranking>,
}

impl RoverScorer {
    pub fn new(ranking: std::sync::Arc<Ranking>) -> Self {
        Self { ranking }
    }

    pub fn ranking(&self) -> &Ranking {
        &self.ranking
    }

    /// Score a link group from the services that voted for it
    pub fn score(&self, group: &LinkGroup) -> f64 {
        let score = self.score_voters(group.services.keys().map(String::as_str));
        debug!(link = %group.link, score, "ROVER");
        score
    }

    /// Score an arbitrary voter set. Unranked voters are ignored and
    /// duplicates count once.
    pub fn score_voters<'a, I>(&self, voters: I) -> f64
    where
        I: IntoIterator<Item = &'a str>,
    {
        let n = self.ranking.len() as f64;
        let mut seen: Vec<&str> = Vec::new();
        let mut total = 0.0;

        for service in voters {
            if seen.contains(&service) {
                continue;
            }
            seen.push(service);

            let (Some(rank), Some(weight)) =
                (self.ranking.rank_of(service), self.ranking.weight_of(service))
            else {
                continue;
            };

            let previous = total;
            total += (n - (rank as f64 + self.ranking.rank_spacer)) * weight;
            debug!(
                "    {} + ( {} - ( {} + {} ) ) * {} = {}",
                previous, n, rank, self.ranking.rank_spacer, weight, total
            );
        }

        total / n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn weights(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(s, w)| (s.to_string(), *w)).collect()
    }

    fn scorer(pairs: &[(&str, f64)], spacer: f64) -> RoverScorer {
        let table = weights(pairs);
        let eligible: Vec<&str> = pairs.iter().map(|(s, _)| *s).collect();
        RoverScorer::new(Arc::new(Ranking::new(&eligible, &table, spacer).unwrap()))
    }

    #[test]
    fn test_ranks_follow_descending_weight() {
        let table = weights(&[("tagme", 0.548), ("aida", 0.767), ("spotlight", 0.281)]);
        let ranking = Ranking::new(&["tagme", "aida", "spotlight"], &table, -1.75).unwrap();

        assert_eq!(ranking.rank_of("aida"), Some(0));
        assert_eq!(ranking.rank_of("tagme"), Some(1));
        assert_eq!(ranking.rank_of("spotlight"), Some(2));
        assert_eq!(ranking.best_service(), "aida");
        assert_eq!(ranking.len(), 3);
    }

    #[test]
    fn test_equal_weights_rank_by_name() {
        let table = weights(&[("zeta", 0.5), ("alpha", 0.5)]);
        let ranking = Ranking::new(&["zeta", "alpha"], &table, -1.75).unwrap();
        assert_eq!(ranking.services(), &["alpha".to_string(), "zeta".to_string()]);
    }

    #[test]
    fn test_ceiling_covers_unranked_services() {
        let table = weights(&[("tagme", 0.5), ("raida", 0.9)]);
        let ranking = Ranking::new(&["tagme"], &table, -1.75).unwrap();
        assert_eq!(ranking.ceiling(), 0.9);
        assert!(!ranking.contains("raida"));
    }

    #[test]
    fn test_empty_ranking_rejected() {
        let table = weights(&[("tagme", 0.5)]);
        let eligible: [&str; 0] = [];
        assert_eq!(
            Ranking::new(&eligible, &table, -1.75),
            Err(CombineError::EmptyRanking)
        );
    }

    #[test]
    fn test_missing_weight_rejected() {
        let table = weights(&[("tagme", 0.5)]);
        assert!(matches!(
            Ranking::new(&["tagme", "babelfy"], &table, -1.75),
            Err(CombineError::MissingWeight { .. })
        ));
    }

    #[test]
    fn test_non_finite_values_rejected() {
        let table = weights(&[("tagme", 0.5)]);
        assert!(matches!(
            Ranking::new(&["tagme"], &table, f64::NAN),
            Err(CombineError::NonFiniteSpacer(_))
        ));

        let table = weights(&[("tagme", f64::INFINITY)]);
        assert!(matches!(
            Ranking::new(&["tagme"], &table, -1.75),
            Err(CombineError::NonFiniteWeight { .. })
        ));
    }

    #[test]
    fn test_reference_scores() {
        let scorer = scorer(&[("A", 0.6), ("B", 0.4)], -1.75);

        assert!((scorer.score_voters(["A"]) - 1.125).abs() < 1e-9);
        assert!((scorer.score_voters(["B"]) - 0.55).abs() < 1e-9);
        assert!((scorer.score_voters(["A", "B"]) - 1.675).abs() < 1e-9);
    }

    #[test]
    fn test_unranked_and_duplicate_voters() {
        let scorer = scorer(&[("A", 0.6), ("B", 0.4)], -1.75);

        assert_eq!(scorer.score_voters(["C"]), 0.0);
        assert!((scorer.score_voters(["A", "A", "C"]) - 1.125).abs() < 1e-9);
    }

    #[test]
    fn test_score_non_decreasing_in_weight() {
        let mut previous = f64::NEG_INFINITY;
        for step in 0..=20 {
            let w = step as f64 * 0.05;
            let scorer = scorer(&[("A", 0.6), ("B", w), ("C", 0.3)], -1.75);
            let score = scorer.score_voters(["B"]);
            assert!(score >= previous, "weight {} gave {} < {}", w, score, previous);
            previous = score;
        }
    }
}
