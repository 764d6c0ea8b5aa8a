//! Resolved combination settings.
//!
//! Built by the configuration layer from a scheme and an evaluation mode,
//! then handed to the combiner. Holds no I/O state.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::cluster::ClusterMode;
use super::error::CombineError;
use super::rover::Ranking;
use super::selection::MentionSelection;

/// Everything the engine needs to combine one corpus
#[derive(Debug, Clone)]
pub struct CombinationSettings {
    /// Weighting scheme name (usually the corpus)
    pub scheme: String,

    /// Evaluation mode the weights were taken from (sam, wam, ent)
    pub eval_mode: String,

    /// Ranked services, weights and spacer
    pub ranking: Arc<Ranking>,

    pub mention_selection: MentionSelection,

    pub clustering: ClusterMode,

    /// Display and iteration order for services
    pub linker_order: Vec<String>,

    /// Pairs of services that must not be ranked together
    pub exclusive: Vec<(String, String)>,

    /// Services allowed to re-enrich categories of known entities
    pub redo_categories: BTreeSet<String>,

    /// Minimum confidence per service for the active scheme and mode
    pub min_confidence: BTreeMap<String, f64>,

    /// Drop input rows below the service's minimum confidence
    pub use_confidence: bool,
}

impl CombinationSettings {
    /// Checks that do not depend on the supplied services
    pub fn validate(&self) -> Result<(), CombineError> {
        if self.mention_selection == MentionSelection::Service {
            return Err(CombineError::UnsupportedMentionSelection(
                self.mention_selection.to_string(),
            ));
        }

        for (first, second) in &self.exclusive {
            if self.ranking.contains(first) && self.ranking.contains(second) {
                return Err(CombineError::ExclusiveServices {
                    first: first.clone(),
                    second: second.clone(),
                });
            }
        }

        Ok(())
    }

    /// Fail-fast checks against the services about to be combined
    pub fn validate_for<S: AsRef<str>>(&self, services: &[S]) -> Result<(), CombineError> {
        self.validate()?;

        let supplied: BTreeSet<&str> = services.iter().map(AsRef::as_ref).collect();

        for (first, second) in &self.exclusive {
            if supplied.contains(first.as_str()) && supplied.contains(second.as_str()) {
                return Err(CombineError::ExclusiveServices {
                    first: first.clone(),
                    second: second.clone(),
                });
            }
        }

        if let Some(unranked) = supplied.iter().find(|s| !self.ranking.contains(s)) {
            return Err(CombineError::UnrankedService(unranked.to_string()));
        }

        if supplied.len() != self.ranking.len() {
            return Err(CombineError::ServiceCountMismatch {
                supplied: supplied.len(),
                ranked: self.ranking.len(),
            });
        }

        Ok(())
    }

    /// Confidence threshold applied when reading `service`, if any
    pub fn confidence_filter(&self, service: &str) -> Option<f64> {
        if self.use_confidence {
            self.min_confidence.get(service).copied()
        } else {
            None
        }
    }

    /// Position of `service` in the linker order; unknown services sort last
    pub fn linker_position(&self, service: &str) -> usize {
        self.linker_order
            .iter()
            .position(|known| known == service)
            .unwrap_or(usize::MAX)
    }
}
