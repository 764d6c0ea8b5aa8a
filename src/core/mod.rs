//! Combination engine.
//!
//! This module contains:
//! - OverlapClusterer: partitions a document's annotations by span overlap
//! - LinkGroup: per-cluster aggregation by target entity
//! - Ranking / RoverScorer: rank-weighted reliability scores
//! - SelectionPolicy: winner selection with recorded rationale
//! - Combiner: per-document driver and corpus runner

pub mod cluster;
pub mod combiner;
pub mod error;
pub mod link_group;
pub mod rover;
pub mod selection;
pub mod settings;

// Re-export commonly used types
pub use cluster::{ClusterMode, OverlapClusterer};
pub use combiner::{merge_by_position, Cluster, Combiner, DocumentOutcome};
pub use error::CombineError;
pub use link_group::{build_link_groups, LinkGroup};
pub use rover::{Ranking, RoverScorer};
pub use selection::{Candidates, MentionSelection, SelectionPolicy};
pub use settings::CombinationSettings;
