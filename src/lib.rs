//! elrover - ensemble combination of entity-linking annotations
//!
//! Several annotation services tag the same documents with entity mentions
//! (a character span, a knowledge-base link and a confidence). elrover
//! merges them into one adjudicated set.
//!
//! # Architecture
//!
//! Combination runs per document, in three steps:
//! - Overlapping spans are clustered across services
//! - Within a cluster, annotations are grouped by entity and each group gets
//!   a ROVER score from the rank and weight of the services that voted for it
//! - A fixed policy picks one winning group per cluster, and one annotation
//!   to represent it
//!
//! # Modules
//!
//! - `domain`: Data structures (Span, Entity, Mention, Annotation, Registry)
//! - `core`: Combination engine (clustering, scoring, selection)
//! - `config`: YAML configuration and weighting schemes
//! - `io`: Result readers, exports, decision log, manifest
//! - `runner`: End-to-end combination run
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Combine two services' results
//! elrover combine -i tagme=tagme.tsv -i aida=aida.tsv --scheme conll
//!
//! # Show the ranking of a scheme
//! elrover ranks --scheme tweets
//!
//! # Replay decisions for one document
//! elrover show elrover-out/decisions.jsonl --document 1163testb
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod io;
pub mod runner;

// Re-export main types at crate root for convenience
pub use crate::core::{CombinationSettings, CombineError, Combiner, DocumentOutcome, Ranking, RoverScorer, SelectionPolicy};
pub use domain::{Annotation, AnnotationRecord, Registry, SelectedAnnotation, SelectionReason, Span};
pub use runner::CombineRun;
