//! File I/O around the combination engine.
//!
//! This module contains:
//! - Reader: per-service TSV result files (`AnnotationSource`)
//! - Export: selected.tsv and neleval exports
//! - DecisionLog: JSONL record of every cluster decision
//! - Manifest: run metadata with input digests

pub mod decision_log;
pub mod export;
pub mod manifest;
pub mod reader;

// Re-export commonly used types
pub use decision_log::{ClusterRecord, DecisionLog, LinkGroupRecord, MemberRecord};
pub use export::{dedup_overlapping, render_neleval, render_selected, NelevalRow};
pub use manifest::{compute_digest, digest_file, InputEntry, RunCounts, RunManifest};
pub use reader::{parse_results, service_from_filename, AnnotationSource, ParsedResults, TsvResultFile};
