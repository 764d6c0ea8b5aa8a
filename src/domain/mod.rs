//! Domain types for the combination engine.
//!
//! This module contains the core data structures:
//! - Span: half-open character ranges and the overlap rule
//! - Entity / Mention: interned knowledge-base targets and surface strings
//! - Annotation: one service's (mention, entity) pair
//! - Registry: intern tables shared across documents

pub mod annotation;
pub mod entity;
pub mod registry;
pub mod span;

// Re-export commonly used types
pub use annotation::{Annotation, AnnotationRecord, SelectedAnnotation, SelectionReason};
pub use entity::{
    normalize_link, normalize_surface, Categories, Entity, EntityAttrs, Mention, MentionKey, NORMALIZED_CATEGORY_SOURCE,
};
pub use registry::Registry;
pub use span::{Span, SpanError};
