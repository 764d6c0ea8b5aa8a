//! Character spans and the overlap rule used for clustering.
//!
//! All offsets are half-open `[start, end)` character positions into the
//! document text, exactly as the linking services report them.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A half-open character range `[start, end)` with `start < end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "SpanBounds")]
pub struct Span {
    start: usize,
    end: usize,
}

/// Unchecked bounds as they appear on the wire
#[derive(Deserialize)]
struct SpanBounds {
    start: usize,
    end: usize,
}

impl TryFrom<SpanBounds> for Span {
    type Error = SpanError;

    fn try_from(bounds: SpanBounds) -> Result<Self, Self::Error> {
        Span::new(bounds.start, bounds.end)
    }
}

/// Rejected span bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SpanError {
    #[error("Empty or inverted span: start {start} >= end {end}")]
    Inverted { start: usize, end: usize },
}

impl Span {
    /// Build a span, rejecting `start >= end`
    pub fn new(start: usize, end: usize) -> Result<Self, SpanError> {
        if start >= end {
            return Err(SpanError::Inverted { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    /// Standard half-open interval intersection.
    ///
    /// Covers shared start, shared end, nesting and partial crossing.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Whether `other` lies fully inside this span
    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.start, self.end)
    }
}
