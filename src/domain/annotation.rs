//! Annotations: a mention linked to an entity by one service.
//!
//! Also holds the flat input and output records exchanged with the I/O
//! layer (`AnnotationRecord` in, `SelectedAnnotation` out).

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::entity::{Entity, Mention};
use super::span::Span;

/// A (mention, entity) pair produced by one service
#[derive(Debug, Clone)]
pub struct Annotation {
    /// Interned mention (document + span + surface)
    pub mention: Arc<Mention>,

    /// Interned entity
    pub entity: Arc<Entity>,

    /// Service that produced this annotation
    pub service: String,

    /// Confidence reported by the service
    pub confidence: f64,

    /// Sentence number within the document (1-indexed), if known
    pub sentence: Option<u32>,

    /// Services that voted for this annotation's entity (set on selection)
    pub entity_voters: Vec<String>,

    /// Services that voted for this annotation's surface (set on selection)
    pub mention_voters: Vec<String>,
}

impl Annotation {
    pub fn new(
        mention: Arc<Mention>,
        entity: Arc<Entity>,
        service: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            mention,
            entity,
            service: service.into(),
            confidence,
            sentence: None,
            entity_voters: Vec::new(),
            mention_voters: Vec::new(),
        }
    }

    pub fn with_sentence(mut self, sentence: Option<u32>) -> Self {
        self.sentence = sentence;
        self
    }

    pub fn span(&self) -> Span {
        self.mention.span()
    }

    pub fn document_id(&self) -> &str {
        self.mention.document_id()
    }

    pub fn surface(&self) -> &str {
        self.mention.surface()
    }

    pub fn link(&self) -> &str {
        self.entity.link()
    }

    /// Find the sentence containing this annotation's span.
    ///
    /// `sentences` maps sentence spans to sentence numbers, as produced by
    /// an external sentence splitter.
    pub fn find_sentence_number(&self, sentences: &[(Span, u32)]) -> Option<u32> {
        let span = self.span();
        sentences
            .iter()
            .find(|(sentence, _)| sentence.contains(&span))
            .map(|(_, number)| *number)
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{:.3}\t{}",
            self.surface(),
            self.span(),
            self.link(),
            self.confidence,
            self.service
        )
    }
}

/// Flat annotation record handed to the combiner by the readers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub document_id: String,
    pub start: usize,
    pub end: usize,
    pub entity_link: String,
    pub service: String,
    pub confidence: f64,
    pub surface: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentence: Option<u32>,
    /// Normalized category reported alongside the link
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Why a link group won its cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SelectionReason {
    /// A group without the best service outscored every best-service group
    HigherBeatsBest,
    /// Best-service group beat the competing high-scoring groups
    BestBeatsHigher,
    /// Only best-service groups were candidates
    BestAlone,
    /// No best-service group; a group scored above the ceiling
    HigherAlone,
}

impl SelectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionReason::HigherBeatsBest => "HigherBeatsBest",
            SelectionReason::BestBeatsHigher => "BestBeatsHigher",
            SelectionReason::BestAlone => "BestAlone",
            SelectionReason::HigherAlone => "HigherAlone",
        }
    }

    /// Short code used in the legacy group dumps
    pub fn code(&self) -> &'static str {
        match self {
            SelectionReason::HigherBeatsBest => "HgtB",
            SelectionReason::BestBeatsHigher => "BgtH",
            SelectionReason::BestAlone => "BH0",
            SelectionReason::HigherAlone => "HB0",
        }
    }
}

impl fmt::Display for SelectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output record: the annotation chosen for one cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedAnnotation {
    pub document_id: String,
    pub start: usize,
    pub end: usize,
    pub surface: String,
    pub entity_link: String,
    pub confidence: f64,
    pub service: String,
    pub selection_reason: SelectionReason,
    pub entity_voters: Vec<String>,
    pub mention_voters: Vec<String>,
}

impl SelectedAnnotation {
    pub fn from_annotation(annotation: &Annotation, reason: SelectionReason) -> Self {
        let span = annotation.span();
        Self {
            document_id: annotation.document_id().to_string(),
            start: span.start(),
            end: span.end(),
            surface: annotation.surface().to_string(),
            entity_link: annotation.link().to_string(),
            confidence: annotation.confidence,
            service: annotation.service.clone(),
            selection_reason: reason,
            entity_voters: annotation.entity_voters.clone(),
            mention_voters: annotation.mention_voters.clone(),
        }
    }

    pub fn span(&self) -> Option<Span> {
        Span::new(self.start, self.end).ok()
    }

    pub fn surface_len(&self) -> usize {
        self.surface.chars().count()
    }
}
