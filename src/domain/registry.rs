//! Interning of entities and mentions.
//!
//! Every service that links the same label gets the same `Entity`, and every
//! service that picks the same (document, start, end) gets the same
//! `Mention`. The registry is the only state shared between document workers,
//! so each map sits behind its own mutex.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use super::annotation::{Annotation, AnnotationRecord};
use super::entity::{
    normalize_link, normalize_surface, Categories, Entity, Mention, MentionKey, NORMALIZED_CATEGORY_SOURCE,
};
use super::span::{Span, SpanError};

/// Intern tables for one run
#[derive(Debug, Default)]
pub struct Registry {
    entities: Mutex<HashMap<String, Arc<Entity>>>,
    mentions: Mutex<HashMap<MentionKey, Arc<Mention>>>,
    /// Services allowed to add categories to an already-known entity
    redo_categories: BTreeSet<String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry where `services` may re-enrich categories of known entities
    pub fn with_redo_categories<I, S>(services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            redo_categories: services.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Return the entity for `link`, creating it on first sight.
    ///
    /// Category evidence is always recorded for a new entity. For a known
    /// entity it is merged only if `service` has re-enrichment enabled.
    pub fn intern_entity(
        &self,
        link: &str,
        service: &str,
        categories: Option<&Categories>,
    ) -> Arc<Entity> {
        let link = normalize_link(link);
        let mut entities = self.entities.lock().unwrap_or_else(PoisonError::into_inner);

        let entity = match entities.get(&link) {
            Some(existing) => {
                if let Some(categories) = categories {
                    if self.redo_categories.contains(service) {
                        existing.merge_categories(categories);
                    } else {
                        debug!(%link, %service, "Category re-enrichment disabled, keeping existing");
                    }
                }
                Arc::clone(existing)
            }
            None => {
                let entity = Arc::new(Entity::new(link.clone()));
                if let Some(categories) = categories {
                    entity.merge_categories(categories);
                }
                entities.insert(link, Arc::clone(&entity));
                entity
            }
        };

        entity.add_service(service);
        entity
    }

    /// Return the mention at (document, span), creating it on first sight.
    ///
    /// The first surface seen for a key is kept.
    pub fn intern_mention(&self, document_id: &str, span: Span, surface: &str) -> Arc<Mention> {
        let key = MentionKey {
            document_id: document_id.to_string(),
            span,
        };
        let mut mentions = self.mentions.lock().unwrap_or_else(PoisonError::into_inner);

        Arc::clone(
            mentions
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mention::new(key, normalize_surface(surface)))),
        )
    }

    /// Build an interned annotation from a flat record.
    ///
    /// Without explicit `categories`, the record's category column is used
    /// as evidence under the `normcat` source, so it follows the same
    /// re-enrichment rule.
    pub fn annotate(
        &self,
        record: &AnnotationRecord,
        categories: Option<&Categories>,
    ) -> Result<Annotation, SpanError> {
        let span = Span::new(record.start, record.end)?;
        let mention = self.intern_mention(&record.document_id, span, &record.surface);

        let from_record = record.category.as_ref().map(|code| {
            Categories::from([(NORMALIZED_CATEGORY_SOURCE.to_string(), vec![code.clone()])])
        });
        let entity = self.intern_entity(
            &record.entity_link,
            &record.service,
            categories.or(from_record.as_ref()),
        );

        Ok(Annotation::new(mention, entity, record.service.clone(), record.confidence)
            .with_sentence(record.sentence))
    }

    /// Look up an entity without creating it
    pub fn entity(&self, link: &str) -> Option<Arc<Entity>> {
        self.entities
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&normalize_link(link))
            .cloned()
    }

    pub fn entity_count(&self) -> usize {
        self.entities
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn mention_count(&self) -> usize {
        self.mentions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
