//! Knowledge-base entities and the mentions that point to them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use super::span::Span;

/// Category evidence keyed by source (e.g. "wiki", "dbpediao")
pub type Categories = BTreeMap<String, Vec<String>>;

/// Evidence source holding normalized category codes from the result files
pub const NORMALIZED_CATEGORY_SOURCE: &str = "normcat";

/// A knowledge-base entity, identified by its normalized link label.
///
/// Shared between every annotation pointing to the same label. The link is
/// immutable; contributing services and category data are updated in place
/// by the registry.
#[derive(Debug)]
pub struct Entity {
    link: String,
    attrs: RwLock<EntityAttrs>,
}

/// Mutable attributes of an entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityAttrs {
    /// Services that produced this entity
    pub services: BTreeSet<String>,

    /// Category tags by source
    #[serde(default)]
    pub categories: Categories,

    /// Normalized category code ("PER", "ORG", "LOC", ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized_category: Option<String>,
}

impl Entity {
    pub(crate) fn new(link: String) -> Self {
        Self {
            link,
            attrs: RwLock::new(EntityAttrs::default()),
        }
    }

    /// Normalized link label
    pub fn link(&self) -> &str {
        &self.link
    }

    /// Snapshot of the current attributes
    pub fn attrs(&self) -> EntityAttrs {
        self.attrs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Services that produced this entity, sorted
    pub fn services(&self) -> Vec<String> {
        self.attrs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .services
            .iter()
            .cloned()
            .collect()
    }

    pub fn normalized_category(&self) -> Option<String> {
        self.attrs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .normalized_category
            .clone()
    }

    /// Set the normalized category (owned by the external classification step)
    pub fn set_normalized_category(&self, category: impl Into<String>) {
        self.attrs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .normalized_category = Some(category.into());
    }

    pub(crate) fn add_service(&self, service: &str) {
        self.attrs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .services
            .insert(service.to_string());
    }

    /// Merge category evidence. The first normalized code seen becomes the
    /// entity's normalized category if it has none yet.
    pub(crate) fn merge_categories(&self, categories: &Categories) {
        let mut attrs = self.attrs.write().unwrap_or_else(PoisonError::into_inner);
        if attrs.normalized_category.is_none() {
            attrs.normalized_category = categories
                .get(NORMALIZED_CATEGORY_SOURCE)
                .and_then(|codes| codes.first())
                .cloned();
        }
        for (source, tags) in categories {
            let existing = attrs.categories.entry(source.clone()).or_default();
            for tag in tags {
                if !existing.contains(tag) {
                    existing.push(tag.clone());
                }
            }
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.link)
    }
}

/// Key identifying a mention: document plus span
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MentionKey {
    pub document_id: String,
    pub span: Span,
}

/// A surface string picked by a service at a given span. Immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mention {
    key: MentionKey,
    surface: String,
}

impl Mention {
    pub(crate) fn new(key: MentionKey, surface: String) -> Self {
        Self { key, surface }
    }

    pub fn key(&self) -> &MentionKey {
        &self.key
    }

    pub fn document_id(&self) -> &str {
        &self.key.document_id
    }

    pub fn span(&self) -> Span {
        self.key.span
    }

    pub fn surface(&self) -> &str {
        &self.surface
    }

    /// Surface length in characters
    pub fn surface_len(&self) -> usize {
        self.surface.chars().count()
    }
}

/// Normalize an entity label: spaces become underscores
pub fn normalize_link(link: &str) -> String {
    link.trim().replace(' ', "_")
}

/// Normalize a surface string.
///
/// Newline runs become one space, then any run of two or more whitespace
/// characters collapses to a single space.
pub fn normalize_surface(surface: &str) -> String {
    let mut out = String::with_capacity(surface.len());
    let mut chars = surface.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\n' {
            while chars.peek() == Some(&'\n') {
                chars.next();
            }
            out.push(' ');
            continue;
        }
        out.push(c);
    }

    let mut collapsed = String::with_capacity(out.len());
    let mut run: Vec<char> = Vec::new();
    for c in out.chars() {
        if c.is_whitespace() {
            run.push(c);
            continue;
        }
        flush_whitespace(&mut collapsed, &mut run);
        collapsed.push(c);
    }
    flush_whitespace(&mut collapsed, &mut run);

    collapsed
}

fn flush_whitespace(out: &mut String, run: &mut Vec<char>) {
    match run.len() {
        0 => {}
        1 => out.push(run[0]),
        _ => out.push(' '),
    }
    run.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_link() {
        assert_eq!(normalize_link("Barack Obama"), "Barack_Obama");
        assert_eq!(normalize_link("Barack_Obama"), "Barack_Obama");
        assert_eq!(normalize_link(" Paris "), "Paris");
    }

    #[test]
    fn test_normalize_surface() {
        assert_eq!(normalize_surface("New\n\nYork"), "New York");
        assert_eq!(normalize_surface("New   York"), "New York");
        assert_eq!(normalize_surface("New\tYork"), "New\tYork");
        assert_eq!(normalize_surface("New \t York"), "New York");
        assert_eq!(normalize_surface("Obama"), "Obama");
    }

    #[test]
    fn test_merge_categories_dedups_tags() {
        let entity = Entity::new("Paris".to_string());
        let mut cats = Categories::new();
        cats.insert("dbpediao".to_string(), vec!["Place".to_string()]);
        entity.merge_categories(&cats);
        entity.merge_categories(&cats);

        let attrs = entity.attrs();
        assert_eq!(attrs.categories["dbpediao"], vec!["Place".to_string()]);
        assert_eq!(attrs.normalized_category, None);
    }

    #[test]
    fn test_first_normalized_code_is_kept() {
        let entity = Entity::new("Paris".to_string());
        let mut cats = Categories::new();
        cats.insert(NORMALIZED_CATEGORY_SOURCE.to_string(), vec!["LOC".to_string()]);
        entity.merge_categories(&cats);

        cats.insert(NORMALIZED_CATEGORY_SOURCE.to_string(), vec!["ORG".to_string()]);
        entity.merge_categories(&cats);

        let attrs = entity.attrs();
        assert_eq!(attrs.normalized_category.as_deref(), Some("LOC"));
        assert_eq!(attrs.categories[NORMALIZED_CATEGORY_SOURCE], vec!["LOC", "ORG"]);
    }

    #[test]
    fn test_surface_len_counts_chars() {
        let key = MentionKey {
            document_id: "doc".to_string(),
            span: Span::new(0, 6).unwrap(),
        };
        let mention = Mention::new(key, "Zürich".to_string());
        assert_eq!(mention.surface_len(), 6);
    }
}
