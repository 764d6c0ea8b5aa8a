//! Per-cluster grouping of annotations by target entity.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{Annotation, SelectionReason};

/// Annotations of one cluster that point to the same entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkGroup {
    /// Normalized entity link
    pub link: String,

    /// Votes per contributing service
    pub services: BTreeMap<String, u32>,

    /// Indices of member annotations within the cluster
    pub members: Vec<usize>,

    /// Supporting annotations per distinct surface string
    pub mention_votes: BTreeMap<String, u32>,

    /// ROVER score, filled in by the scorer
    pub score: f64,

    /// Set on the group that won its cluster
    pub selected: Option<SelectionReason>,
}

impl LinkGroup {
    pub fn new(link: impl Into<String>) -> Self {
        Self {
            link: link.into(),
            services: BTreeMap::new(),
            members: Vec::new(),
            mention_votes: BTreeMap::new(),
            score: 0.0,
            selected: None,
        }
    }

    /// Tally one annotation
    pub fn add(&mut self, index: usize, annotation: &Annotation) {
        *self.services.entry(annotation.service.clone()).or_insert(0) += 1;
        *self
            .mention_votes
            .entry(annotation.surface().to_string())
            .or_insert(0) += 1;
        self.members.push(index);
    }

    pub fn has_voter(&self, service: &str) -> bool {
        self.services.contains_key(service)
    }

    pub fn voters(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    pub fn is_selected(&self) -> bool {
        self.selected.is_some()
    }
}

/// Group a cluster's annotations by entity link.
///
/// Member indices refer to positions in `annotations`.
pub fn build_link_groups(annotations: &[Annotation]) -> BTreeMap<String, LinkGroup> {
    let mut groups: BTreeMap<String, LinkGroup> = BTreeMap::new();

    for (index, annotation) in annotations.iter().enumerate() {
        groups
            .entry(annotation.link().to_string())
            .or_insert_with(|| LinkGroup::new(annotation.link()))
            .add(index, annotation);
    }

    groups
}
