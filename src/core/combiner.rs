//! Per-document combination driver.
//!
//! Turns a document's annotation records into clusters, scores the link
//! groups of each cluster and records the selection. Documents are
//! independent; the corpus runner fans them out to blocking tasks.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::domain::{Annotation, AnnotationRecord, Registry, SelectedAnnotation, SelectionReason};

use super::cluster::OverlapClusterer;
use super::error::CombineError;
use super::link_group::{build_link_groups, LinkGroup};
use super::rover::RoverScorer;
use super::selection::{Candidates, SelectionPolicy};
use super::settings::CombinationSettings;

/// One cluster of overlapping annotations and its decision
#[derive(Debug, Clone)]
pub struct Cluster {
    pub annotations: Vec<Annotation>,

    /// Scored link groups, ordered by link
    pub link_groups: Vec<LinkGroup>,

    /// Candidate pools the decision was taken from
    pub candidates: Candidates,

    /// Representative annotation of the winning group
    pub selected: Option<Annotation>,
}

impl Cluster {
    pub fn reason(&self) -> Option<SelectionReason> {
        self.link_groups.iter().find_map(|group| group.selected)
    }

    pub fn selected_group(&self) -> Option<&LinkGroup> {
        self.link_groups.iter().find(|group| group.is_selected())
    }

    /// Output record for the selected annotation
    pub fn selected_record(&self) -> Option<SelectedAnnotation> {
        let reason = self.reason()?;
        self.selected
            .as_ref()
            .map(|annotation| SelectedAnnotation::from_annotation(annotation, reason))
    }
}

/// Result of combining one document
#[derive(Debug, Clone)]
pub struct DocumentOutcome {
    pub document_id: String,
    pub clusters: Vec<Cluster>,
    /// Records dropped for invalid spans
    pub rejected: usize,
}

impl DocumentOutcome {
    pub fn selections(&self) -> impl Iterator<Item = SelectedAnnotation> + '_ {
        self.clusters.iter().filter_map(Cluster::selected_record)
    }

    pub fn annotation_count(&self) -> usize {
        self.clusters.iter().map(|c| c.annotations.len()).sum()
    }
}

/// Combination engine: clusterer, scorer and policy over a shared registry
#[derive(Debug)]
pub struct Combiner {
    registry: Arc<Registry>,
    clusterer: OverlapClusterer,
    scorer: RoverScorer,
    policy: SelectionPolicy,
}

impl Combiner {
    pub fn new(settings: &CombinationSettings, registry: Arc<Registry>) -> Result<Self, CombineError> {
        settings.validate()?;

        Ok(Self {
            registry,
            clusterer: OverlapClusterer::new(settings.clustering),
            scorer: RoverScorer::new(Arc::clone(&settings.ranking)),
            policy: SelectionPolicy::new(
                Arc::clone(&settings.ranking),
                settings.mention_selection,
                settings.linker_order.clone(),
            )?,
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn policy(&self) -> &SelectionPolicy {
        &self.policy
    }

    /// Combine the records of one document.
    ///
    /// Records with an invalid span are skipped with a warning and counted
    /// in `rejected`.
    pub fn combine_document(&self, document_id: &str, records: &[AnnotationRecord]) -> DocumentOutcome {
        let mut rejected = 0;
        let mut annotations = Vec::with_capacity(records.len());

        for record in records {
            match self.registry.annotate(record, None) {
                Ok(annotation) => annotations.push(annotation),
                Err(e) => {
                    warn!(
                        document = %document_id,
                        service = %record.service,
                        link = %record.entity_link,
                        "Rejected annotation: {}", e
                    );
                    rejected += 1;
                }
            }
        }

        let clusters: Vec<Cluster> = self
            .clusterer
            .cluster(annotations)
            .into_iter()
            .map(|members| self.decide(members))
            .collect();

        debug!(
            document = %document_id,
            clusters = clusters.len(),
            rejected,
            "Combined document"
        );

        DocumentOutcome {
            document_id: document_id.to_string(),
            clusters,
            rejected,
        }
    }

    /// Build, score and decide the link groups of one cluster
    pub fn decide(&self, annotations: Vec<Annotation>) -> Cluster {
        let mut link_groups: Vec<LinkGroup> = build_link_groups(&annotations).into_values().collect();
        for group in &mut link_groups {
            group.score = self.scorer.score(group);
        }

        let candidates = self.policy.candidates(&link_groups);
        let mut selected = None;

        if let Some((index, reason)) = self.policy.select_link_group(&link_groups) {
            link_groups[index].selected = Some(reason);
            selected = self.policy.select_annotation(&link_groups[index], &annotations);
        }

        Cluster {
            annotations,
            link_groups,
            candidates,
            selected,
        }
    }

    /// Combine every document, one blocking task per document.
    ///
    /// Outcomes come back ordered by document id.
    #[instrument(skip(self, documents), fields(documents = documents.len()))]
    pub async fn combine_corpus(
        self: Arc<Self>,
        documents: BTreeMap<String, Vec<AnnotationRecord>>,
    ) -> Result<Vec<DocumentOutcome>> {
        info!("Combining corpus");

        let mut tasks = tokio::task::JoinSet::new();
        for (document_id, records) in documents {
            let combiner = Arc::clone(&self);
            tasks.spawn_blocking(move || combiner.combine_document(&document_id, &records));
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            outcomes.push(joined.context("Document worker failed")?);
        }
        outcomes.sort_by(|a, b| a.document_id.cmp(&b.document_id));

        let selected: usize = outcomes.iter().map(|o| o.selections().count()).sum();
        let rejected: usize = outcomes.iter().map(|o| o.rejected).sum();
        info!(documents = outcomes.len(), selected, rejected, "Corpus combined");

        Ok(outcomes)
    }
}

/// Merge per-service records into per-document lists.
///
/// Services are visited in `linker_order` (unknown services last, by name).
/// Within one service the last record for a (document, span) wins, and
/// records with negative confidence are dropped.
pub fn merge_by_position(
    by_service: &BTreeMap<String, Vec<AnnotationRecord>>,
    linker_order: &[String],
) -> BTreeMap<String, Vec<AnnotationRecord>> {
    let mut services: Vec<&String> = by_service.keys().collect();
    let position = |service: &str| {
        linker_order
            .iter()
            .position(|known| known == service)
            .unwrap_or(usize::MAX)
    };
    services.sort_by(|a, b| position(a).cmp(&position(b)).then_with(|| a.cmp(b)));

    let mut merged: BTreeMap<String, Vec<AnnotationRecord>> = BTreeMap::new();

    for service in services {
        let mut latest: BTreeMap<(&str, usize, usize), &AnnotationRecord> = BTreeMap::new();
        for record in &by_service[service] {
            latest.insert((record.document_id.as_str(), record.start, record.end), record);
        }

        for record in latest.into_values() {
            if record.confidence < 0.0 {
                debug!(service = %service, document = %record.document_id, "Dropping negative confidence");
                continue;
            }
            merged
                .entry(record.document_id.clone())
                .or_default()
                .push(record.clone());
        }
    }

    merged
}
