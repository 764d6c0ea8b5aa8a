//! End-to-end combination run.
//!
//! Loads every service's results, merges them per position, combines the
//! corpus and writes the output directory:
//! selected.tsv, `<prefix>_neleval`, decisions.jsonl, manifest.json and
//! optionally individual/ per-service exports.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::core::{merge_by_position, CombinationSettings, Combiner};
use crate::domain::{AnnotationRecord, Registry, SelectedAnnotation};
use crate::io::{
    digest_file, export, AnnotationSource, ClusterRecord, DecisionLog, InputEntry, RunManifest, TsvResultFile,
};

/// A configured combination run
#[derive(Debug, Clone)]
pub struct CombineRun {
    /// One result file per service
    pub sources: Vec<TsvResultFile>,
    pub out_dir: PathBuf,
    pub prefix: String,
    /// Also write per-service neleval exports
    pub dump_individual: bool,
}

impl CombineRun {
    pub fn new(sources: Vec<TsvResultFile>, out_dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            sources,
            out_dir: out_dir.into(),
            prefix: prefix.into(),
            dump_individual: false,
        }
    }

    pub fn with_individual_dumps(mut self, enabled: bool) -> Self {
        self.dump_individual = enabled;
        self
    }

    /// Execute the run and return its manifest
    #[instrument(skip(self, settings), fields(scheme = %settings.scheme, out = %self.out_dir.display()))]
    pub async fn execute(&self, settings: &CombinationSettings) -> Result<RunManifest> {
        let services: Vec<&str> = self.sources.iter().map(|s| s.service()).collect();
        settings
            .validate_for(&services)
            .context("Services do not match the configured ranking")?;

        let run_id = Uuid::new_v4();
        info!(%run_id, services = ?services, "Starting combination run");

        fs::create_dir_all(&self.out_dir)
            .await
            .with_context(|| format!("Failed to create output directory: {}", self.out_dir.display()))?;

        let mut manifest = RunManifest::new(run_id, settings);

        let mut sources: Vec<&TsvResultFile> = self.sources.iter().collect();
        sources.sort_by(|a, b| {
            settings
                .linker_position(a.service())
                .cmp(&settings.linker_position(b.service()))
                .then_with(|| a.service().cmp(b.service()))
        });

        let mut by_service: BTreeMap<String, Vec<AnnotationRecord>> = BTreeMap::new();
        for source in sources {
            let service = source.service().to_string();
            let threshold = settings.confidence_filter(&service);
            let records = source
                .clone()
                .with_min_confidence(threshold)
                .load()
                .await?;

            info!(%service, records = records.len(), "Loaded results");
            if records.is_empty() {
                warn!(%service, "No annotations loaded");
            }

            manifest.inputs.push(InputEntry {
                service: service.clone(),
                path: source.path().to_path_buf(),
                digest: digest_file(source.path()).await?,
                records: records.len(),
            });

            if self.dump_individual {
                let path = export::write_individual(
                    &self.out_dir,
                    &self.prefix,
                    &service,
                    &records,
                    settings.min_confidence.get(&service).copied(),
                )
                .await?;
                manifest.outputs.insert(format!("individual/{}", service), path);
            }

            by_service.insert(service, records);
        }

        let documents = merge_by_position(&by_service, &settings.linker_order);

        let registry = Arc::new(Registry::with_redo_categories(settings.redo_categories.iter().cloned()));
        let combiner = Arc::new(Combiner::new(settings, registry)?);
        let outcomes = combiner.combine_corpus(documents).await?;

        let mut selected: Vec<SelectedAnnotation> = Vec::new();
        let mut decisions: Vec<ClusterRecord> = Vec::new();
        for outcome in &outcomes {
            selected.extend(outcome.selections());
            decisions.extend(ClusterRecord::from_outcome(run_id, outcome));

            manifest.counts.annotations += outcome.annotation_count();
            manifest.counts.clusters += outcome.clusters.len();
            manifest.counts.rejected += outcome.rejected;
        }
        manifest.counts.documents = outcomes.len();
        manifest.counts.selected = selected.len();

        let selected_path = export::write_selected(&self.out_dir, &selected).await?;
        manifest.outputs.insert("selected".to_string(), selected_path);

        let neleval_path = export::write_neleval(&self.out_dir, &self.prefix, &selected).await?;
        manifest.outputs.insert("neleval".to_string(), neleval_path);

        let log_path = self.out_dir.join("decisions.jsonl");
        remove_stale(&log_path).await?;
        DecisionLog::new(&log_path).append_all(&decisions).await?;
        manifest.outputs.insert("decisions".to_string(), log_path);

        manifest.finish();
        let manifest_path = manifest.save(&self.out_dir).await?;

        info!(
            %run_id,
            documents = manifest.counts.documents,
            selected = manifest.counts.selected,
            rejected = manifest.counts.rejected,
            manifest = %manifest_path.display(),
            "Combination run complete"
        );

        Ok(manifest)
    }
}

/// Remove output left over from an earlier run in the same directory
async fn remove_stale(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path)
            .await
            .with_context(|| format!("Failed to remove {}", path.display()))?;
    }
    Ok(())
}
