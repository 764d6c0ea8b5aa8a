//! Writers for combined output.
//!
//! - `selected.tsv`: one row per selected annotation, with voters
//! - `<prefix>_neleval`: neleval "unstitched" export (doc, start, end, link)
//! - `individual/<prefix>_<service>_neleval`: per-service exports

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::info;

use crate::domain::{AnnotationRecord, SelectedAnnotation, Span};

/// One row of the neleval export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NelevalRow {
    pub document_id: String,
    pub start: usize,
    pub end: usize,
    pub entity_link: String,
    /// Surface length in characters, used to settle overlaps
    pub surface_len: usize,
}

impl NelevalRow {
    fn overlaps(&self, other: &NelevalRow) -> bool {
        match (Span::new(self.start, self.end), Span::new(other.start, other.end)) {
            (Ok(a), Ok(b)) => a.overlaps(&b),
            _ => false,
        }
    }

    fn line(&self) -> String {
        format!("{}\t{}\t{}\t{}", self.document_id, self.start, self.end, self.entity_link)
    }
}

impl From<&SelectedAnnotation> for NelevalRow {
    fn from(selected: &SelectedAnnotation) -> Self {
        Self {
            document_id: selected.document_id.clone(),
            start: selected.start,
            end: selected.end,
            entity_link: selected.entity_link.clone(),
            surface_len: selected.surface_len(),
        }
    }
}

impl From<&AnnotationRecord> for NelevalRow {
    fn from(record: &AnnotationRecord) -> Self {
        Self {
            document_id: record.document_id.clone(),
            start: record.start,
            end: record.end,
            entity_link: crate::domain::normalize_link(&record.entity_link),
            surface_len: record.surface.chars().count(),
        }
    }
}

/// Remove overlaps and duplicates from one document's rows.
///
/// Rows are sorted by start. When a row overlaps the last kept row, the
/// longer surface stays; on equal length the later row replaces the kept
/// one. Running this on its own output changes nothing.
pub fn dedup_overlapping(mut rows: Vec<NelevalRow>) -> Vec<NelevalRow> {
    rows.sort_by(|a, b| (a.start, a.end).cmp(&(b.start, b.end)));

    let mut kept: Vec<NelevalRow> = Vec::with_capacity(rows.len());
    for row in rows {
        if let Some(last) = kept.last_mut() {
            if *last == row {
                continue;
            }
            if last.overlaps(&row) {
                if row.surface_len >= last.surface_len {
                    *last = row;
                }
                continue;
            }
        }
        kept.push(row);
    }
    kept
}

/// Render the neleval export: documents ascending, each deduplicated
pub fn render_neleval<I>(rows: I) -> String
where
    I: IntoIterator<Item = NelevalRow>,
{
    let mut by_document: BTreeMap<String, Vec<NelevalRow>> = BTreeMap::new();
    for row in rows {
        by_document.entry(row.document_id.clone()).or_default().push(row);
    }

    let mut out = String::new();
    for rows in by_document.into_values() {
        for row in dedup_overlapping(rows) {
            out.push_str(&row.line());
            out.push('\n');
        }
    }
    out
}

/// Render `selected.tsv`.
///
/// Columns: doc, surface, start, end, link, confidence, service, reason,
/// entity voters (`|`), mention voters (`:`).
pub fn render_selected(selected: &[SelectedAnnotation]) -> String {
    let mut ordered: Vec<&SelectedAnnotation> = selected.iter().collect();
    ordered.sort_by(|a, b| a.document_id.cmp(&b.document_id));

    let mut lines: Vec<String> = Vec::with_capacity(ordered.len());
    for annotation in ordered {
        let line = format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            annotation.document_id,
            annotation.surface,
            annotation.start,
            annotation.end,
            annotation.entity_link,
            annotation.confidence,
            annotation.service,
            annotation.selection_reason,
            annotation.entity_voters.join("|"),
            annotation.mention_voters.join(":"),
        );
        if !lines.contains(&line) {
            lines.push(line);
        }
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Path of the neleval export; `_neleval` is appended unless present
pub fn neleval_path(out_dir: &Path, prefix: &str) -> PathBuf {
    if prefix.ends_with("_neleval") {
        out_dir.join(prefix)
    } else {
        out_dir.join(format!("{}_neleval", prefix))
    }
}

pub async fn write_selected(out_dir: &Path, selected: &[SelectedAnnotation]) -> Result<PathBuf> {
    let path = out_dir.join("selected.tsv");
    fs::write(&path, render_selected(selected))
        .await
        .with_context(|| format!("Failed to write selected annotations: {}", path.display()))?;

    info!(path = %path.display(), rows = selected.len(), "Wrote selected annotations");
    Ok(path)
}

pub async fn write_neleval(out_dir: &Path, prefix: &str, selected: &[SelectedAnnotation]) -> Result<PathBuf> {
    let path = neleval_path(out_dir, prefix);
    fs::write(&path, render_neleval(selected.iter().map(NelevalRow::from)))
        .await
        .with_context(|| format!("Failed to write neleval export: {}", path.display()))?;

    info!(path = %path.display(), "Wrote neleval export");
    Ok(path)
}

/// Per-service export of raw inputs, filtered by `min_confidence`
pub async fn write_individual(
    out_dir: &Path,
    prefix: &str,
    service: &str,
    records: &[AnnotationRecord],
    min_confidence: Option<f64>,
) -> Result<PathBuf> {
    let dir = out_dir.join("individual");
    fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    let rows = records
        .iter()
        .filter(|r| min_confidence.map_or(true, |threshold| r.confidence >= threshold))
        .map(NelevalRow::from);

    let path = neleval_path(&dir, &format!("{}_{}", prefix, service));
    fs::write(&path, render_neleval(rows))
        .await
        .with_context(|| format!("Failed to write individual export: {}", path.display()))?;

    Ok(path)
}
