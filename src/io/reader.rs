//! Readers for normalized per-service result files.
//!
//! Each service writes one TSV file for the whole corpus:
//!
//! ```text
//! doc  mtn  start  end  link  service  confidence  [sentence]  [category]
//! ```
//!
//! An optional header row starts with `doc\tmtn\tstart\tend\t`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::domain::AnnotationRecord;

/// Prefix of the header row written by the annotation runners
pub const HEADER_PREFIX: &str = "doc\tmtn\tstart\tend\t";

/// Source of annotation records for one service
#[async_trait]
pub trait AnnotationSource: Send + Sync {
    /// Service the records are attributed to
    fn service(&self) -> &str;

    /// Load all records for the corpus
    async fn load(&self) -> Result<Vec<AnnotationRecord>>;
}

/// Outcome of parsing one result file
#[derive(Debug, Clone, Default)]
pub struct ParsedResults {
    pub records: Vec<AnnotationRecord>,
    /// Malformed rows
    pub skipped: usize,
    /// Rows below the confidence threshold
    pub filtered: usize,
}

/// Parse result-file content attributed to `service`.
///
/// The `service` argument wins over the file's service column. Rows below
/// `min_confidence` are dropped when a threshold is given.
pub fn parse_results(service: &str, content: &str, min_confidence: Option<f64>) -> ParsedResults {
    let mut parsed = ParsedResults::default();
    let mut mismatched = 0usize;

    for (line_no, line) in content.lines().enumerate() {
        if line.starts_with(HEADER_PREFIX) {
            continue;
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            continue;
        }

        let record = match parse_row(line) {
            Ok(record) => record,
            Err(reason) => {
                warn!(%service, line = line_no + 1, "Skipping row: {}", reason);
                parsed.skipped += 1;
                continue;
            }
        };

        if let Some(threshold) = min_confidence {
            if record.confidence < threshold {
                parsed.filtered += 1;
                continue;
            }
        }

        if record.service != service {
            mismatched += 1;
        }

        parsed.records.push(AnnotationRecord {
            service: service.to_string(),
            ..record
        });
    }

    if mismatched > 0 {
        warn!(%service, rows = mismatched, "Service column differs from the configured name");
    }

    debug!(
        %service,
        records = parsed.records.len(),
        skipped = parsed.skipped,
        filtered = parsed.filtered,
        "Parsed results"
    );
    parsed
}

fn parse_row(line: &str) -> Result<AnnotationRecord, String> {
    let cols: Vec<&str> = line.split('\t').collect();
    if cols.len() < 7 {
        return Err(format!("expected at least 7 columns, found {}", cols.len()));
    }

    let document_id = cols[0].trim();
    if document_id.is_empty() {
        return Err("empty document id".to_string());
    }

    let start = cols[2]
        .trim()
        .parse::<usize>()
        .map_err(|e| format!("bad start '{}': {}", cols[2], e))?;
    let end = cols[3]
        .trim()
        .parse::<usize>()
        .map_err(|e| format!("bad end '{}': {}", cols[3], e))?;
    let confidence = cols[6]
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("bad confidence '{}': {}", cols[6], e))?;

    let (sentence, category) = match &cols[7..] {
        [] => (None, None),
        [only] => match only.trim().parse::<u32>() {
            Ok(number) => (Some(number), None),
            Err(_) => (None, non_empty(only)),
        },
        [.., sentence, category] => (sentence.trim().parse::<u32>().ok(), non_empty(category)),
    };

    Ok(AnnotationRecord {
        document_id: document_id.to_string(),
        start,
        end,
        entity_link: cols[4].trim().to_string(),
        service: cols[5].trim().to_string(),
        confidence,
        surface: cols[1].to_string(),
        sentence,
        category,
    })
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// TSV result file on disk
#[derive(Debug, Clone)]
pub struct TsvResultFile {
    service: String,
    path: PathBuf,
    min_confidence: Option<f64>,
}

impl TsvResultFile {
    pub fn new(service: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            service: service.into(),
            path: path.into(),
            min_confidence: None,
        }
    }

    /// Drop rows below `threshold`
    pub fn with_min_confidence(mut self, threshold: Option<f64>) -> Self {
        self.min_confidence = threshold;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AnnotationSource for TsvResultFile {
    fn service(&self) -> &str {
        &self.service
    }

    async fn load(&self) -> Result<Vec<AnnotationRecord>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read results for {}: {}", self.service, self.path.display()))?;

        Ok(parse_results(&self.service, &content, self.min_confidence).records)
    }
}

/// Derive a service name from a result file name such as
/// `conll-tagme-sam1.mapped` or `tagme.tsv`
pub fn service_from_filename(path: &Path, known: &[String]) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;

    known
        .iter()
        .filter(|service| stem.split(['-', '_', '.']).any(|part| part == service.as_str()))
        .max_by_key(|service| service.len())
        .cloned()
}
