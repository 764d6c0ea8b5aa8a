//! Run manifest.
//!
//! Written once per run as `manifest.json`: what was combined, with which
//! settings, and how much came out.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use uuid::Uuid;

use crate::core::CombinationSettings;

/// Manifest format version
const MANIFEST_VERSION: u32 = 1;

/// One input file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputEntry {
    pub service: String,
    pub path: PathBuf,
    /// "sha256:<hex>"
    pub digest: String,
    pub records: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunCounts {
    pub documents: usize,
    pub annotations: usize,
    pub clusters: usize,
    pub selected: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub version: u32,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub scheme: String,
    pub eval_mode: String,
    pub rank_spacer: f64,
    pub mention_selection: String,
    pub clustering: String,
    /// Ranked services with their weights, best first
    pub ranking: Vec<(String, f64)>,
    pub best_service: String,
    pub ceiling: f64,
    pub inputs: Vec<InputEntry>,
    #[serde(default)]
    pub counts: RunCounts,
    /// Output name to path
    #[serde(default)]
    pub outputs: BTreeMap<String, PathBuf>,
}

impl RunManifest {
    pub fn new(run_id: Uuid, settings: &CombinationSettings) -> Self {
        let ranking = &settings.ranking;

        Self {
            version: MANIFEST_VERSION,
            run_id,
            started_at: Utc::now(),
            finished_at: None,
            scheme: settings.scheme.clone(),
            eval_mode: settings.eval_mode.clone(),
            rank_spacer: ranking.rank_spacer(),
            mention_selection: settings.mention_selection.to_string(),
            clustering: settings.clustering.to_string(),
            ranking: ranking
                .services()
                .iter()
                .map(|s| (s.clone(), ranking.weight_of(s).unwrap_or_default()))
                .collect(),
            best_service: ranking.best_service().to_string(),
            ceiling: ranking.ceiling(),
            inputs: Vec::new(),
            counts: RunCounts::default(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub async fn save(&self, out_dir: &Path) -> Result<PathBuf> {
        let path = out_dir.join("manifest.json");
        let content = serde_json::to_string_pretty(self).context("Failed to serialize manifest")?;
        fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write manifest: {}", path.display()))?;
        Ok(path)
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        serde_json::from_str(&content).context("Failed to parse manifest JSON")
    }
}

/// SHA-256 of a byte slice as "sha256:<hex>"
pub fn compute_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// Digest of a file on disk
pub async fn digest_file(path: &Path) -> Result<String> {
    let bytes = fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(compute_digest(&bytes))
}
