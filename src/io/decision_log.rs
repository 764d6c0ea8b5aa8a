//! Append-only decision log.
//!
//! One JSON line per cluster, recording members, link groups with votes and
//! scores, and the selection. The `show` command replays it.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use uuid::Uuid;

use crate::core::{Cluster, DocumentOutcome};
use crate::domain::{SelectedAnnotation, SelectionReason};

/// A cluster member as logged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub surface: String,
    pub start: usize,
    pub end: usize,
    pub entity_link: String,
    pub confidence: f64,
    pub service: String,
}

/// A link group as logged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkGroupRecord {
    pub link: String,
    pub votes: BTreeMap<String, u32>,
    pub mention_votes: BTreeMap<String, u32>,
    pub score: f64,
    /// Voted for by the best service
    pub best_voted: bool,
    /// Without the best service, but scoring above the ceiling
    pub above_ceiling: bool,
    pub selected: Option<SelectionReason>,
}

/// One cluster decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub document_id: String,
    pub cluster_index: usize,
    pub members: Vec<MemberRecord>,
    pub link_groups: Vec<LinkGroupRecord>,
    pub reason: Option<SelectionReason>,
    /// Short legacy code of the reason (HgtB, BgtH, BH0, HB0)
    pub reason_code: Option<String>,
    pub selected: Option<SelectedAnnotation>,
}

impl ClusterRecord {
    pub fn from_cluster(run_id: Uuid, document_id: &str, cluster_index: usize, cluster: &Cluster) -> Self {
        let members = cluster
            .annotations
            .iter()
            .map(|a| MemberRecord {
                surface: a.surface().to_string(),
                start: a.span().start(),
                end: a.span().end(),
                entity_link: a.link().to_string(),
                confidence: a.confidence,
                service: a.service.clone(),
            })
            .collect();

        let link_groups = cluster
            .link_groups
            .iter()
            .enumerate()
            .map(|(index, group)| LinkGroupRecord {
                link: group.link.clone(),
                votes: group.services.clone(),
                mention_votes: group.mention_votes.clone(),
                score: group.score,
                best_voted: cluster.candidates.best.contains(&index),
                above_ceiling: cluster.candidates.higher.contains(&index),
                selected: group.selected,
            })
            .collect();

        let reason = cluster.reason();

        Self {
            run_id,
            timestamp: Utc::now(),
            document_id: document_id.to_string(),
            cluster_index,
            members,
            link_groups,
            reason,
            reason_code: reason.map(|r| r.code().to_string()),
            selected: cluster.selected_record(),
        }
    }

    /// Records for every cluster of a document
    pub fn from_outcome(run_id: Uuid, outcome: &DocumentOutcome) -> Vec<Self> {
        outcome
            .clusters
            .iter()
            .enumerate()
            .map(|(index, cluster)| Self::from_cluster(run_id, &outcome.document_id, index, cluster))
            .collect()
    }

    /// Render in the legacy group dump layout
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{0} GROUP {0}", "=".repeat(8));
        for member in &self.members {
            let _ = writeln!(
                out,
                "{}\t({}, {})\t{}\t{:.3}\t{}",
                member.surface, member.start, member.end, member.entity_link, member.confidence, member.service
            );
        }

        let sections: [(&str, fn(&LinkGroupRecord) -> bool); 3] = [
            ("BestP_LG", |g| g.best_voted),
            ("Highr_LG", |g| g.above_ceiling),
            ("SelectedLinkGroup", |g| g.selected.is_some()),
        ];

        for (title, include) in sections {
            let groups: Vec<&LinkGroupRecord> = self.link_groups.iter().filter(|g| include(g)).collect();
            let empty = if groups.is_empty() { ": 0" } else { "" };
            let _ = writeln!(out, "{0} {1} {0}{2}", "=".repeat(4), title, empty);
            for group in groups {
                out.push_str(&render_link_group(group));
            }
        }
        out
    }
}

fn render_link_group(group: &LinkGroupRecord) -> String {
    let mut out = String::new();
    match group.selected {
        Some(reason) => {
            let _ = writeln!(out, "== **SEL_{} LinkGroup [{}] ==", reason.code(), group.link);
        }
        None => {
            let _ = writeln!(out, "== __REJ LinkGroup [{}] ==", group.link);
        }
    }

    let votes: Vec<String> = group
        .votes
        .iter()
        .map(|(service, count)| format!("{}, {}", service, count))
        .collect();
    let mentions: Vec<&str> = group.mention_votes.keys().map(String::as_str).collect();

    let _ = writeln!(out, "  Votes: {}", votes.join("; "));
    let _ = writeln!(out, "  Mentions: {}", mentions.join(", "));
    let _ = writeln!(out, "  Rover: {}", group.score);
    out
}

/// JSONL file of cluster decisions
pub struct DecisionLog {
    path: PathBuf,
}

impl DecisionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append records to the log
    pub async fn append_all(&self, records: &[ClusterRecord]) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open decision log: {}", self.path.display()))?;

        let mut buffer = String::new();
        for record in records {
            let json = serde_json::to_string(record).context("Failed to serialize decision")?;
            buffer.push_str(&json);
            buffer.push('\n');
        }

        file.write_all(buffer.as_bytes())
            .await
            .context("Failed to write decisions")?;
        file.flush().await.context("Failed to flush decisions")?;

        Ok(())
    }

    /// Replay all records in order
    pub async fn replay(&self) -> Result<Vec<ClusterRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)
            .await
            .with_context(|| format!("Failed to open decision log: {}", self.path.display()))?;

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut records = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let record: ClusterRecord = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse decision: {}", line))?;
            records.push(record);
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(document_id: &str, index: usize, reason: Option<SelectionReason>) -> ClusterRecord {
        ClusterRecord {
            run_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            document_id: document_id.to_string(),
            cluster_index: index,
            members: vec![MemberRecord {
                surface: "Paris".to_string(),
                start: 0,
                end: 5,
                entity_link: "Paris".to_string(),
                confidence: 0.5,
                service: "tagme".to_string(),
            }],
            link_groups: vec![LinkGroupRecord {
                link: "Paris".to_string(),
                votes: [("tagme".to_string(), 1)].into_iter().collect(),
                mention_votes: [("Paris".to_string(), 1)].into_iter().collect(),
                score: 1.125,
                best_voted: true,
                above_ceiling: false,
                selected: reason,
            }],
            reason,
            reason_code: reason.map(|r| r.code().to_string()),
            selected: None,
        }
    }

    #[tokio::test]
    async fn test_append_and_replay() {
        let temp = TempDir::new().unwrap();
        let log = DecisionLog::new(temp.path().join("decisions.jsonl"));

        assert!(log.replay().await.unwrap().is_empty());

        let first = record("d1", 0, Some(SelectionReason::BestAlone));
        let second = record("d1", 1, None);
        log.append_all(&[first.clone()]).await.unwrap();
        log.append_all(&[second.clone()]).await.unwrap();

        let replayed = log.replay().await.unwrap();
        assert_eq!(replayed, vec![first, second]);
    }

    #[test]
    fn test_render_group_dump() {
        let dump = record("d1", 0, Some(SelectionReason::BestAlone)).render();
        assert!(dump.starts_with("======== GROUP ========\n"));
        assert!(dump.contains("==== BestP_LG ====\n"));
        assert!(dump.contains("==== Highr_LG ====: 0\n"));
        assert!(dump.contains("== **SEL_BH0 LinkGroup [Paris] =="));
        assert!(dump.contains("  Votes: tagme, 1\n"));
    }
}
