//! Partitioning a document's annotations into overlap clusters.
//!
//! Spans are half-open, so `(0, 5)` and `(5, 9)` do not overlap. Annotations
//! that share a span always end up in the same cluster. Invalid spans never
//! reach the clusterer: `Span` cannot hold one, and the combiner drops the
//! offending records before clustering.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{Annotation, Span};

/// How overlapping spans are chained into clusters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterMode {
    /// Connected components of the overlap graph
    #[default]
    Components,
    /// Legacy scan: absorb spans overlapping the previous span or the seed
    Chained,
    /// Legacy scan: absorb spans overlapping the previous span only
    #[serde(alias = "alt")]
    Adjacent,
}

impl ClusterMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterMode::Components => "components",
            ClusterMode::Chained => "chained",
            ClusterMode::Adjacent => "adjacent",
        }
    }
}

impl fmt::Display for ClusterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClusterMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "components" => Ok(ClusterMode::Components),
            "chained" => Ok(ClusterMode::Chained),
            "adjacent" | "alt" => Ok(ClusterMode::Adjacent),
            other => Err(format!(
                "unknown clustering mode '{}' (expected components, chained or adjacent)",
                other
            )),
        }
    }
}

/// Splits one document's annotations into clusters
#[derive(Debug, Clone, Copy, Default)]
pub struct OverlapClusterer {
    mode: ClusterMode,
}

impl OverlapClusterer {
    pub fn new(mode: ClusterMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> ClusterMode {
        self.mode
    }

    /// Partition `annotations` into clusters ordered by their first span.
    ///
    /// Within a cluster, annotations are ordered by span and then by input
    /// order.
    pub fn cluster(&self, annotations: Vec<Annotation>) -> Vec<Vec<Annotation>> {
        let mut by_span: BTreeMap<Span, Vec<Annotation>> = BTreeMap::new();
        for annotation in annotations {
            by_span.entry(annotation.span()).or_default().push(annotation);
        }

        let spans: Vec<Span> = by_span.keys().copied().collect();
        let span_clusters = self.cluster_spans(&spans);

        let mut buckets: Vec<Option<Vec<Annotation>>> = by_span.into_values().map(Some).collect();

        span_clusters
            .into_iter()
            .map(|members| {
                members
                    .into_iter()
                    .filter_map(|index| buckets[index].take())
                    .flatten()
                    .collect::<Vec<_>>()
            })
            .filter(|cluster| !cluster.is_empty())
            .collect()
    }

    /// Cluster sorted, distinct spans; returns index lists into `spans`
    fn cluster_spans(&self, spans: &[Span]) -> Vec<Vec<usize>> {
        if spans.is_empty() {
            return Vec::new();
        }

        let clusters = match self.mode {
            ClusterMode::Components => components(spans),
            ClusterMode::Chained => drop_dominated_singletons(scan(spans, true)),
            ClusterMode::Adjacent => scan(spans, false),
        };

        debug!(
            mode = %self.mode,
            spans = spans.len(),
            clusters = clusters.len(),
            "Clustered spans"
        );
        clusters
    }
}

/// Connected components over spans sorted by (start, end)
fn components(spans: &[Span]) -> Vec<Vec<usize>> {
    let mut clusters = Vec::new();
    let mut current = vec![0];
    let mut reach = spans[0].end();

    for (index, span) in spans.iter().enumerate().skip(1) {
        if span.start() < reach {
            current.push(index);
            reach = reach.max(span.end());
        } else {
            clusters.push(std::mem::replace(&mut current, vec![index]));
            reach = span.end();
        }
    }
    clusters.push(current);
    clusters
}

/// Legacy linear scan.
///
/// With `against_seed`, a span joins the open cluster if it overlaps the
/// previous span or the seed. In that mode the last absorbed span stays
/// unvisited and opens its own cluster later on.
fn scan(spans: &[Span], against_seed: bool) -> Vec<Vec<usize>> {
    let mut visited = vec![false; spans.len()];
    let mut clusters = Vec::new();

    for seed in 0..spans.len() {
        if visited[seed] {
            continue;
        }

        let mut members = vec![seed];
        let mut cursor = seed;
        while let Some(next) = spans.get(cursor + 1) {
            let joins = spans[cursor].overlaps(next) || (against_seed && spans[seed].overlaps(next));
            if !joins {
                break;
            }
            cursor += 1;
            members.push(cursor);
        }

        let settled = if against_seed && members.len() > 1 {
            &members[..members.len() - 1]
        } else {
            &members[..]
        };
        for &index in settled {
            visited[index] = true;
        }

        clusters.push(members);
    }

    clusters
}

/// Drop single-span clusters whose span also sits in a multi-span cluster
fn drop_dominated_singletons(clusters: Vec<Vec<usize>>) -> Vec<Vec<usize>> {
    let in_multi: HashSet<usize> = clusters
        .iter()
        .filter(|members| members.len() > 1)
        .flatten()
        .copied()
        .collect();

    clusters
        .into_iter()
        .filter(|members| members.len() > 1 || !members.iter().all(|m| in_multi.contains(m)))
        .collect()
}
