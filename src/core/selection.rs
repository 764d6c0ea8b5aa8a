//! Choosing the winning link group and its representative annotation.
//!
//! Candidates are split into two pools:
//! - `best`: groups the best service voted for
//! - `higher`: other groups scoring above the ceiling
//!
//! Every "highest score" step breaks ties on the smallest entity link.

use std::cmp::{Ordering, Reverse};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::CombineError;
use super::link_group::LinkGroup;
use super::rover::Ranking;
use crate::domain::{Annotation, SelectionReason};

/// How the representative annotation of the winning group is picked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MentionSelection {
    /// Longest surface string
    Longest,
    /// Surface string with the most supporting annotations
    #[default]
    Votes,
    /// Reserved; rejected when the policy is built
    Service,
}

impl MentionSelection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MentionSelection::Longest => "longest",
            MentionSelection::Votes => "votes",
            MentionSelection::Service => "service",
        }
    }
}

impl fmt::Display for MentionSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MentionSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "longest" => Ok(MentionSelection::Longest),
            "votes" => Ok(MentionSelection::Votes),
            "service" => Ok(MentionSelection::Service),
            other => Err(format!(
                "unknown mention selection '{}' (expected longest or votes)",
                other
            )),
        }
    }
}

/// Candidate pools of one cluster, as indices into its link groups
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Candidates {
    pub best: Vec<usize>,
    pub higher: Vec<usize>,
}

/// Deterministic winner selection for clusters
#[derive(Debug, Clone)]
pub struct SelectionPolicy {
    ranking: Arc<Ranking>,
    mode: MentionSelection,
    linker_order: Vec<String>,
}

impl SelectionPolicy {
    pub fn new(
        ranking: Arc<Ranking>,
        mode: MentionSelection,
        linker_order: Vec<String>,
    ) -> Result<Self, CombineError> {
        if mode == MentionSelection::Service {
            return Err(CombineError::UnsupportedMentionSelection(mode.to_string()));
        }

        Ok(Self {
            ranking,
            mode,
            linker_order,
        })
    }

    pub fn mode(&self) -> MentionSelection {
        self.mode
    }

    /// Split scored groups into the `best` and `higher` pools
    pub fn candidates(&self, groups: &[LinkGroup]) -> Candidates {
        let best_service = self.ranking.best_service();
        let ceiling = self.ranking.ceiling();
        let mut candidates = Candidates::default();

        for (index, group) in groups.iter().enumerate() {
            if group.has_voter(best_service) {
                candidates.best.push(index);
            } else if group.score > ceiling {
                candidates.higher.push(index);
            }
        }

        candidates
    }

    /// Pick the winning group among scored `groups`.
    ///
    /// Returns the group index and the reason, or `None` when no group
    /// qualifies.
    pub fn select_link_group(&self, groups: &[LinkGroup]) -> Option<(usize, SelectionReason)> {
        let Candidates { best, higher } = self.candidates(groups);

        let decision = match (best.is_empty(), higher.is_empty()) {
            (false, false) => {
                let max_best = best
                    .iter()
                    .map(|&i| groups[i].score)
                    .fold(f64::NEG_INFINITY, f64::max);
                let challengers: Vec<usize> = higher
                    .iter()
                    .copied()
                    .filter(|&i| groups[i].score > max_best)
                    .collect();

                match highest(groups, &challengers) {
                    Some(index) => Some((index, SelectionReason::HigherBeatsBest)),
                    None => highest(groups, &best).map(|i| (i, SelectionReason::BestBeatsHigher)),
                }
            }
            (false, true) => highest(groups, &best).map(|i| (i, SelectionReason::BestAlone)),
            (true, false) => highest(groups, &higher).map(|i| (i, SelectionReason::HigherAlone)),
            (true, true) => None,
        };

        if let Some((index, reason)) = decision {
            debug!(link = %groups[index].link, score = groups[index].score, %reason, "Selected link group");
        }
        decision
    }

    /// Pick the representative annotation of `group`.
    ///
    /// `annotations` is the cluster the group's member indices refer to. The
    /// returned annotation carries its entity and mention voters.
    pub fn select_annotation(&self, group: &LinkGroup, annotations: &[Annotation]) -> Option<Annotation> {
        let members: Vec<&Annotation> = group
            .members
            .iter()
            .filter_map(|&i| annotations.get(i))
            .collect();

        let representative = match self.mode {
            MentionSelection::Longest => longest(members.iter().copied())?,
            MentionSelection::Votes => {
                let surface = winning_surface(group)?;
                longest(members.iter().copied().filter(|a| a.surface() == surface))?
            }
            MentionSelection::Service => return None,
        };

        let mut selected = representative.clone();
        selected.entity_voters = self.order_voters(group.voters());
        selected.mention_voters = self.order_voters(
            members
                .iter()
                .filter(|a| a.surface() == representative.surface())
                .map(|a| a.service.as_str()),
        );

        Some(selected)
    }

    /// Deduplicate services and order them by linker order; unknown services
    /// go last, alphabetically.
    pub fn order_voters<'a, I>(&self, services: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut voters: Vec<String> = Vec::new();
        for service in services {
            if !voters.iter().any(|v| v == service) {
                voters.push(service.to_string());
            }
        }

        voters.sort_by_key(|service| {
            let position = self
                .linker_order
                .iter()
                .position(|known| known == service)
                .unwrap_or(usize::MAX);
            (position, service.clone())
        });
        voters
    }
}

/// Highest-scoring group among `indices`; ties go to the smallest link
fn highest(groups: &[LinkGroup], indices: &[usize]) -> Option<usize> {
    indices.iter().copied().min_by(|&a, &b| {
        groups[b]
            .score
            .total_cmp(&groups[a].score)
            .then_with(|| groups[a].link.cmp(&groups[b].link))
    })
}

/// Longest surface, then earliest span, then service name
fn longest<'a, I>(annotations: I) -> Option<&'a Annotation>
where
    I: Iterator<Item = &'a Annotation>,
{
    annotations.min_by(|a, b| longest_order(a, b))
}

fn longest_order(a: &Annotation, b: &Annotation) -> Ordering {
    let key = |x: &Annotation| (Reverse(x.mention.surface_len()), x.span());
    key(a).cmp(&key(b)).then_with(|| a.service.cmp(&b.service))
}

/// Most voted surface, then longest, then lexicographically smallest
fn winning_surface(group: &LinkGroup) -> Option<&str> {
    group
        .mention_votes
        .iter()
        .min_by(|(sa, va), (sb, vb)| {
            vb.cmp(va)
                .then_with(|| sb.chars().count().cmp(&sa.chars().count()))
                .then_with(|| sa.cmp(sb))
        })
        .map(|(surface, _)| surface.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn ranking(pairs: &[(&str, f64)]) -> Arc<Ranking> {
        let table: BTreeMap<String, f64> = pairs.iter().map(|(s, w)| (s.to_string(), *w)).collect();
        let eligible: Vec<&str> = pairs.iter().map(|(s, _)| *s).collect();
        Arc::new(Ranking::new(&eligible, &table, -1.75).unwrap())
    }

    fn policy(pairs: &[(&str, f64)]) -> SelectionPolicy {
        SelectionPolicy::new(ranking(pairs), MentionSelection::Longest, vec![]).unwrap()
    }

    fn group(link: &str, voters: &[&str], score: f64) -> LinkGroup {
        let mut group = LinkGroup::new(link);
        for voter in voters {
            group.services.insert(voter.to_string(), 1);
        }
        group.score = score;
        group
    }

    #[test]
    fn test_service_mode_rejected() {
        let result = SelectionPolicy::new(ranking(&[("A", 0.6)]), MentionSelection::Service, vec![]);
        assert!(matches!(result, Err(CombineError::UnsupportedMentionSelection(_))));
    }

    #[test]
    fn test_best_alone() {
        let policy = policy(&[("A", 0.6), ("B", 0.4)]);
        let groups = vec![group("X", &["A"], 1.125), group("Y", &["B"], 0.55)];
        assert_eq!(policy.select_link_group(&groups), Some((0, SelectionReason::BestAlone)));
    }

    #[test]
    fn test_higher_beats_best_picks_highest_challenger() {
        let policy = policy(&[("A", 0.6), ("B", 0.5), ("C", 0.45)]);
        let groups = vec![
            group("X", &["A"], 0.95),
            group("Y", &["B"], 0.97),
            group("Z", &["B", "C"], 1.0375),
        ];
        assert_eq!(policy.select_link_group(&groups), Some((2, SelectionReason::HigherBeatsBest)));
    }

    #[test]
    fn test_best_beats_higher() {
        let policy = policy(&[("A", 0.6), ("B", 0.5), ("C", 0.45)]);
        let groups = vec![group("X", &["A"], 0.95), group("Y", &["B"], 0.625)];
        assert_eq!(policy.select_link_group(&groups), Some((0, SelectionReason::BestBeatsHigher)));
    }

    #[test]
    fn test_higher_alone_and_no_selection() {
        let policy = policy(&[("A", 0.6), ("B", 0.5), ("C", 0.45)]);

        let groups = vec![group("Y", &["B"], 0.625), group("Z", &["C"], 0.4125)];
        assert_eq!(policy.select_link_group(&groups), Some((0, SelectionReason::HigherAlone)));

        let groups = vec![group("Z", &["C"], 0.4125)];
        assert_eq!(policy.select_link_group(&groups), None);
    }

    #[test]
    fn test_unranked_voters_yield_nothing() {
        let policy = policy(&[("A", 0.6), ("B", 0.4)]);
        let groups = vec![group("X", &["other"], 0.0)];
        assert_eq!(policy.select_link_group(&groups), None);
    }

    #[test]
    fn test_score_tie_goes_to_smallest_link() {
        let policy = policy(&[("A", 0.6), ("B", 0.4)]);
        let groups = vec![group("Zurich", &["A"], 1.125), group("Bern", &["A"], 1.125)];
        assert_eq!(policy.select_link_group(&groups), Some((1, SelectionReason::BestAlone)));
    }

    #[test]
    fn test_winning_surface_tie_breaks() {
        let mut g = LinkGroup::new("X");
        g.mention_votes.insert("Obama".to_string(), 2);
        g.mention_votes.insert("Barack Obama".to_string(), 2);
        g.mention_votes.insert("B. Obama".to_string(), 1);
        assert_eq!(winning_surface(&g), Some("Barack Obama"));

        let mut g = LinkGroup::new("X");
        g.mention_votes.insert("bbb".to_string(), 1);
        g.mention_votes.insert("aaa".to_string(), 1);
        assert_eq!(winning_surface(&g), Some("aaa"));
    }

    #[test]
    fn test_order_voters_uses_linker_order() {
        let policy = SelectionPolicy::new(
            ranking(&[("A", 0.6)]),
            MentionSelection::Votes,
            vec!["tagme".to_string(), "spotlight".to_string()],
        )
        .unwrap();

        let ordered = policy.order_voters(["zzz", "spotlight", "aaa", "tagme", "spotlight"]);
        assert_eq!(ordered, vec!["tagme", "spotlight", "aaa", "zzz"]);
    }
}
