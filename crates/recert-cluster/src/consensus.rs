//! Consensus analysis across clustering strategies.
//!
//! Each strategy proposes a peer set per employee; consensus is measured as
//! the mean pairwise Jaccard similarity between those sets. Strategy pairs
//! are iterated in lexicographic strategy-name order so the floating-point
//! reduction is reproducible.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

use recert_core::config::{ConsensusConfig, StrategyKind};
use recert_core::types::EmployeeId;

use crate::assignment::{ClusterAssignment, StrategyAssignments, OUTLIER_CLUSTER};

/// Per-employee aggregate across the strategies that succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub employee_id: EmployeeId,

    pub assignments: BTreeMap<StrategyKind, ClusterAssignment>,

    /// Mode of the non-outlier cluster votes; -1 when every strategy voted
    /// outlier or none succeeded.
    pub consensus_cluster_id: i64,
    /// Mean pairwise Jaccard of per-strategy peer sets, in [0, 1].
    pub consensus_score: f64,
    pub strategies_agreeing: usize,
    pub total_strategies: usize,

    /// Union of peer sets across strategies; the scorer's denominator.
    /// Deliberately inclusive: false positives are penalized later by the
    /// sensitivity ceiling.
    pub peer_ids: Vec<EmployeeId>,
    /// Intersection of all non-empty peer sets; the strict set for audit.
    pub common_peer_ids: Vec<EmployeeId>,
    pub peer_count: usize,

    pub needs_human_review: bool,
    pub disagreement_reason: Option<String>,
}

pub struct ConsensusAnalyzer {
    config: ConsensusConfig,
}

impl ConsensusAnalyzer {
    pub fn new(config: ConsensusConfig) -> Self {
        Self { config }
    }

    pub fn analyze(
        &self,
        all_assignments: &BTreeMap<StrategyKind, StrategyAssignments>,
        employee_ids: &[EmployeeId],
    ) -> BTreeMap<EmployeeId, ConsensusResult> {
        info!("Analyzing clustering consensus...");

        // strategy -> cluster id -> members, for peer-set lookups.
        let mut members: BTreeMap<StrategyKind, BTreeMap<i64, Vec<&str>>> = BTreeMap::new();
        for (&strategy, assignments) in all_assignments {
            let by_cluster = members.entry(strategy).or_default();
            for assignment in assignments.values() {
                if !assignment.is_outlier {
                    by_cluster
                        .entry(assignment.cluster_id)
                        .or_default()
                        .push(assignment.employee_id.as_str());
                }
            }
        }

        let mut results = BTreeMap::new();
        for emp_id in employee_ids {
            results.insert(emp_id.clone(), self.analyze_one(emp_id, all_assignments, &members));
        }

        let needs_review = results.values().filter(|r| r.needs_human_review).count();
        info!(
            "Consensus analysis complete: {needs_review}/{} need human review",
            results.len()
        );
        results
    }

    fn analyze_one(
        &self,
        emp_id: &str,
        all_assignments: &BTreeMap<StrategyKind, StrategyAssignments>,
        members: &BTreeMap<StrategyKind, BTreeMap<i64, Vec<&str>>>,
    ) -> ConsensusResult {
        // BTreeMap keeps strategies in lexicographic name order throughout.
        let mut emp_assignments: BTreeMap<StrategyKind, ClusterAssignment> = BTreeMap::new();
        for (&strategy, assignments) in all_assignments {
            if let Some(assignment) = assignments.get(emp_id) {
                emp_assignments.insert(strategy, assignment.clone());
            }
        }

        let total_strategies = emp_assignments.len();
        if total_strategies == 0 {
            return ConsensusResult {
                employee_id: emp_id.to_string(),
                assignments: BTreeMap::new(),
                consensus_cluster_id: OUTLIER_CLUSTER,
                consensus_score: 0.0,
                strategies_agreeing: 0,
                total_strategies: 0,
                peer_ids: Vec::new(),
                common_peer_ids: Vec::new(),
                peer_count: 0,
                needs_human_review: true,
                disagreement_reason: Some("No clustering results available".to_string()),
            };
        }

        // Ordered peer set per strategy; outliers contribute the empty set.
        let peer_sets: Vec<BTreeSet<&str>> = emp_assignments
            .iter()
            .map(|(strategy, assignment)| {
                if assignment.is_outlier {
                    BTreeSet::new()
                } else {
                    members[strategy]
                        .get(&assignment.cluster_id)
                        .map(|m| {
                            m.iter()
                                .copied()
                                .filter(|&other| other != emp_id)
                                .collect()
                        })
                        .unwrap_or_default()
                }
            })
            .collect();

        // Only non-outlier strategies vote on the score: an outlier verdict
        // is surfaced through the dedicated disagreement rule below, not by
        // dragging the Jaccard mean down with its empty set. Two strategies
        // that both leave the employee peerless still agree (Jaccard of two
        // empty sets is 1.0).
        let scoring_sets: Vec<&BTreeSet<&str>> = emp_assignments
            .values()
            .zip(peer_sets.iter())
            .filter(|(assignment, _)| !assignment.is_outlier)
            .map(|(_, set)| set)
            .collect();
        let consensus_score = if scoring_sets.len() >= 2 {
            let mut total = 0.0;
            let mut pairs = 0usize;
            for i in 0..scoring_sets.len() {
                for j in (i + 1)..scoring_sets.len() {
                    total += jaccard(scoring_sets[i], scoring_sets[j]);
                    pairs += 1;
                }
            }
            total / pairs as f64
        } else {
            1.0
        };

        let non_empty: Vec<&BTreeSet<&str>> = peer_sets.iter().filter(|s| !s.is_empty()).collect();
        let union: BTreeSet<&str> = non_empty.iter().flat_map(|s| s.iter().copied()).collect();
        let intersection: BTreeSet<&str> = non_empty
            .first()
            .map(|first| {
                non_empty[1..].iter().fold((**first).clone(), |acc, s| {
                    acc.intersection(s).copied().collect()
                })
            })
            .unwrap_or_default();

        let outlier_votes = emp_assignments.values().filter(|a| a.is_outlier).count();
        let non_outlier_votes = total_strategies - outlier_votes;

        let (needs_review, reason) = if consensus_score < self.config.review_threshold {
            (
                true,
                Some(format!(
                    "Low consensus score ({consensus_score:.2} < {})",
                    self.config.review_threshold
                )),
            )
        } else if outlier_votes > 0 && non_outlier_votes > 0 {
            (
                true,
                Some(format!(
                    "Outlier disagreement ({outlier_votes}/{total_strategies} strategies mark as outlier)"
                )),
            )
        } else if intersection.is_empty() && !union.is_empty() {
            (
                true,
                Some("No common peers across all strategies".to_string()),
            )
        } else {
            (false, None)
        };

        // Mode of non-outlier cluster votes, smallest id on ties.
        let mut vote_counts: BTreeMap<i64, usize> = BTreeMap::new();
        for assignment in emp_assignments.values() {
            if !assignment.is_outlier {
                *vote_counts.entry(assignment.cluster_id).or_insert(0) += 1;
            }
        }
        let (consensus_cluster_id, strategies_agreeing) = vote_counts
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(&id, &count)| (id, count))
            .unwrap_or((OUTLIER_CLUSTER, outlier_votes));

        ConsensusResult {
            employee_id: emp_id.to_string(),
            assignments: emp_assignments,
            consensus_cluster_id,
            consensus_score,
            strategies_agreeing,
            total_strategies,
            peer_ids: union.iter().map(|s| s.to_string()).collect(),
            common_peer_ids: intersection.iter().map(|s| s.to_string()).collect(),
            peer_count: union.len(),
            needs_human_review: needs_review,
            disagreement_reason: reason,
        }
    }
}

/// Jaccard similarity with Jaccard(empty, empty) defined as 1.0.
fn jaccard(a: &BTreeSet<&str>, b: &BTreeSet<&str>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn assignment(
        emp: &str,
        strategy: StrategyKind,
        cluster_id: i64,
        is_outlier: bool,
    ) -> ClusterAssignment {
        ClusterAssignment {
            employee_id: emp.to_string(),
            strategy,
            cluster_id,
            confidence: 0.8,
            is_outlier,
        }
    }

    fn strategy_result(
        strategy: StrategyKind,
        clusters: &[(&str, i64, bool)],
    ) -> StrategyAssignments {
        clusters
            .iter()
            .map(|&(emp, cluster, outlier)| {
                (
                    emp.to_string(),
                    assignment(emp, strategy, cluster, outlier),
                )
            })
            .collect()
    }

    fn ids(names: &[&str]) -> Vec<EmployeeId> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn single_strategy_means_full_consensus() {
        let mut all = BTreeMap::new();
        all.insert(
            StrategyKind::KMeans,
            strategy_result(
                StrategyKind::KMeans,
                &[("a", 0, false), ("b", 0, false), ("c", 1, false)],
            ),
        );
        let analyzer = ConsensusAnalyzer::new(ConsensusConfig::default());
        let results = analyzer.analyze(&all, &ids(&["a", "b", "c"]));

        let a = &results["a"];
        assert_abs_diff_eq!(a.consensus_score, 1.0);
        assert!(!a.needs_human_review);
        assert_eq!(a.peer_ids, vec!["b".to_string()]);
        assert_eq!(a.common_peer_ids, vec!["b".to_string()]);
        assert_eq!(a.consensus_cluster_id, 0);
        assert_eq!(a.total_strategies, 1);
    }

    #[test]
    fn zero_strategies_forces_human_review() {
        let all = BTreeMap::new();
        let analyzer = ConsensusAnalyzer::new(ConsensusConfig::default());
        let results = analyzer.analyze(&all, &ids(&["a"]));

        let a = &results["a"];
        assert!(a.needs_human_review);
        assert_eq!(
            a.disagreement_reason.as_deref(),
            Some("No clustering results available")
        );
        assert_eq!(a.consensus_cluster_id, OUTLIER_CLUSTER);
        assert_eq!(a.consensus_score, 0.0);
    }

    #[test]
    fn outlier_disagreement_is_flagged_with_union_peers() {
        // Two strategies agree on a tight peer set, one calls "a" an outlier.
        let mut all = BTreeMap::new();
        all.insert(
            StrategyKind::KMeans,
            strategy_result(
                StrategyKind::KMeans,
                &[
                    ("a", 0, false),
                    ("b", 0, false),
                    ("c", 0, false),
                    ("d", 0, false),
                    ("e", 0, false),
                    ("f", 1, false),
                ],
            ),
        );
        all.insert(
            StrategyKind::Hierarchical,
            strategy_result(
                StrategyKind::Hierarchical,
                &[
                    ("a", 2, false),
                    ("b", 2, false),
                    ("c", 2, false),
                    ("d", 2, false),
                    ("e", 2, false),
                    ("f", 3, false),
                ],
            ),
        );
        all.insert(
            StrategyKind::Dbscan,
            strategy_result(
                StrategyKind::Dbscan,
                &[
                    ("a", OUTLIER_CLUSTER, true),
                    ("b", 0, false),
                    ("c", 0, false),
                    ("d", 0, false),
                    ("e", 0, false),
                    ("f", 0, false),
                ],
            ),
        );

        let analyzer = ConsensusAnalyzer::new(ConsensusConfig::default());
        let results = analyzer.analyze(&all, &ids(&["a", "b", "c", "d", "e", "f"]));

        let a = &results["a"];
        assert!(a.needs_human_review);
        assert_abs_diff_eq!(a.consensus_score, 1.0);
        let reason = a.disagreement_reason.as_deref().unwrap();
        assert!(
            reason.contains("Outlier disagreement"),
            "unexpected reason: {reason}"
        );
        // Union of the two non-empty peer sets.
        assert_eq!(a.peer_ids, ids(&["b", "c", "d", "e"]));
        assert_eq!(a.consensus_cluster_id, 0);
    }

    #[test]
    fn low_consensus_beats_other_reasons() {
        // Disjoint peer sets: Jaccard 0 between the two strategies.
        let mut all = BTreeMap::new();
        all.insert(
            StrategyKind::KMeans,
            strategy_result(
                StrategyKind::KMeans,
                &[("a", 0, false), ("b", 0, false), ("c", 1, false)],
            ),
        );
        all.insert(
            StrategyKind::Hierarchical,
            strategy_result(
                StrategyKind::Hierarchical,
                &[("a", 0, false), ("b", 1, false), ("c", 0, false)],
            ),
        );

        let analyzer = ConsensusAnalyzer::new(ConsensusConfig::default());
        let results = analyzer.analyze(&all, &ids(&["a", "b", "c"]));
        let a = &results["a"];
        assert_abs_diff_eq!(a.consensus_score, 0.0);
        assert!(a
            .disagreement_reason
            .as_deref()
            .unwrap()
            .starts_with("Low consensus score"));
        // Union still collects everything either strategy proposed.
        assert_eq!(a.peer_ids, ids(&["b", "c"]));
        assert!(a.common_peer_ids.is_empty());
    }

    #[test]
    fn both_outliers_count_as_agreement() {
        // Jaccard(empty, empty) = 1.0: two strategies agreeing the employee
        // is an outlier is consensus, not disagreement.
        let mut all = BTreeMap::new();
        all.insert(
            StrategyKind::Dbscan,
            strategy_result(StrategyKind::Dbscan, &[("a", OUTLIER_CLUSTER, true)]),
        );
        all.insert(
            StrategyKind::KMeans,
            strategy_result(StrategyKind::KMeans, &[("a", OUTLIER_CLUSTER, true)]),
        );

        let analyzer = ConsensusAnalyzer::new(ConsensusConfig::default());
        let results = analyzer.analyze(&all, &ids(&["a"]));
        let a = &results["a"];
        assert_abs_diff_eq!(a.consensus_score, 1.0);
        assert!(!a.needs_human_review);
        assert_eq!(a.consensus_cluster_id, OUTLIER_CLUSTER);
        assert!(a.peer_ids.is_empty());
    }

    #[test]
    fn mode_tie_breaks_to_smallest_cluster_id() {
        let mut all = BTreeMap::new();
        all.insert(
            StrategyKind::KMeans,
            strategy_result(StrategyKind::KMeans, &[("a", 5, false), ("b", 5, false)]),
        );
        all.insert(
            StrategyKind::Hierarchical,
            strategy_result(
                StrategyKind::Hierarchical,
                &[("a", 2, false), ("b", 2, false)],
            ),
        );

        let analyzer = ConsensusAnalyzer::new(ConsensusConfig::default());
        let results = analyzer.analyze(&all, &ids(&["a", "b"]));
        assert_eq!(results["a"].consensus_cluster_id, 2);
    }
}
