//! Runs the enabled clustering strategies against one proximity matrix.
//!
//! Strategies are pure with respect to (matrix, parameters, seed) and run
//! concurrently on the shared read-only matrix. A failing strategy is logged
//! and dropped from the run; it never aborts the pipeline.

use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{info, warn};

use recert_core::config::{ClusteringConfig, StrategyKind};

use crate::assignment::StrategyAssignments;
use crate::community::cluster_graph_community;
use crate::dbscan::cluster_dbscan;
use crate::error::ClusterResult;
use crate::hierarchical::cluster_hierarchical;
use crate::kmeans::cluster_kmeans;
use recert_proximity::ProximityMatrix;

pub struct MultiStrategyClusterer {
    config: ClusteringConfig,
    seed: u64,
}

impl MultiStrategyClusterer {
    pub fn new(config: ClusteringConfig, seed: u64) -> Self {
        Self { config, seed }
    }

    /// Run `strategies` (deduplicated, canonical order) and collect the
    /// survivors. Failures are logged at warning level and omitted.
    pub fn run(
        &self,
        matrix: &ProximityMatrix,
        strategies: &[StrategyKind],
    ) -> BTreeMap<StrategyKind, StrategyAssignments> {
        if matrix.is_empty() {
            return BTreeMap::new();
        }

        let mut selected: Vec<StrategyKind> = strategies.to_vec();
        selected.sort_unstable();
        selected.dedup();

        let outcomes: Vec<(StrategyKind, ClusterResult<StrategyAssignments>)> = selected
            .par_iter()
            .map(|&strategy| {
                info!("Running {strategy} clustering...");
                (strategy, self.run_one(matrix, strategy))
            })
            .collect();

        let mut results = BTreeMap::new();
        for (strategy, outcome) in outcomes {
            match outcome {
                Ok(assignments) => {
                    results.insert(strategy, assignments);
                }
                Err(err) => {
                    warn!("Strategy {strategy} failed: {err}");
                }
            }
        }
        results
    }

    fn run_one(
        &self,
        matrix: &ProximityMatrix,
        strategy: StrategyKind,
    ) -> ClusterResult<StrategyAssignments> {
        match strategy {
            StrategyKind::KMeans => cluster_kmeans(matrix, &self.config, self.seed),
            StrategyKind::Hierarchical => cluster_hierarchical(matrix, &self.config),
            StrategyKind::Dbscan => cluster_dbscan(matrix, &self.config),
            StrategyKind::GraphCommunity => {
                cluster_graph_community(matrix, &self.config, self.seed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grouped_matrix() -> ProximityMatrix {
        let ids: Vec<String> = (0..8).map(|i| format!("e{i}")).collect();
        let mut m = ProximityMatrix::new(ids);
        for i in 0..8 {
            for j in (i + 1)..8 {
                let same = (i < 4) == (j < 4);
                m.set_symmetric(i, j, if same { 0.85 } else { 0.05 });
            }
        }
        m
    }

    #[test]
    fn runs_all_requested_strategies() {
        let config = ClusteringConfig {
            min_cluster_size: 2,
            dbscan_min_samples: 2,
            ..ClusteringConfig::default()
        };
        let clusterer = MultiStrategyClusterer::new(config, 42);
        let results = clusterer.run(&grouped_matrix(), &StrategyKind::ALL);

        assert_eq!(results.len(), 4);
        for assignments in results.values() {
            assert_eq!(assignments.len(), 8);
        }
    }

    #[test]
    fn failed_strategy_is_omitted_not_fatal() {
        // A single employee is degenerate for kmeans/hierarchical but fine
        // for dbscan and graph community.
        let m = ProximityMatrix::new(vec!["only".into()]);
        let clusterer = MultiStrategyClusterer::new(ClusteringConfig::default(), 42);
        let results = clusterer.run(&m, &StrategyKind::ALL);

        assert!(!results.contains_key(&StrategyKind::KMeans));
        assert!(!results.contains_key(&StrategyKind::Hierarchical));
        assert!(results.contains_key(&StrategyKind::Dbscan));
        assert!(results.contains_key(&StrategyKind::GraphCommunity));
    }

    #[test]
    fn empty_matrix_yields_no_results() {
        let m = ProximityMatrix::new(Vec::new());
        let clusterer = MultiStrategyClusterer::new(ClusteringConfig::default(), 42);
        assert!(clusterer.run(&m, &StrategyKind::ALL).is_empty());
    }

    #[test]
    fn duplicate_strategy_requests_are_deduplicated() {
        let config = ClusteringConfig {
            dbscan_min_samples: 2,
            ..ClusteringConfig::default()
        };
        let clusterer = MultiStrategyClusterer::new(config, 42);
        let results = clusterer.run(
            &grouped_matrix(),
            &[StrategyKind::Dbscan, StrategyKind::Dbscan],
        );
        assert_eq!(results.len(), 1);
    }
}
