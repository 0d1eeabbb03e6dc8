//! Density strategy: DBSCAN over the precomputed distance matrix.
//!
//! The only strategy that produces genuine outliers: noise points get
//! cluster id -1 and zero confidence. Cluster ids are assigned in seed-point
//! discovery order, which is the canonical employee order, so the labeling
//! is deterministic without any RNG.

use std::collections::VecDeque;
use tracing::info;

use recert_core::config::{ClusteringConfig, StrategyKind};

use crate::assignment::{ClusterAssignment, StrategyAssignments, OUTLIER_CLUSTER};
use crate::error::{ClusterError, ClusterResult};
use recert_proximity::ProximityMatrix;

const UNVISITED: i64 = -2;

pub fn cluster_dbscan(
    matrix: &ProximityMatrix,
    config: &ClusteringConfig,
) -> ClusterResult<StrategyAssignments> {
    let n = matrix.len();
    if n == 0 {
        return Err(ClusterError::Degenerate("no employees to cluster".into()));
    }

    let distance = matrix.distance_matrix();
    let eps = config.dbscan_eps;
    let min_samples = config.dbscan_min_samples;

    // Neighborhoods include the point itself, matching the usual
    // core-point definition |N_eps(p)| >= min_samples.
    let neighborhoods: Vec<Vec<usize>> = (0..n)
        .map(|i| (0..n).filter(|&j| distance[[i, j]] <= eps).collect())
        .collect();

    let mut labels: Vec<i64> = vec![UNVISITED; n];
    let mut next_cluster = 0i64;

    for i in 0..n {
        if labels[i] != UNVISITED {
            continue;
        }
        if neighborhoods[i].len() < min_samples {
            labels[i] = OUTLIER_CLUSTER;
            continue;
        }

        let cluster = next_cluster;
        next_cluster += 1;
        labels[i] = cluster;

        let mut queue: VecDeque<usize> = neighborhoods[i]
            .iter()
            .copied()
            .filter(|&j| j != i)
            .collect();
        while let Some(j) = queue.pop_front() {
            if labels[j] == OUTLIER_CLUSTER {
                // Border point previously marked noise joins the cluster.
                labels[j] = cluster;
            }
            if labels[j] != UNVISITED {
                continue;
            }
            labels[j] = cluster;
            if neighborhoods[j].len() >= min_samples {
                queue.extend(neighborhoods[j].iter().copied().filter(|&q| q != j));
            }
        }
    }

    let n_outliers = labels.iter().filter(|&&l| l == OUTLIER_CLUSTER).count();
    info!(
        "DBSCAN found {} clusters, {} outliers",
        next_cluster, n_outliers
    );

    let mut assignments = StrategyAssignments::new();
    for (i, id) in matrix.ids().iter().enumerate() {
        let cluster_id = labels[i];
        let is_outlier = cluster_id == OUTLIER_CLUSTER;
        let confidence = if is_outlier {
            0.0
        } else {
            let members: Vec<usize> = (0..n)
                .filter(|&j| j != i && labels[j] == cluster_id)
                .collect();
            if members.is_empty() {
                1.0
            } else {
                members.iter().map(|&j| matrix.get(i, j)).sum::<f64>() / members.len() as f64
            }
        };
        assignments.insert(
            id.clone(),
            ClusterAssignment {
                employee_id: id.clone(),
                strategy: StrategyKind::Dbscan,
                cluster_id,
                confidence,
                is_outlier,
            },
        );
    }
    Ok(assignments)
}
