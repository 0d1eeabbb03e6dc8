//! Agglomerative strategy: average-linkage hierarchical clustering over the
//! precomputed distance matrix, cut at a silhouette-selected k.
//!
//! Average linkage is inherent here: ward linkage requires raw coordinates
//! and cannot consume a distance matrix. The merge tree is built once with
//! the nearest-neighbor-chain algorithm and cut at every candidate k.

use tracing::{debug, info};

use recert_core::config::{ClusteringConfig, StrategyKind};

use crate::assignment::{relabel_by_first_appearance, ClusterAssignment, StrategyAssignments};
use crate::error::{ClusterError, ClusterResult};
use crate::kmeans::auto_k_ceiling;
use crate::silhouette::silhouette_score;
use recert_proximity::ProximityMatrix;

/// One dendrogram merge, recorded as representative original points of the
/// two clusters being joined.
#[derive(Debug, Clone, Copy)]
struct Merge {
    rep_a: usize,
    rep_b: usize,
    distance: f64,
}

pub fn cluster_hierarchical(
    matrix: &ProximityMatrix,
    config: &ClusteringConfig,
) -> ClusterResult<StrategyAssignments> {
    let n = matrix.len();
    if n < 2 {
        return Err(ClusterError::Degenerate(format!(
            "hierarchical clustering needs at least 2 employees, got {n}"
        )));
    }

    let distance = matrix.distance_matrix();
    let merges = average_linkage_merges(&distance);
    let max_k = auto_k_ceiling(n, config);

    let mut best_k = 2;
    let mut best_score = f64::NEG_INFINITY;
    for k in 2..=max_k {
        let labels = cut_to_k(&merges, n, k);
        if let Some(score) = silhouette_score(&distance, &labels) {
            if score > best_score {
                best_score = score;
                best_k = k;
            }
        }
    }
    if best_score.is_finite() {
        info!(
            "Hierarchical auto-selected k={best_k} (silhouette={:.3})",
            best_score
        );
    } else {
        debug!("Hierarchical silhouette sweep found no valid k, falling back to k=2");
    }

    let labels = cut_to_k(&merges, n, best_k);

    let mut assignments = StrategyAssignments::new();
    for (i, id) in matrix.ids().iter().enumerate() {
        let members: Vec<usize> = (0..n)
            .filter(|&j| j != i && labels[j] == labels[i])
            .collect();
        let confidence = if members.is_empty() {
            1.0
        } else {
            members.iter().map(|&j| matrix.get(i, j)).sum::<f64>() / members.len() as f64
        };
        assignments.insert(
            id.clone(),
            ClusterAssignment {
                employee_id: id.clone(),
                strategy: StrategyKind::Hierarchical,
                cluster_id: labels[i],
                confidence,
                is_outlier: false,
            },
        );
    }
    Ok(assignments)
}

/// Build the full merge sequence with the nearest-neighbor-chain algorithm
/// and Lance-Williams average-linkage updates. O(n^2) time, O(n^2) space on
/// a working copy of the distance matrix.
fn average_linkage_merges(distance: &ndarray::Array2<f64>) -> Vec<Merge> {
    let n = distance.nrows();
    let mut work = distance.clone();
    let mut active: Vec<bool> = vec![true; n];
    let mut size: Vec<usize> = vec![1; n];
    let mut merges: Vec<Merge> = Vec::with_capacity(n.saturating_sub(1));
    let mut chain: Vec<usize> = Vec::with_capacity(n);

    while merges.len() + 1 < n {
        if chain.is_empty() {
            let start = (0..n).find(|&i| active[i]).expect("an active cluster remains");
            chain.push(start);
        }

        loop {
            let top = *chain.last().expect("chain is non-empty");

            // Nearest active neighbor; ties prefer the chain predecessor
            // (guarantees termination), then the smallest index.
            let prev = chain.len().checked_sub(2).map(|p| chain[p]);
            let mut nearest = prev;
            let mut nearest_d = prev.map(|p| work[[top, p]]).unwrap_or(f64::INFINITY);
            for s in 0..n {
                if s != top && active[s] && Some(s) != prev && work[[top, s]] < nearest_d {
                    nearest_d = work[[top, s]];
                    nearest = Some(s);
                }
            }
            let nearest = nearest.expect("at least two active clusters");

            if Some(nearest) == prev {
                chain.pop();
                chain.pop();
                let (keep, drop) = (top.min(nearest), top.max(nearest));
                merges.push(Merge {
                    rep_a: keep,
                    rep_b: drop,
                    distance: nearest_d,
                });

                let (sk, sd) = (size[keep] as f64, size[drop] as f64);
                for s in 0..n {
                    if s != keep && s != drop && active[s] {
                        let merged = (sk * work[[keep, s]] + sd * work[[drop, s]]) / (sk + sd);
                        work[[keep, s]] = merged;
                        work[[s, keep]] = merged;
                    }
                }
                size[keep] += size[drop];
                active[drop] = false;
                break;
            }
            chain.push(nearest);
        }
    }
    merges
}

/// Cut the dendrogram at k clusters: apply the n-k cheapest merges (stable
/// on build order for equal distances) through a union-find, then relabel
/// roots in first-appearance order.
fn cut_to_k(merges: &[Merge], n: usize, k: usize) -> Vec<i64> {
    let mut order: Vec<usize> = (0..merges.len()).collect();
    order.sort_by(|&a, &b| {
        merges[a]
            .distance
            .partial_cmp(&merges[b].distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });

    let mut parent: Vec<usize> = (0..n).collect();
    fn find(parent: &mut Vec<usize>, mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }

    let applied = n.saturating_sub(k).min(merges.len());
    for &m in order.iter().take(applied) {
        let ra = find(&mut parent, merges[m].rep_a);
        let rb = find(&mut parent, merges[m].rep_b);
        if ra != rb {
            let (lo, hi) = (ra.min(rb), ra.max(rb));
            parent[hi] = lo;
        }
    }

    let roots: Vec<usize> = (0..n).map(|i| find(&mut parent, i)).collect();
    relabel_by_first_appearance(&roots)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grouped_matrix(groups: &[&[usize]], n: usize, near: f64, far: f64) -> ProximityMatrix {
        let ids: Vec<String> = (0..n).map(|i| format!("e{i}")).collect();
        let mut m = ProximityMatrix::new(ids);
        for i in 0..n {
            for j in (i + 1)..n {
                let same = groups.iter().any(|g| g.contains(&i) && g.contains(&j));
                m.set_symmetric(i, j, if same { near } else { far });
            }
        }
        m
    }

    #[test]
    fn recovers_two_groups() {
        let m = grouped_matrix(&[&[0, 1, 2], &[3, 4, 5]], 6, 0.9, 0.1);
        let config = ClusteringConfig {
            min_cluster_size: 2,
            ..ClusteringConfig::default()
        };
        let assignments = cluster_hierarchical(&m, &config).unwrap();

        let c0 = assignments["e0"].cluster_id;
        assert_eq!(assignments["e1"].cluster_id, c0);
        assert_eq!(assignments["e2"].cluster_id, c0);
        let c1 = assignments["e3"].cluster_id;
        assert_ne!(c0, c1);
        assert_eq!(assignments["e5"].cluster_id, c1);
    }

    #[test]
    fn confidence_is_mean_proximity_to_co_members() {
        let m = grouped_matrix(&[&[0, 1, 2], &[3, 4, 5]], 6, 0.8, 0.1);
        let config = ClusteringConfig {
            min_cluster_size: 2,
            ..ClusteringConfig::default()
        };
        let assignments = cluster_hierarchical(&m, &config).unwrap();
        approx::assert_abs_diff_eq!(assignments["e0"].confidence, 0.8, epsilon = 1e-12);
    }

    #[test]
    fn cut_to_k_respects_merge_distances() {
        // 0-1 merge at 0.1, 2 joins at 0.5.
        let merges = vec![
            Merge {
                rep_a: 0,
                rep_b: 1,
                distance: 0.1,
            },
            Merge {
                rep_a: 0,
                rep_b: 2,
                distance: 0.5,
            },
        ];
        assert_eq!(cut_to_k(&merges, 3, 2), vec![0, 0, 1]);
        assert_eq!(cut_to_k(&merges, 3, 1), vec![0, 0, 0]);
        assert_eq!(cut_to_k(&merges, 3, 3), vec![0, 1, 2]);
    }

    #[test]
    fn single_employee_is_degenerate() {
        let m = ProximityMatrix::new(vec!["a".into()]);
        assert!(cluster_hierarchical(&m, &ClusteringConfig::default()).is_err());
    }
}
