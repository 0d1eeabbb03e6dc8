//! Centroid strategy: k-means over the rows of the precomputed distance
//! matrix, with silhouette-driven auto-selection of k.
//!
//! Each employee's row of distances is treated as its feature vector, so
//! employees with similar distance profiles land together. Restarts and the
//! k-means++ init draw from a seeded RNG; the fit is fully deterministic.

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::{debug, info};

use recert_core::config::{ClusteringConfig, StrategyKind};

use crate::assignment::{relabel_by_first_appearance, ClusterAssignment, StrategyAssignments};
use crate::error::{ClusterError, ClusterResult};
use crate::silhouette::silhouette_score;
use recert_proximity::ProximityMatrix;

const N_INIT: usize = 10;
const MAX_ITER: usize = 100;

pub fn cluster_kmeans(
    matrix: &ProximityMatrix,
    config: &ClusteringConfig,
    seed: u64,
) -> ClusterResult<StrategyAssignments> {
    let n = matrix.len();
    if n < 2 {
        return Err(ClusterError::Degenerate(format!(
            "kmeans needs at least 2 employees, got {n}"
        )));
    }

    let distance = matrix.distance_matrix();
    let max_k = auto_k_ceiling(n, config);

    let mut best_k = 2;
    let mut best_score = f64::NEG_INFINITY;
    for k in 2..=max_k {
        let fit = fit_kmeans(&distance, k, seed);
        let labels = relabel_by_first_appearance(&fit.labels);
        if let Some(score) = silhouette_score(&distance, &labels) {
            if score > best_score {
                best_score = score;
                best_k = k;
            }
        }
    }
    if best_score.is_finite() {
        info!(
            "K-means auto-selected k={best_k} (silhouette={:.3})",
            best_score
        );
    } else {
        debug!("K-means silhouette sweep found no valid k, falling back to k=2");
    }

    let fit = fit_kmeans(&distance, best_k, seed);
    let labels = relabel_by_first_appearance(&fit.labels);

    let mut assignments = StrategyAssignments::new();
    for (i, id) in matrix.ids().iter().enumerate() {
        let own = fit.labels[i];
        let col_max = (0..n)
            .map(|j| fit.centroid_distances[[j, own]])
            .fold(0.0f64, f64::max);
        let confidence = if col_max > 0.0 {
            1.0 - fit.centroid_distances[[i, own]] / col_max
        } else {
            1.0
        };
        assignments.insert(
            id.clone(),
            ClusterAssignment {
                employee_id: id.clone(),
                strategy: StrategyKind::KMeans,
                cluster_id: labels[i],
                confidence,
                is_outlier: false,
            },
        );
    }
    Ok(assignments)
}

/// Upper bound of the auto-k sweep shared with the agglomerative strategy.
pub(crate) fn auto_k_ceiling(n: usize, config: &ClusteringConfig) -> usize {
    (config.max_clusters)
        .min(n / config.min_cluster_size)
        .max(2)
        .min(n)
}

struct KMeansFit {
    labels: Vec<usize>,
    /// n x k Euclidean distances from each point to each centroid.
    centroid_distances: Array2<f64>,
}

fn fit_kmeans(points: &Array2<f64>, k: usize, seed: u64) -> KMeansFit {
    let mut best: Option<(f64, Vec<usize>, Vec<Vec<f64>>)> = None;

    for restart in 0..N_INIT {
        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(restart as u64));
        let (labels, centroids, inertia) = lloyd(points, k, &mut rng);
        if best.as_ref().map_or(true, |(best_inertia, _, _)| inertia < *best_inertia) {
            best = Some((inertia, labels, centroids));
        }
    }

    let (_, labels, centroids) = best.expect("at least one k-means restart runs");
    let n = points.nrows();
    let mut centroid_distances = Array2::zeros((n, centroids.len()));
    for i in 0..n {
        let row = points.row(i);
        for (c, centroid) in centroids.iter().enumerate() {
            centroid_distances[[i, c]] = euclidean_sq(row.as_slice().unwrap(), centroid).sqrt();
        }
    }

    KMeansFit {
        labels,
        centroid_distances,
    }
}

fn lloyd(points: &Array2<f64>, k: usize, rng: &mut StdRng) -> (Vec<usize>, Vec<Vec<f64>>, f64) {
    let n = points.nrows();
    let dim = points.ncols();
    let mut centroids = plus_plus_init(points, k, rng);
    let mut labels = vec![0usize; n];

    for _ in 0..MAX_ITER {
        let new_labels: Vec<usize> = (0..n)
            .into_par_iter()
            .map(|i| {
                let row = points.row(i);
                let row = row.as_slice().unwrap();
                let mut best_c = 0;
                let mut best_d = f64::INFINITY;
                for (c, centroid) in centroids.iter().enumerate() {
                    let d = euclidean_sq(row, centroid);
                    if d < best_d {
                        best_d = d;
                        best_c = c;
                    }
                }
                best_c
            })
            .collect();

        let converged = new_labels == labels;
        labels = new_labels;
        if converged {
            break;
        }

        let mut sums = vec![vec![0.0f64; dim]; k];
        let mut counts = vec![0usize; k];
        for (i, &label) in labels.iter().enumerate() {
            counts[label] += 1;
            let row = points.row(i);
            for (d, &v) in row.as_slice().unwrap().iter().enumerate() {
                sums[label][d] += v;
            }
        }
        for c in 0..k {
            if counts[c] > 0 {
                for v in sums[c].iter_mut() {
                    *v /= counts[c] as f64;
                }
                centroids[c] = std::mem::take(&mut sums[c]);
            } else {
                // Re-seed an emptied centroid from the point farthest from
                // its current assignment.
                let farthest = (0..n)
                    .max_by(|&a, &b| {
                        let da = euclidean_sq(points.row(a).as_slice().unwrap(), &centroids[labels[a]]);
                        let db = euclidean_sq(points.row(b).as_slice().unwrap(), &centroids[labels[b]]);
                        da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .unwrap_or(0);
                centroids[c] = points.row(farthest).to_vec();
            }
        }
    }

    let inertia: f64 = labels
        .iter()
        .enumerate()
        .map(|(i, &label)| euclidean_sq(points.row(i).as_slice().unwrap(), &centroids[label]))
        .sum();

    (labels, centroids, inertia)
}

/// k-means++ seeding: subsequent centers are drawn with probability
/// proportional to the squared distance from the nearest chosen center.
fn plus_plus_init(points: &Array2<f64>, k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let n = points.nrows();
    let first = rng.random_range(0..n);
    let mut centroids: Vec<Vec<f64>> = vec![points.row(first).to_vec()];
    let mut min_sq: Vec<f64> = (0..n)
        .map(|i| euclidean_sq(points.row(i).as_slice().unwrap(), &centroids[0]))
        .collect();

    while centroids.len() < k {
        let total: f64 = min_sq.iter().sum();
        let next = if total > 0.0 {
            let mut target = rng.random::<f64>() * total;
            let mut chosen = n - 1;
            for (i, &w) in min_sq.iter().enumerate() {
                target -= w;
                if target <= 0.0 {
                    chosen = i;
                    break;
                }
            }
            chosen
        } else {
            rng.random_range(0..n)
        };
        centroids.push(points.row(next).to_vec());
        for i in 0..n {
            let d = euclidean_sq(points.row(i).as_slice().unwrap(), centroids.last().unwrap());
            if d < min_sq[i] {
                min_sq[i] = d;
            }
        }
    }
    centroids
}

fn euclidean_sq(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
