//! Silhouette scoring over a precomputed distance matrix. Used by the
//! centroid and agglomerative strategies to auto-select the cluster count.

use ndarray::Array2;
use rayon::prelude::*;
use rustc_hash::FxHashMap;

/// Mean silhouette coefficient for `labels` over the distance matrix.
///
/// Returns `None` when the labeling is degenerate (fewer than two distinct
/// clusters, or fewer samples than clusters allow). Samples alone in their
/// cluster contribute 0, matching the standard convention.
pub fn silhouette_score(distance: &Array2<f64>, labels: &[i64]) -> Option<f64> {
    let n = labels.len();
    if n < 2 {
        return None;
    }

    let mut cluster_sizes: FxHashMap<i64, usize> = FxHashMap::default();
    for &label in labels {
        *cluster_sizes.entry(label).or_insert(0) += 1;
    }
    if cluster_sizes.len() < 2 || cluster_sizes.len() > n - 1 {
        return None;
    }

    let coefficients: Vec<f64> = (0..n)
        .into_par_iter()
        .map(|i| {
            let own = labels[i];
            if cluster_sizes[&own] == 1 {
                return 0.0;
            }

            // Sum of distances from i to each cluster.
            let mut totals: FxHashMap<i64, f64> = FxHashMap::default();
            for j in 0..n {
                if j != i {
                    *totals.entry(labels[j]).or_insert(0.0) += distance[[i, j]];
                }
            }

            let a = totals.get(&own).copied().unwrap_or(0.0) / (cluster_sizes[&own] - 1) as f64;
            let b = cluster_sizes
                .iter()
                .filter(|(&label, _)| label != own)
                .map(|(&label, &size)| totals.get(&label).copied().unwrap_or(0.0) / size as f64)
                .fold(f64::INFINITY, f64::min);

            if !b.is_finite() {
                return 0.0;
            }
            let denom = a.max(b);
            if denom > 0.0 {
                (b - a) / denom
            } else {
                0.0
            }
        })
        .collect();

    // Fixed-order reduction keeps the mean bit-identical across runs.
    Some(coefficients.iter().sum::<f64>() / n as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::arr2;

    #[test]
    fn two_tight_clusters_score_high() {
        // 0,1 close together; 2,3 close together; groups far apart.
        let d = arr2(&[
            [0.0, 0.1, 0.9, 0.9],
            [0.1, 0.0, 0.9, 0.9],
            [0.9, 0.9, 0.0, 0.1],
            [0.9, 0.9, 0.1, 0.0],
        ]);
        let score = silhouette_score(&d, &[0, 0, 1, 1]).unwrap();
        assert!(score > 0.8, "expected high silhouette, got {score}");
    }

    #[test]
    fn single_cluster_is_degenerate() {
        let d = arr2(&[[0.0, 0.5], [0.5, 0.0]]);
        assert_eq!(silhouette_score(&d, &[0, 0]), None);
    }

    #[test]
    fn all_singletons_is_degenerate() {
        let d = arr2(&[[0.0, 0.5], [0.5, 0.0]]);
        assert_eq!(silhouette_score(&d, &[0, 1]), None);
    }

    #[test]
    fn singleton_cluster_contributes_zero() {
        let d = arr2(&[
            [0.0, 0.1, 0.9],
            [0.1, 0.0, 0.9],
            [0.9, 0.9, 0.0],
        ]);
        let score = silhouette_score(&d, &[0, 0, 1]).unwrap();
        // Members of the pair score (0.9 - 0.1) / 0.9 each, singleton scores 0.
        let expected = (2.0 * (0.8 / 0.9)) / 3.0;
        assert_abs_diff_eq!(score, expected, epsilon = 1e-12);
    }
}
