//! Pairwise peer-proximity calculation.
//!
//! Proximity between two employees is a weighted blend of four bounded
//! sub-scores (structural, functional, behavioral, temporal), each a sum of
//! indicator or continuous terms clipped to 1.0. Missing fields contribute
//! zero to their term; no term is ever negative and no entry leaves [0, 1].

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

use recert_core::config::ProximityWeights;
use recert_core::types::EmployeeId;

use crate::features::EmployeeFeatures;
use crate::matrix::ProximityMatrix;

/// Gaussian width for tenure similarity, in days.
const TENURE_SIGMA_DAYS: f64 = 365.0;
/// Gaussian width for time-in-role similarity, in days.
const ROLE_SIGMA_DAYS: f64 = 180.0;
/// Job levels span 1..7; level distance is normalized by this.
const MAX_LEVEL_SPAN: f64 = 7.0;

pub type ManagerChains = FxHashMap<EmployeeId, Vec<EmployeeId>>;

/// Per-dimension sub-scores for one pair, before weighting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProximityComponents {
    pub structural: f64,
    pub functional: f64,
    pub behavioral: f64,
    pub temporal: f64,
}

/// A `find_peers` hit: peer id, overall proximity, per-dimension breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerMatch {
    pub employee_id: EmployeeId,
    pub proximity: f64,
    pub components: ProximityComponents,
}

pub struct ProximityCalculator {
    weights: ProximityWeights,
}

impl ProximityCalculator {
    /// Weights are silently renormalized to sum to 1.0 (logged once).
    pub fn new(weights: ProximityWeights) -> Self {
        let weights = if weights.is_normalized() {
            weights
        } else {
            warn!(
                "Proximity weights sum to {:.4}, renormalizing to 1.0",
                weights.sum()
            );
            weights.normalized()
        };
        Self { weights }
    }

    pub fn weights(&self) -> &ProximityWeights {
        &self.weights
    }

    /// Structural proximity: organizational placement.
    ///
    /// Same direct manager 0.30; manager-chain distance 0.20 / (1 + hops);
    /// same team 0.20; same sub-LOB 0.15; same LOB 0.10; same location 0.05.
    pub fn structural_proximity(
        &self,
        a: &EmployeeFeatures,
        b: &EmployeeFeatures,
        chains: Option<&ManagerChains>,
    ) -> f64 {
        let mut score = 0.0;

        if let (Some(ma), Some(mb)) = (a.manager_id.as_deref(), b.manager_id.as_deref()) {
            if ma == mb {
                score += 0.30;
            }
        }

        if let Some(chains) = chains {
            if let Some(hops) = common_ancestor_hops(chains, &a.employee_id, &b.employee_id) {
                score += 0.20 / (1.0 + hops as f64);
            }
        }

        if let (Some(ta), Some(tb)) = (a.team_id.as_deref(), b.team_id.as_deref()) {
            if ta == tb {
                score += 0.20;
            }
        }
        if let (Some(sa), Some(sb)) = (a.sub_lob_id.as_deref(), b.sub_lob_id.as_deref()) {
            if sa == sb {
                score += 0.15;
            }
        }
        if let (Some(la), Some(lb)) = (a.lob_id.as_deref(), b.lob_id.as_deref()) {
            if la == lb {
                score += 0.10;
            }
        }
        if let (Some(la), Some(lb)) = (a.location_id.as_deref(), b.location_id.as_deref()) {
            if la == lb {
                score += 0.05;
            }
        }

        score.min(1.0)
    }

    /// Functional proximity: job attributes.
    ///
    /// Same job code 0.35; same job family 0.25; level distance
    /// 0.20 * (1 - |dA - dB| / 7) when both known; same cost center 0.20.
    pub fn functional_proximity(&self, a: &EmployeeFeatures, b: &EmployeeFeatures) -> f64 {
        let mut score = 0.0;

        if !a.job_code.is_empty() && a.job_code == b.job_code {
            score += 0.35;
        }
        if !a.job_family.is_empty() && a.job_family == b.job_family {
            score += 0.25;
        }
        if a.job_level > 0 && b.job_level > 0 {
            let diff = (a.job_level - b.job_level).abs() as f64;
            score += 0.20 * (1.0 - diff / MAX_LEVEL_SPAN).max(0.0);
        }
        if let (Some(ca), Some(cb)) = (a.cost_center_id.as_deref(), b.cost_center_id.as_deref()) {
            if ca == cb {
                score += 0.20;
            }
        }

        score.min(1.0)
    }

    /// Behavioral proximity: access overlap (Jaccard) and usage-intensity
    /// shape (cosine), half weight each.
    pub fn behavioral_proximity(&self, a: &EmployeeFeatures, b: &EmployeeFeatures) -> f64 {
        let mut score = 0.0;

        if !a.access_set.is_empty() || !b.access_set.is_empty() {
            let intersection = a.access_set.intersection(&b.access_set).count();
            let union = a.access_set.union(&b.access_set).count();
            if union > 0 {
                score += 0.5 * intersection as f64 / union as f64;
            }
        }

        if !a.activity_vector.is_empty() && !b.activity_vector.is_empty() {
            if let Some(cosine) = intensity_cosine(&a.activity_vector, &b.activity_vector) {
                score += 0.5 * cosine;
            }
        }

        score.min(1.0)
    }

    /// Temporal proximity: career stage.
    ///
    /// Gaussian tenure similarity 0.4 (sigma one year), Gaussian
    /// time-in-role similarity 0.3 (sigma six months), same hire quarter 0.3.
    pub fn temporal_proximity(&self, a: &EmployeeFeatures, b: &EmployeeFeatures) -> f64 {
        let mut score = 0.0;

        if a.tenure_days > 0 && b.tenure_days > 0 {
            let diff = (a.tenure_days - b.tenure_days) as f64;
            score += 0.4 * (-(diff * diff) / (2.0 * TENURE_SIGMA_DAYS * TENURE_SIGMA_DAYS)).exp();
        }
        if a.time_in_role_days > 0 && b.time_in_role_days > 0 {
            let diff = (a.time_in_role_days - b.time_in_role_days) as f64;
            score += 0.3 * (-(diff * diff) / (2.0 * ROLE_SIGMA_DAYS * ROLE_SIGMA_DAYS)).exp();
        }
        if !a.hire_quarter.is_empty() && a.hire_quarter == b.hire_quarter {
            score += 0.3;
        }

        score.min(1.0)
    }

    /// Overall weighted proximity plus the per-dimension breakdown.
    pub fn proximity(
        &self,
        a: &EmployeeFeatures,
        b: &EmployeeFeatures,
        chains: Option<&ManagerChains>,
    ) -> (f64, ProximityComponents) {
        let components = ProximityComponents {
            structural: self.structural_proximity(a, b, chains),
            functional: self.functional_proximity(a, b),
            behavioral: self.behavioral_proximity(a, b),
            temporal: self.temporal_proximity(a, b),
        };
        let overall = self.weights.structural * components.structural
            + self.weights.functional * components.functional
            + self.weights.behavioral * components.behavioral
            + self.weights.temporal * components.temporal;
        (overall, components)
    }

    /// Compute the full symmetric pairwise matrix for `ids` (which fixes the
    /// row order). With `block_by_lob` only same-LOB pairs are computed and
    /// all other off-diagonal entries stay 0; employees without a resolved
    /// LOB form their own block. The diagonal is always 1.
    pub fn pairwise_matrix(
        &self,
        ids: &[EmployeeId],
        features: &BTreeMap<EmployeeId, EmployeeFeatures>,
        chains: Option<&ManagerChains>,
        block_by_lob: bool,
    ) -> ProximityMatrix {
        let n = ids.len();
        info!(
            "Calculating {n}x{n} proximity matrix (block_by_lob={})",
            block_by_lob
        );

        let feature_rows: Vec<Option<&EmployeeFeatures>> =
            ids.iter().map(|id| features.get(id)).collect();
        let blocks: Vec<&str> = feature_rows
            .iter()
            .map(|f| {
                f.and_then(|f| f.lob_id.as_deref())
                    .unwrap_or("__unassigned__")
            })
            .collect();

        let rows: Vec<Vec<(usize, f64)>> = (0..n)
            .into_par_iter()
            .map(|i| {
                let Some(fa) = feature_rows[i] else {
                    return Vec::new();
                };
                let mut row = Vec::new();
                for j in (i + 1)..n {
                    if block_by_lob && blocks[i] != blocks[j] {
                        continue;
                    }
                    let Some(fb) = feature_rows[j] else {
                        continue;
                    };
                    let (value, _) = self.proximity(fa, fb, chains);
                    if value > 0.0 {
                        row.push((j, value));
                    }
                }
                row
            })
            .collect();

        let mut matrix = ProximityMatrix::new(ids.to_vec());
        let mut comparisons = 0usize;
        for (i, row) in rows.into_iter().enumerate() {
            for (j, value) in row {
                matrix.set_symmetric(i, j, value);
                comparisons += 1;
            }
        }

        info!("Completed {comparisons} pairwise comparisons");
        matrix
    }

    /// Convenience top-k peer query by direct pairwise proximity. This
    /// bypasses clustering entirely and is not consulted by the scorer.
    pub fn find_peers(
        &self,
        employee_id: &str,
        features: &BTreeMap<EmployeeId, EmployeeFeatures>,
        top_k: usize,
        min_proximity: f64,
        chains: Option<&ManagerChains>,
    ) -> Vec<PeerMatch> {
        let Some(target) = features.get(employee_id) else {
            return Vec::new();
        };

        let mut peers: Vec<PeerMatch> = features
            .iter()
            .filter(|(id, _)| id.as_str() != employee_id)
            .filter_map(|(id, other)| {
                let (proximity, components) = self.proximity(target, other, chains);
                (proximity >= min_proximity).then(|| PeerMatch {
                    employee_id: id.clone(),
                    proximity,
                    components,
                })
            })
            .collect();

        peers.sort_by(|a, b| {
            b.proximity
                .partial_cmp(&a.proximity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.employee_id.cmp(&b.employee_id))
        });
        peers.truncate(top_k);
        peers
    }
}

/// Minimum combined hop count to a common manager-chain ancestor, if any.
fn common_ancestor_hops(chains: &ManagerChains, a: &str, b: &str) -> Option<usize> {
    let chain_a = chains.get(a)?;
    let chain_b = chains.get(b)?;
    let positions_b: FxHashMap<&str, usize> = chain_b
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();

    chain_a
        .iter()
        .enumerate()
        .filter_map(|(i, ancestor)| positions_b.get(ancestor.as_str()).map(|&j| i + j))
        .min()
}

/// Cosine similarity of two sparse intensity vectors over the union of their
/// keys. `None` when either has zero L2 norm.
fn intensity_cosine(a: &BTreeMap<String, f64>, b: &BTreeMap<String, f64>) -> Option<f64> {
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;

    for (key, &va) in a {
        norm_a += va * va;
        if let Some(&vb) = b.get(key) {
            dot += va * vb;
        }
    }
    for &vb in b.values() {
        norm_b += vb * vb;
    }

    if norm_a > 0.0 && norm_b > 0.0 {
        Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::collections::BTreeSet;

    fn bare_features(id: &str) -> EmployeeFeatures {
        EmployeeFeatures {
            employee_id: id.into(),
            manager_id: None,
            team_id: None,
            sub_lob_id: None,
            lob_id: None,
            location_id: None,
            job_title: String::new(),
            job_code: String::new(),
            job_family: String::new(),
            job_level: 0,
            cost_center_id: None,
            access_set: BTreeSet::new(),
            activity_vector: BTreeMap::new(),
            tenure_days: 0,
            time_in_role_days: 0,
            hire_quarter: String::new(),
        }
    }

    fn full_features(id: &str) -> EmployeeFeatures {
        let mut f = bare_features(id);
        f.manager_id = Some("mgr".into());
        f.team_id = Some("team".into());
        f.sub_lob_id = Some("sub".into());
        f.lob_id = Some("lob".into());
        f.location_id = Some("loc".into());
        f.job_code = "SWE2".into();
        f.job_family = "Engineering".into();
        f.job_level = 3;
        f.cost_center_id = Some("cc".into());
        f.access_set = BTreeSet::from(["r1".to_string()]);
        f.activity_vector = BTreeMap::from([("r1".to_string(), 0.5)]);
        f.tenure_days = 400;
        f.time_in_role_days = 100;
        f.hire_quarter = "2024-Q1".into();
        f
    }

    #[test]
    fn identical_full_profiles_have_unit_proximity() {
        let calc = ProximityCalculator::new(ProximityWeights::default());
        let a = full_features("a");
        let b = full_features("b");
        let mut chains = ManagerChains::default();
        chains.insert("a".into(), vec!["mgr".into()]);
        chains.insert("b".into(), vec!["mgr".into()]);

        let (overall, components) = calc.proximity(&a, &b, Some(&chains));
        assert_abs_diff_eq!(components.structural, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(components.functional, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(components.behavioral, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(components.temporal, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(overall, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn missing_fields_contribute_zero_not_nan() {
        let calc = ProximityCalculator::new(ProximityWeights::default());
        let a = bare_features("a");
        let b = bare_features("b");
        let (overall, components) = calc.proximity(&a, &b, None);
        assert_eq!(overall, 0.0);
        assert_eq!(components.structural, 0.0);
        assert_eq!(components.behavioral, 0.0);
        assert!(overall.is_finite());
    }

    #[test]
    fn structural_terms_add_up() {
        let calc = ProximityCalculator::new(ProximityWeights::default());
        let mut a = bare_features("a");
        let mut b = bare_features("b");
        a.team_id = Some("t".into());
        b.team_id = Some("t".into());
        a.location_id = Some("nyc".into());
        b.location_id = Some("nyc".into());
        assert_abs_diff_eq!(
            calc.structural_proximity(&a, &b, None),
            0.25,
            epsilon = 1e-12
        );
    }

    #[test]
    fn manager_chain_hops_discount() {
        let calc = ProximityCalculator::new(ProximityWeights::default());
        let a = bare_features("a");
        let b = bare_features("b");
        let mut chains = ManagerChains::default();
        // a -> m1 -> top, b -> m2 -> top: common ancestor "top" at 1 + 1 hops.
        chains.insert("a".into(), vec!["m1".into(), "top".into()]);
        chains.insert("b".into(), vec!["m2".into(), "top".into()]);

        let s = calc.structural_proximity(&a, &b, Some(&chains));
        assert_abs_diff_eq!(s, 0.20 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn level_distance_discounts_functional() {
        let calc = ProximityCalculator::new(ProximityWeights::default());
        let mut a = bare_features("a");
        let mut b = bare_features("b");
        a.job_level = 2;
        b.job_level = 5;
        let expected = 0.20 * (1.0 - 3.0 / 7.0);
        assert_abs_diff_eq!(calc.functional_proximity(&a, &b), expected, epsilon = 1e-12);
    }

    #[test]
    fn disjoint_access_sets_score_zero_jaccard() {
        let calc = ProximityCalculator::new(ProximityWeights::default());
        let mut a = bare_features("a");
        let mut b = bare_features("b");
        a.access_set = BTreeSet::from(["r1".to_string()]);
        b.access_set = BTreeSet::from(["r2".to_string()]);
        assert_eq!(calc.behavioral_proximity(&a, &b), 0.0);
    }

    #[test]
    fn cosine_ignores_zero_norm_vectors() {
        let a = BTreeMap::from([("r1".to_string(), 0.0)]);
        let b = BTreeMap::from([("r1".to_string(), 0.5)]);
        assert_eq!(intensity_cosine(&a, &b), None);
    }

    #[test]
    fn pairwise_matrix_is_symmetric_and_bounded() {
        let calc = ProximityCalculator::new(ProximityWeights::default());
        let ids: Vec<EmployeeId> = vec!["a".into(), "b".into(), "c".into()];
        let mut features = BTreeMap::new();
        features.insert("a".to_string(), full_features("a"));
        features.insert("b".to_string(), full_features("b"));
        let mut c = full_features("c");
        c.lob_id = Some("other".into());
        features.insert("c".to_string(), c);

        let m = calc.pairwise_matrix(&ids, &features, None, false);
        for i in 0..3 {
            assert_eq!(m.get(i, i), 1.0);
            for j in 0..3 {
                assert_eq!(m.get(i, j), m.get(j, i));
                assert!((0.0..=1.0).contains(&m.get(i, j)));
            }
        }
    }

    #[test]
    fn lob_blocking_zeroes_cross_lob_pairs() {
        let calc = ProximityCalculator::new(ProximityWeights::default());
        let ids: Vec<EmployeeId> = vec!["a".into(), "b".into(), "c".into()];
        let mut features = BTreeMap::new();
        features.insert("a".to_string(), full_features("a"));
        features.insert("b".to_string(), full_features("b"));
        let mut c = full_features("c");
        c.lob_id = Some("other".into());
        features.insert("c".to_string(), c);

        let m = calc.pairwise_matrix(&ids, &features, None, true);
        assert!(m.proximity("a", "b").unwrap() > 0.0);
        assert_eq!(m.proximity("a", "c").unwrap(), 0.0);
        assert_eq!(m.proximity("b", "c").unwrap(), 0.0);
        assert_eq!(m.proximity("c", "c").unwrap(), 1.0);
    }

    #[test]
    fn find_peers_orders_by_proximity_and_respects_floor() {
        let calc = ProximityCalculator::new(ProximityWeights::default());
        let mut features = BTreeMap::new();
        features.insert("a".to_string(), full_features("a"));
        features.insert("b".to_string(), full_features("b"));
        let mut distant = bare_features("d");
        distant.job_family = "Engineering".into();
        features.insert("d".to_string(), distant);

        let peers = calc.find_peers("a", &features, 10, 0.3, None);
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].employee_id, "b");

        let all = calc.find_peers("a", &features, 10, 0.0, None);
        assert_eq!(all.len(), 2);
        assert!(all[0].proximity >= all[1].proximity);
    }
}
