use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use recert_core::config::StrategyKind;
use recert_core::types::EmployeeId;

/// Cluster id reserved for outliers (density noise points).
pub const OUTLIER_CLUSTER: i64 = -1;

/// One strategy's verdict for one employee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub employee_id: EmployeeId,
    pub strategy: StrategyKind,
    /// Non-negative cluster id, or [`OUTLIER_CLUSTER`] for outliers.
    pub cluster_id: i64,
    /// Strategy-specific membership confidence in [0, 1].
    pub confidence: f64,
    pub is_outlier: bool,
}

/// Full output of one strategy, keyed by employee id.
pub type StrategyAssignments = BTreeMap<EmployeeId, ClusterAssignment>;

/// Relabel raw cluster indices so ids are assigned in order of first
/// appearance along the canonical employee order. Keeps output stable
/// against internal renumbering differences between strategies.
pub(crate) fn relabel_by_first_appearance(raw: &[usize]) -> Vec<i64> {
    let mut next = 0i64;
    let mut mapping: BTreeMap<usize, i64> = BTreeMap::new();
    raw.iter()
        .map(|&label| {
            *mapping.entry(label).or_insert_with(|| {
                let id = next;
                next += 1;
                id
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relabel_is_first_appearance_order() {
        assert_eq!(
            relabel_by_first_appearance(&[7, 7, 2, 7, 9, 2]),
            vec![0, 0, 1, 0, 2, 1]
        );
    }
}
