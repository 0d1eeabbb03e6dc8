use ndarray::Array2;
use rustc_hash::FxHashMap;

use recert_core::types::EmployeeId;

/// Symmetric pairwise proximity matrix with its employee index.
///
/// The row/column order is the caller-supplied (sorted) employee-id order;
/// it is the canonical order for every downstream stage. Entries live in
/// [0, 1] with a unit diagonal. Immutable once published by the calculator.
#[derive(Debug, Clone, PartialEq)]
pub struct ProximityMatrix {
    ids: Vec<EmployeeId>,
    index: FxHashMap<EmployeeId, usize>,
    values: Array2<f64>,
}

impl ProximityMatrix {
    pub fn new(ids: Vec<EmployeeId>) -> Self {
        let n = ids.len();
        let index = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
        let mut values = Array2::zeros((n, n));
        for i in 0..n {
            values[[i, i]] = 1.0;
        }
        Self { ids, index, values }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[EmployeeId] {
        &self.ids
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[[i, j]]
    }

    pub fn set_symmetric(&mut self, i: usize, j: usize, value: f64) {
        self.values[[i, j]] = value;
        self.values[[j, i]] = value;
    }

    /// Proximity between two employees by id; `None` if either is unknown.
    pub fn proximity(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.index_of(a)?;
        let j = self.index_of(b)?;
        Some(self.values[[i, j]])
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Distance view (1 - proximity); zero diagonal.
    pub fn distance_matrix(&self) -> Array2<f64> {
        self.values.mapv(|p| 1.0 - p)
    }
}
