//! Configuration for the analytics pipeline.
//!
//! All knobs are plain data with defaults; `AnalyticsConfig::validate` runs
//! before any stage and is the only place a `Configuration` error can
//! originate.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{RecertError, Result};

/// Per-dimension contributions to pairwise proximity. Must sum to 1.0;
/// callers may pass unnormalized weights and rely on [`ProximityWeights::normalized`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProximityWeights {
    pub structural: f64,
    pub functional: f64,
    pub behavioral: f64,
    pub temporal: f64,
}

impl Default for ProximityWeights {
    fn default() -> Self {
        Self {
            structural: 0.25,
            functional: 0.35,
            behavioral: 0.30,
            temporal: 0.10,
        }
    }
}

impl ProximityWeights {
    pub fn sum(&self) -> f64 {
        self.structural + self.functional + self.behavioral + self.temporal
    }

    pub fn is_normalized(&self) -> bool {
        (self.sum() - 1.0).abs() < 1e-3
    }

    /// Renormalize so the dimensions sum to 1.0. A zero vector falls back to
    /// the defaults rather than dividing by zero.
    pub fn normalized(&self) -> ProximityWeights {
        let total = self.sum();
        if total == 0.0 {
            return ProximityWeights::default();
        }
        ProximityWeights {
            structural: self.structural / total,
            functional: self.functional / total,
            behavioral: self.behavioral / total,
            temporal: self.temporal / total,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("structural", self.structural),
            ("functional", self.functional),
            ("behavioral", self.behavioral),
            ("temporal", self.temporal),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(RecertError::configuration(format!(
                    "proximity weight `{name}` must be a non-negative number, got {value}"
                )));
            }
        }
        if self.sum() <= 0.0 {
            return Err(RecertError::configuration(
                "proximity weights must not all be zero",
            ));
        }
        Ok(())
    }
}

/// The four clustering strategies. The lowercase names double as the stable
/// identifiers used for deterministic ordering and serialized output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Dbscan,
    GraphCommunity,
    Hierarchical,
    KMeans,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::Dbscan,
        StrategyKind::GraphCommunity,
        StrategyKind::Hierarchical,
        StrategyKind::KMeans,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Dbscan => "dbscan",
            StrategyKind::GraphCommunity => "graph_community",
            StrategyKind::Hierarchical => "hierarchical",
            StrategyKind::KMeans => "kmeans",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Upper bound on the auto-k search for the centroid and agglomerative
    /// strategies.
    pub max_clusters: usize,
    /// The auto-k search also caps k at population / min_cluster_size.
    pub min_cluster_size: usize,
    pub dbscan_eps: f64,
    pub dbscan_min_samples: usize,
    pub graph_resolution: f64,
    /// Pairs below this proximity get no edge in the community graph.
    pub graph_min_edge_weight: f64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            max_clusters: 50,
            min_cluster_size: 5,
            dbscan_eps: 0.3,
            dbscan_min_samples: 5,
            graph_resolution: 1.0,
            graph_min_edge_weight: 0.2,
        }
    }
}

impl ClusteringConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_clusters < 2 {
            return Err(RecertError::configuration("max_clusters must be at least 2"));
        }
        if self.min_cluster_size == 0 {
            return Err(RecertError::configuration(
                "min_cluster_size must be at least 1",
            ));
        }
        if !self.dbscan_eps.is_finite() || self.dbscan_eps <= 0.0 {
            return Err(RecertError::configuration(format!(
                "dbscan_eps must be positive, got {}",
                self.dbscan_eps
            )));
        }
        if self.dbscan_min_samples == 0 {
            return Err(RecertError::configuration(
                "dbscan_min_samples must be at least 1",
            ));
        }
        if !self.graph_resolution.is_finite() || self.graph_resolution <= 0.0 {
            return Err(RecertError::configuration(format!(
                "graph_resolution must be positive, got {}",
                self.graph_resolution
            )));
        }
        if !(0.0..=1.0).contains(&self.graph_min_edge_weight) {
            return Err(RecertError::configuration(format!(
                "graph_min_edge_weight must be in [0, 1], got {}",
                self.graph_min_edge_weight
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Consensus scores below this flag the employee for human review.
    pub review_threshold: f64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            review_threshold: 0.7,
        }
    }
}

impl ConsensusConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.review_threshold) {
            return Err(RecertError::configuration(format!(
                "consensus review_threshold must be in [0, 1], got {}",
                self.review_threshold
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssuranceConfig {
    /// Final score at or above this classifies as high assurance.
    pub high_threshold: f64,
    /// Final score at or above this (but below high) classifies as medium.
    pub medium_threshold: f64,
    pub weight_typicality: f64,
    pub weight_usage: f64,
    /// Last use within this many days labels the grant "active".
    pub active_days_threshold: i64,
    pub occasional_days_threshold: i64,
    pub stale_days_threshold: i64,
}

impl Default for AssuranceConfig {
    fn default() -> Self {
        Self {
            high_threshold: 80.0,
            medium_threshold: 50.0,
            weight_typicality: 0.6,
            weight_usage: 0.4,
            active_days_threshold: 30,
            occasional_days_threshold: 90,
            stale_days_threshold: 365,
        }
    }
}

impl AssuranceConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("high_threshold", self.high_threshold),
            ("medium_threshold", self.medium_threshold),
        ] {
            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                return Err(RecertError::configuration(format!(
                    "assurance {name} must be in [0, 100], got {value}"
                )));
            }
        }
        if self.medium_threshold > self.high_threshold {
            return Err(RecertError::configuration(format!(
                "medium_threshold ({}) must not exceed high_threshold ({})",
                self.medium_threshold, self.high_threshold
            )));
        }
        for (name, value) in [
            ("weight_typicality", self.weight_typicality),
            ("weight_usage", self.weight_usage),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(RecertError::configuration(format!(
                    "assurance {name} must be non-negative, got {value}"
                )));
            }
        }
        if self.weight_typicality + self.weight_usage <= 0.0 {
            return Err(RecertError::configuration(
                "assurance component weights must not all be zero",
            ));
        }
        if self.active_days_threshold < 0
            || self.occasional_days_threshold < self.active_days_threshold
            || self.stale_days_threshold < self.occasional_days_threshold
        {
            return Err(RecertError::configuration(
                "usage day thresholds must be non-negative and non-decreasing",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Restrict the run to one LOB, by id or by name.
    pub lob_filter: Option<String>,
    /// Skip cross-LOB pair computation. The default; required for large
    /// populations to keep the pairwise loop tractable.
    pub block_by_lob: bool,
    /// Which clustering strategies to run.
    pub strategies: Vec<StrategyKind>,
    /// Seeds every stochastic component. Identical snapshot + identical
    /// config + identical seed => identical result.
    pub rng_seed: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            lob_filter: None,
            block_by_lob: true,
            strategies: StrategyKind::ALL.to_vec(),
            rng_seed: 42,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(filter) = &self.lob_filter {
            if filter.trim().is_empty() {
                return Err(RecertError::configuration(
                    "lob_filter must not be blank when set",
                ));
            }
        }
        if self.strategies.is_empty() {
            return Err(RecertError::configuration(
                "at least one clustering strategy must be enabled",
            ));
        }
        Ok(())
    }
}

/// Top-level configuration consumed by the pipeline entry point.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default)]
    pub proximity: ProximityWeights,
    #[serde(default)]
    pub clustering: ClusteringConfig,
    #[serde(default)]
    pub consensus: ConsensusConfig,
    #[serde(default)]
    pub assurance: AssuranceConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl AnalyticsConfig {
    pub fn validate(&self) -> Result<()> {
        self.proximity.validate()?;
        self.clustering.validate()?;
        self.consensus.validate()?;
        self.assurance.validate()?;
        self.pipeline.validate()?;
        Ok(())
    }
}
