pub mod assignment;
pub mod community;
pub mod consensus;
pub mod dbscan;
pub mod engine;
pub mod error;
pub mod hierarchical;
pub mod kmeans;
pub mod silhouette;

pub use assignment::{ClusterAssignment, StrategyAssignments, OUTLIER_CLUSTER};
pub use consensus::{ConsensusAnalyzer, ConsensusResult};
pub use engine::MultiStrategyClusterer;
pub use error::{ClusterError, ClusterResult};
pub use silhouette::silhouette_score;

// Re-export common types for convenience
pub use recert_core::StrategyKind;
