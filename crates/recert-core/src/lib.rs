pub mod config;
pub mod error;
pub mod types;

pub use config::{
    AnalyticsConfig, AssuranceConfig, ClusteringConfig, ConsensusConfig, PipelineConfig,
    ProximityWeights, StrategyKind,
};
pub use error::{RecertError, Result};
pub use types::{
    AccessGrant, ActivitySummary, Employee, EmployeeId, EmploymentStatus, GrantId, Lob, LobId,
    Resource, ResourceId, Sensitivity, Snapshot, SubLob, SubLobId, Team, TeamId,
};
