pub mod assurance;
pub mod pipeline;
pub mod result;

pub use assurance::{
    sensitivity_ceiling, AssuranceScore, AssuranceScorer, Classification, UsageLabel, UsagePattern,
};
pub use pipeline::{AnalyticsEngine, EmployeeAccessSummary, ReviewItem};
pub use result::{AnalyticsResult, AnalyticsSummary, ExportConsensus, ExportDocument, ExportScore};

// Re-export common types for convenience
pub use recert_core::{AnalyticsConfig, RecertError, Result, Snapshot};
