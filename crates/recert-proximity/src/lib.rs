pub mod features;
pub mod matrix;
pub mod proximity;

pub use features::{parse_date, EmployeeFeatures, FeatureExtractor};
pub use matrix::ProximityMatrix;
pub use proximity::{
    ManagerChains, PeerMatch, ProximityCalculator, ProximityComponents,
};

// Re-export common types for convenience
pub use recert_core::{ProximityWeights, Result};
