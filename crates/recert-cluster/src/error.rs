use thiserror::Error;

/// Strategy-local failures. These never cross the pipeline boundary: the
/// engine logs them at warning level and drops the strategy from the run.
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("Degenerate input: {0}")]
    Degenerate(String),

    #[error("Strategy failed: {0}")]
    Strategy(String),
}

pub type ClusterResult<T> = std::result::Result<T, ClusterError>;
