use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecertError {
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl RecertError {
    pub fn snapshot(msg: impl Into<String>) -> Self {
        RecertError::Snapshot(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        RecertError::Configuration(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, RecertError>;
