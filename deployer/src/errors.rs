//! Error types for the lab deployer

use thiserror::Error;

/// Main error type for the lab deployer
#[derive(Error, Debug)]
pub enum DeployerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout: {0}")]
    TimeoutError(String),

    #[error("Hypervisor API error: {0}")]
    ApiError(String),

    #[error("Connect already in progress: {0}")]
    AlreadyConnectingError(String),

    #[error("Not connected: {0}")]
    NotConnectedError(String),

    #[error("Duplicate job: {0}")]
    DuplicateJobError(String),

    #[error("Not found: {0}")]
    NotFoundError(String),

    #[error("Job error: {0}")]
    JobError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for DeployerError {
    fn from(err: anyhow::Error) -> Self {
        DeployerError::Internal(err.to_string())
    }
}
