//! Error types and Result alias for the rewards service

use thiserror::Error;

/// Main error type for the rewards service
#[derive(Error, Debug)]
pub enum Error {
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("User not authenticated")]
    NotAuthenticated,

    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Realtime channel error: {0}")]
    RealtimeError(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Malformed reward payload: {0}")]
    MalformedReward(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::NetworkError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidData(err.to_string())
    }
}
