use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {0}")]
    Operation(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{backend} unreachable: {message}")]
    Connectivity { backend: &'static str, message: String },

    #[error("{backend} timed out after {after:?}")]
    Timeout { backend: &'static str, after: Duration },

    #[error("Embedding provider failed: {0}")]
    Provider(String),

    #[error("Generation failed: {0}")]
    Generation(String),
}

impl Error {
    pub fn connectivity(backend: &'static str, message: impl std::fmt::Display) -> Self {
        Self::Connectivity { backend, message: message.to_string() }
    }

    /// Timeouts count as the backend being unreachable.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity { .. } | Self::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Run `fut` against an external backend, failing with [`Error::Timeout`]
/// once `after` elapses.
pub async fn with_deadline<T, F>(backend: &'static str, after: Duration, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(res) => res,
        Err(_) => Err(Error::Timeout { backend, after }),
    }
}
