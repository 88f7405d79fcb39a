//! Model cache error types

use thiserror::Error;

/// Errors raised by a [`ModelProvider`](super::ModelProvider)
#[derive(Error, Debug)]
pub enum FetchError {
    /// The provider could not be reached or refused the request
    #[error("Model provider unavailable: {0}")]
    Unavailable(String),

    /// The provider answered with something that isn't a model batch
    #[error("Invalid model payload: {0}")]
    InvalidPayload(String),

    /// Local I/O failure (directory provider)
    #[error("Model storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned to callers of the model cache
#[derive(Error, Debug)]
pub enum CacheError {
    /// The cache service has shut down
    #[error("Model cache service is not running")]
    ServiceUnavailable,

    /// The cache was reset while this request was in flight
    #[error("Request superseded by reset (epoch {epoch})")]
    Superseded { epoch: u64 },

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Result type for model cache operations
pub type CacheResult<T> = Result<T, CacheError>;
