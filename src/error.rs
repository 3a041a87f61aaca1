//! Hoard error types

use std::time::Duration;

/// Boxed error returned by injected compute functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Hoard error types
#[derive(Debug, thiserror::Error)]
pub enum HoardError {
    // Store-level errors. Recovered inside the adapter, never surfaced to readers.
    #[error("cache store error: {0}")]
    Store(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Upstream (system of record) errors
    #[error("upstream error: {0}")]
    Upstream(#[source] BoxError),

    /// The compute function did not finish before the deadline. It may
    /// still be running; the system of record state is unknown.
    #[error("upstream did not respond within {deadline:?}")]
    Timeout { deadline: Duration },

    // Programming/configuration errors
    #[error("invalid cache key: {0}")]
    InvalidKey(String),

    #[error("unknown TTL class: {0}")]
    UnknownTtlClass(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl HoardError {
    /// Wrap any upstream failure.
    pub fn upstream(err: impl Into<BoxError>) -> Self {
        HoardError::Upstream(err.into())
    }

    /// Whether this error is a deadline expiry (distinct from a failure).
    pub fn is_timeout(&self) -> bool {
        matches!(self, HoardError::Timeout { .. })
    }

    /// Whether the system of record itself failed.
    pub fn is_upstream(&self) -> bool {
        matches!(self, HoardError::Upstream(_))
    }

    /// Message safe to show to an HTTP client.
    ///
    /// Never includes store or upstream internals.
    pub fn user_message(&self) -> &'static str {
        match self {
            HoardError::Timeout { .. } => "request timed out, please retry",
            _ => "temporarily unavailable",
        }
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for HoardError {
    fn from(err: redis::RedisError) -> Self {
        HoardError::Store(format!("redis: {err}"))
    }
}

/// Result type alias for Hoard operations
pub type Result<T> = std::result::Result<T, HoardError>;
