//! Redis error types.

use thiserror::Error;

/// Result type for Redis operations.
pub type Result<T> = std::result::Result<T, RedisError>;

/// Redis errors.
#[derive(Debug, Error)]
pub enum RedisError {
    /// Could not open or keep a connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Pool exhausted or misconfigured.
    #[error("Pool error: {0}")]
    Pool(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Command failed on the server.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl RedisError {
    /// Whether retrying the same command later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Pool(_) => true,
            Self::Redis(err) => err.is_io_error() || err.is_timeout(),
            Self::Config(_) => false,
        }
    }
}

impl<E> From<bb8::RunError<E>> for RedisError
where
    E: std::error::Error + 'static,
{
    fn from(err: bb8::RunError<E>) -> Self {
        Self::Pool(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(RedisError::Connection("refused".into()).is_retryable());
        assert!(RedisError::Pool("timed out".into()).is_retryable());
        assert!(!RedisError::Config("bad url".into()).is_retryable());
    }

    #[test]
    fn test_display() {
        let err = RedisError::Pool("exhausted".into());
        assert_eq!(err.to_string(), "Pool error: exhausted");
    }
}
