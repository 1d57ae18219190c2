//! Cache Error Taxonomy
//!
//! Every fallible operation in the crate reports a [`CacheError`]. The public
//! cache surfaces (`RemoteCache::get`, `HybridCache::set`, ...) never return
//! these to callers; they log and convert to `None`/`false`. The error-returning
//! forms exist so the hybrid tier can decide when to stop using the remote.

use thiserror::Error;

/// Result alias used throughout the crate
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Errors produced by the cache layers
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    /// Transport-level failure: refused, dropped, timed out, I/O
    #[error("connection error: {0}")]
    Connection(String),

    /// The circuit breaker denied the attempt
    #[error("circuit breaker is open")]
    CircuitOpen,

    /// Payload could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The backend rejected a well-formed request
    #[error("operation error: {0}")]
    Operation(String),

    /// Used before `initialize()` or after the connection was dropped
    #[error("connection manager is not initialized")]
    NotInitialized,

    /// Invalid construction parameters
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CacheError {
    /// Whether the retry loop should make another attempt after this error
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Operation(_))
    }

    /// Whether this error shows the remote tier is unreachable
    ///
    /// The hybrid cache stops routing to its remote when it sees one of these.
    #[must_use]
    pub fn disables_remote(&self) -> bool {
        matches!(
            self,
            Self::CircuitOpen | Self::Connection(_) | Self::NotInitialized
        )
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error()
            || err.is_timeout()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
        {
            Self::Connection(err.to_string())
        } else {
            Self::Operation(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(CacheError::Connection("refused".into()).is_retryable());
        assert!(CacheError::Operation("LOADING".into()).is_retryable());
        assert!(!CacheError::CircuitOpen.is_retryable());
        assert!(!CacheError::Serialization("bad".into()).is_retryable());
        assert!(!CacheError::NotInitialized.is_retryable());

        assert!(CacheError::CircuitOpen.disables_remote());
        assert!(CacheError::Connection("reset".into()).disables_remote());
        assert!(CacheError::NotInitialized.disables_remote());
        assert!(!CacheError::Operation("WRONGTYPE".into()).disables_remote());
        assert!(!CacheError::Serialization("bad".into()).disables_remote());
    }

    #[test]
    fn test_serde_error_maps_to_serialization() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert!(matches!(CacheError::from(err), CacheError::Serialization(_)));
    }
}
