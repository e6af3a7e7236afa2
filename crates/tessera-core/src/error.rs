//! Error types for tessera.

use thiserror::Error;

use crate::types::ChunkType;

/// Main error type for tessera operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Chunking failed
    #[error("chunking error: {0}")]
    Chunking(#[from] ChunkError),

    /// Storage operation failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Chunking errors.
///
/// Strategies surface only `InvalidInput` and `DepthExceeded`; `NoStrategy`
/// belongs to the orchestrator's dispatch step.
#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no strategy registered for type {0}")]
    NoStrategy(ChunkType),

    #[error("recursion depth {depth} exceeds cap {max}")]
    DepthExceeded { depth: usize, max: usize },
}

/// Storage errors.
///
/// `Transient` failures are subject to the adapter's retry policy and only
/// surfaced after exhaustion; `Permanent` failures surface immediately.
/// `Lock` is downgraded to a warning by the filesystem adapter.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("transient storage failure: {0}")]
    Transient(String),

    #[error("permanent storage failure: {0}")]
    Permanent(String),

    #[error("lock unavailable: {0}")]
    Lock(String),
}

impl StoreError {
    /// Whether the operation may be retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::TimedOut
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe => StoreError::Transient(err.to_string()),
            _ => StoreError::Permanent(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Permanent(format!("serialization: {err}"))
    }
}

/// Result type alias for tessera operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    // ========== ChunkError Tests ==========

    #[test]
    fn test_chunk_error_invalid_input_display() {
        let err = ChunkError::InvalidInput("empty merge input".to_string());
        assert_eq!(err.to_string(), "invalid input: empty merge input");
    }

    #[test]
    fn test_chunk_error_no_strategy_display() {
        let err = ChunkError::NoStrategy(ChunkType::GlobalVars);
        assert_eq!(
            err.to_string(),
            "no strategy registered for type globalVars"
        );
    }

    #[test]
    fn test_chunk_error_depth_exceeded_display() {
        let err = ChunkError::DepthExceeded {
            depth: 101,
            max: 100,
        };
        assert_eq!(err.to_string(), "recursion depth 101 exceeds cap 100");
    }

    // ========== StoreError Tests ==========

    #[test]
    fn test_store_error_transient_is_retriable() {
        assert!(StoreError::Transient("timeout".to_string()).is_transient());
        assert!(!StoreError::Permanent("bad schema".to_string()).is_transient());
        assert!(!StoreError::Lock("held".to_string()).is_transient());
    }

    #[test]
    fn test_store_error_from_io_timeout_is_transient() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "deadline");
        let err: StoreError = io.into();
        assert!(err.is_transient());
    }

    #[test]
    fn test_store_error_from_io_not_found_is_permanent() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: StoreError = io.into();
        assert!(!err.is_transient());
    }

    #[test]
    fn test_store_error_from_serde_is_permanent() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: StoreError = json_err.into();
        assert!(matches!(err, StoreError::Permanent(_)));
        assert!(err.to_string().contains("serialization"));
    }

    // ========== Main Error Tests ==========

    #[test]
    fn test_error_from_chunk_error() {
        let err: Error = ChunkError::InvalidInput("bad id".to_string()).into();
        assert!(matches!(err, Error::Chunking(_)));
        assert!(err.to_string().contains("bad id"));
    }

    #[test]
    fn test_error_from_store_error() {
        let err: Error = StoreError::Transient("connection lost".to_string()).into();
        assert!(matches!(err, Error::Store(_)));
        assert!(err.to_string().contains("connection lost"));
    }

    #[test]
    fn test_result_type_alias() {
        fn ok() -> Result<u8> {
            Ok(1)
        }
        fn fail() -> Result<u8> {
            Err(Error::Other("nope".to_string()))
        }
        assert!(ok().is_ok());
        assert!(fail().is_err());
    }
}
