//! Error types for nearfield.

use thiserror::Error;

/// Errors that can occur while building, loading, or searching an index.
#[derive(Debug, Error)]
pub enum AnnError {
    /// Invalid parameter value (negative k, unknown metric, bad shape).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Dimension mismatch between query/corpus and the configured index.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Search called before data was set or before a graph was loaded.
    #[error("not initialized: {0}")]
    NotInitialized(String),

    /// Metric/code-type combination without a kernel.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// File I/O failure, including truncated or malformed index files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Aligned allocation failure.
    #[error("memory allocation failed: {0}")]
    Memory(String),
}

/// Result type alias for nearfield operations.
pub type Result<T> = std::result::Result<T, AnnError>;
