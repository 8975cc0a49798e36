//! Engine Error Taxonomy
//!
//! Every fallible surface of the engine returns [`EngineError`] so callers
//! can distinguish "fix your config" from "retry the call" from "some units
//! were skipped".

use thiserror::Error;

/// Errors surfaced by the indexing and query engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid or missing configuration. Raised synchronously at session or
    /// server construction; never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Engine endpoint unreachable or the connection dropped mid-operation.
    /// Safe to retry the whole call.
    #[error("connection error: {0}")]
    Connection(String),

    /// An extraction capability failed for a specific text unit. Isolated to
    /// the offending unit and reflected in counters.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// An embedding capability failed for a text batch. A dimensionality
    /// mismatch from the same embedder instance is a contract violation and
    /// is fatal for the call.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// A graph-merge invariant violation. The batch is retried once before
    /// this is surfaced.
    #[error("indexing failed: {0}")]
    Indexing(String),

    /// Malformed query parameters.
    #[error("invalid query: {0}")]
    Query(String),

    /// Read-path lookup of a session that does not exist.
    #[error("session not found: {0}")]
    SessionNotFound(String),
}

impl EngineError {
    /// Whether a caller may retry the failed call as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Extraction(_))
    }
}

/// Convenience alias used throughout the crate.
pub type EngineResult<T> = Result<T, EngineError>;
