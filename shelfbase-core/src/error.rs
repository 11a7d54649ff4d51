// shelfbase-core/src/error.rs
// Error types shared by the document store and the report generator

use std::fmt;
use thiserror::Error;

/// Every failure the store can raise
#[derive(Error, Debug)]
pub enum ShelfError {
    /// Session could not be established or was lost
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Aggregation error: {0}")]
    AggregationError(String),

    /// Update or delete rejected by the store
    #[error("Write rejected: {0}")]
    WriteRejected(String),

    #[error("Index error: {0}")]
    IndexError(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse failure classes surfaced to report callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Connection,
    Query,
    Write,
    Index,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Connection => "connection",
            FailureKind::Query => "query",
            FailureKind::Write => "write",
            FailureKind::Index => "index",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ShelfError {
    /// Classify this error for per-report failure handling.
    ///
    /// Storage I/O means the session itself is unusable, so it counts as a
    /// connection failure. A bad configuration is rejected by `connect`
    /// before any report runs; inside a run it is a bad report parameter.
    pub fn kind(&self) -> FailureKind {
        match self {
            ShelfError::Connection(_) | ShelfError::Io(_) => FailureKind::Connection,
            ShelfError::InvalidQuery(_)
            | ShelfError::Config(_)
            | ShelfError::AggregationError(_)
            | ShelfError::CollectionNotFound(_)
            | ShelfError::Serialization(_) => FailureKind::Query,
            ShelfError::WriteRejected(_) => FailureKind::Write,
            ShelfError::IndexError(_) => FailureKind::Index,
        }
    }
}

impl From<serde_json::Error> for ShelfError {
    fn from(err: serde_json::Error) -> Self {
        ShelfError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for ShelfError {
    fn from(err: toml::de::Error) -> Self {
        ShelfError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ShelfError>;
