//! Error types for history storage and registry operations

use thiserror::Error;

/// Errors raised by the periphery (file stores, settings files, registry).
///
/// Core history operations never return these; see the crate docs for the
/// recovery rules that keep `add`/`remove`/`clear` total.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Storage path not available")]
    PathUnavailable,

    #[error("History domain '{0}' is already registered with a different value type")]
    DomainTypeMismatch(String),
}

/// Result type for history operations
pub type HistoryResult<T> = Result<T, HistoryError>;
