//! Error types for occur operations.

use thiserror::Error;

/// Errors that can occur in occur operations.
///
/// A recurrence pattern that the evaluator cannot expand is not an error:
/// it is logged and treated as a series with no occurrences.
#[derive(Error, Debug)]
pub enum OccurError {
    #[error("Series not found: {0}")]
    SeriesNotFound(String),

    #[error("Event '{0}' has no recurrence pattern")]
    NotRecurring(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid recurrence pattern: {0}")]
    InvalidRecurrence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for occur operations.
pub type OccurResult<T> = Result<T, OccurError>;
