//! Error types for scanmesh

use thiserror::Error;

/// Main error type for scanmesh operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Insufficient data: {what} needs at least {required}, got {actual}")]
    InsufficientData {
        what: &'static str,
        required: usize,
        actual: usize,
    },

    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("Alignment failure: {0}")]
    AlignmentFailure(String),

    #[error("Point outside fusion volume: {0}")]
    FusionOutOfRange(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Algorithm error: {0}")]
    Algorithm(String),
}

/// Result type alias for scanmesh operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for [`Error::InsufficientData`]
    pub fn insufficient(what: &'static str, required: usize, actual: usize) -> Self {
        Error::InsufficientData {
            what,
            required,
            actual,
        }
    }
}
