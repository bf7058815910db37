//! Error types for sequential arrangement.
//!
//! Infeasibility is not an error: an unsatisfiable batch or an object that does
//! not fit is reported through [`crate::result::ArrangementResult`]. The variants
//! here cover faults the caller has to act on.

use thiserror::Error;

/// Errors raised by geometry preprocessing, solver sessions and drivers.
#[derive(Debug, Error)]
pub enum Error {
    /// A polygon violates a precondition (too few points, zero area, ...).
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// The bed description is unusable.
    #[error("invalid boundary: {0}")]
    InvalidBoundary(String),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A decision variable name was declared twice in one session.
    #[error("duplicate decision variable: {0}")]
    DuplicateVariable(String),

    /// A formula refers to a variable the session never declared.
    #[error("unknown decision variable: {0}")]
    UnknownVariable(String),

    /// The solver backend failed (process error, malformed answer, ...).
    #[error("solver backend error: {0}")]
    Backend(String),

    /// I/O failure while talking to an external solver.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal invariant broken.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::DuplicateVariable("X_3".into());
        assert_eq!(err.to_string(), "duplicate decision variable: X_3");

        let err = Error::Backend("z3 exited".into());
        assert!(err.to_string().contains("z3 exited"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
