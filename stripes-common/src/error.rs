//! Common error types for Stripes

use thiserror::Error;

use crate::auth::Role;

/// Common result type for Stripes operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the Stripes crates
#[derive(Error, Debug)]
pub enum Error {
    /// Mutation attempted by a role lacking permission. Never retried.
    #[error("Not authorized: {role} may not {operation}")]
    Authorization { operation: &'static str, role: Role },

    /// Referenced student, item, song or user does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Remote store rejected a write (network or store error)
    #[error("Write failed: {0}")]
    WriteFailure(String),

    /// Remote store unreachable or refused a read/subscribe
    #[error("Remote store error: {0}")]
    Remote(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl Error {
    /// True for failures a later attempt could get past
    pub fn is_retriable(&self) -> bool {
        matches!(self, Error::WriteFailure(_) | Error::Remote(_) | Error::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_failures_are_retriable() {
        assert!(Error::WriteFailure("offline".into()).is_retriable());
        assert!(Error::Remote("refused".into()).is_retriable());
        let reset = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(Error::Io(reset).is_retriable());
    }

    #[test]
    fn test_caller_errors_are_not_retriable() {
        let denied = Error::Authorization {
            operation: "add student",
            role: Role::Pending,
        };
        assert!(!denied.is_retriable());
        assert!(!Error::NotFound("student".into()).is_retriable());
        assert!(!Error::InvalidInput("empty name".into()).is_retriable());
    }
}
