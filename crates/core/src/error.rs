//! Error types for chainql
//!
//! This module defines all error types used throughout the query layers.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! ## Propagation
//!
//! - `Argument` is raised synchronously while a chain is being built and is
//!   never deferred into the queue.
//! - `UnsupportedOperation` is raised when a compiler meets a queued
//!   operation it cannot express.
//! - `TypeMismatch` is raised by the static evaluator.
//! - `Storage` comes from a connector. Single-row mutations turn it into a
//!   failed `WriteResult`; reads propagate it.

use thiserror::Error;

/// Result type alias for chainql operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for chainql
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Malformed call shape (wrong argument count, empty schema, bad name)
    #[error("invalid argument: {0}")]
    Argument(String),

    /// A queued operation has no meaning for the active compiler
    #[error("unsupported operation `{command}`: {reason}")]
    UnsupportedOperation {
        /// Name of the offending operation
        command: &'static str,
        /// Why the compiler rejected it
        reason: String,
    },

    /// An operation was applied to a value of the wrong type
    #[error("type mismatch in `{command}`: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Name of the offending operation
        command: &'static str,
        /// Expected value type
        expected: &'static str,
        /// Actual value type
        actual: &'static str,
    },

    /// The storage connector rejected a statement
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Build an `UnsupportedOperation` error
    pub fn unsupported(command: &'static str, reason: impl Into<String>) -> Self {
        Error::UnsupportedOperation {
            command,
            reason: reason.into(),
        }
    }

    /// Build an `Argument` error
    pub fn argument(reason: impl Into<String>) -> Self {
        Error::Argument(reason.into())
    }

    /// Build a `Storage` error
    pub fn storage(reason: impl Into<String>) -> Self {
        Error::Storage(reason.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Argument(format!("invalid config: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_argument() {
        let err = Error::argument("branch requires a false action");
        let msg = err.to_string();
        assert!(msg.contains("invalid argument"));
        assert!(msg.contains("false action"));
    }

    #[test]
    fn test_error_display_unsupported_names_command() {
        let err = Error::unsupported("map", "cannot be pushed into SQL");
        let msg = err.to_string();
        assert!(msg.contains("`map`"));
        assert!(msg.contains("cannot be pushed"));
    }

    #[test]
    fn test_error_display_type_mismatch() {
        let err = Error::TypeMismatch {
            command: "count",
            expected: "array",
            actual: "number",
        };
        let msg = err.to_string();
        assert!(msg.contains("count"));
        assert!(msg.contains("array"));
        assert!(msg.contains("number"));
    }

    #[test]
    fn test_error_from_serde_json() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("{nope");
        let err: Error = result.unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_result() -> Result<i32> {
            Ok(42)
        }

        fn returns_error() -> Result<i32> {
            Err(Error::storage("disk full"))
        }

        assert_eq!(returns_result().unwrap(), 42);
        assert!(returns_error().is_err());
    }
}
