//! Backing-store error types.

use thiserror::Error;

use crate::value::ParamType;

/// Result alias for backing-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised at the backing-store boundary.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The store could not be reached (network failure, refused, timed out).
    #[error("backing store unreachable at {address}: {reason}")]
    Unreachable {
        /// Endpoint address that was dialled.
        address: String,
        /// Driver-supplied reason.
        reason: String,
    },

    /// The store rejected the supplied credentials.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// An operation was issued on a session that is not open.
    #[error("connection closed")]
    ConnectionClosed,

    /// The store rejected or failed a statement.
    #[error("query failed: {0}")]
    Query(String),

    /// Wrong number of parameter values for a query shape.
    #[error("expected {expected} parameters, got {actual}")]
    ParameterCount {
        /// Declared slot count.
        expected: usize,
        /// Supplied value count.
        actual: usize,
    },

    /// A parameter value does not match its declared slot type.
    #[error("parameter '{name}' expects {expected:?}, got {actual:?}")]
    ParameterType {
        /// Slot name.
        name: String,
        /// Declared type.
        expected: ParamType,
        /// Type of the supplied value.
        actual: ParamType,
    },

    /// A table or column name is not a plain identifier.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// IO error from the underlying transport.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error means the store could not be used at all
    /// (unreachable, authentication failure, transport failure).
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Self::Unreachable { .. } | Self::Authentication(_) | Self::Io(_)
        )
    }

    /// Shorthand for building an [`Error::Unreachable`].
    pub fn unreachable(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unreachable {
            address: address.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_classification() {
        assert!(Error::unreachable("db:1", "refused").is_connectivity());
        assert!(Error::Authentication("bad password".into()).is_connectivity());
        assert!(Error::Io(std::io::Error::other("reset")).is_connectivity());
        assert!(!Error::Query("syntax".into()).is_connectivity());
        assert!(!Error::ConnectionClosed.is_connectivity());
    }

    #[test]
    fn test_display() {
        let err = Error::ParameterCount {
            expected: 2,
            actual: 1,
        };
        assert_eq!(err.to_string(), "expected 2 parameters, got 1");
    }
}
