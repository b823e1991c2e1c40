//! Allocator error types.

use std::time::Duration;

use pooldb_pool::PoolError;
use thiserror::Error;

/// Invalid allocator configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// A stack size of zero would never buffer an id.
    #[error("stack_size must be at least 1")]
    ZeroStackSize,

    /// The refill threshold must leave room below the stack size.
    #[error("critical_size ({critical_size}) must be below stack_size ({stack_size})")]
    CriticalNotBelowStack {
        /// Configured threshold.
        critical_size: usize,
        /// Configured stack size.
        stack_size: usize,
    },

    /// Waiters need a positive interval between checks.
    #[error("poll_interval must be non-zero")]
    ZeroPollInterval,

    /// Issued ids must stay reserved for some time.
    #[error("outstanding_lease must be non-zero")]
    ZeroOutstandingLease,
}

/// Errors returned by [`IdAllocator`](crate::IdAllocator) operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AllocError {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No id became available before the deadline.
    #[error("no id available after {waited:?}{}", refill_suffix(.last_error))]
    Timeout {
        /// How long the caller waited.
        waited: Duration,
        /// The most recent refill failure, if the last scan failed.
        last_error: Option<String>,
    },

    /// The allocator has been closed.
    #[error("id allocator is closed")]
    Closed,

    /// Every non-negative 64-bit id is taken or reserved.
    #[error("id space exhausted")]
    Exhausted,

    /// Borrowing a connection for a scan failed.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// The sorted-column read failed.
    #[error(transparent)]
    Store(#[from] pooldb_client::Error),
}

fn refill_suffix(last_error: &Option<String>) -> String {
    match last_error {
        Some(e) => format!(" (last refill error: {e})"),
        None => String::new(),
    }
}

impl AllocError {
    /// Whether the backing store could not be reached.
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        match self {
            Self::Pool(e) => e.is_unreachable(),
            Self::Store(e) => e.is_connectivity(),
            _ => false,
        }
    }

    /// Whether the error is transient and waiting again may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. }) || self.is_unreachable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_includes_last_error() {
        let err = AllocError::Timeout {
            waited: Duration::from_millis(5),
            last_error: Some("store unreachable".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("5ms"));
        assert!(msg.contains("store unreachable"));

        let err = AllocError::Timeout {
            waited: Duration::from_millis(5),
            last_error: None,
        };
        assert!(!err.to_string().contains("last refill error"));
    }

    #[test]
    fn test_classification() {
        let err = AllocError::Store(pooldb_client::Error::unreachable("db", "down"));
        assert!(err.is_unreachable());
        assert!(err.is_transient());

        assert!(!AllocError::Closed.is_transient());
        assert!(!AllocError::Exhausted.is_unreachable());
    }
}
