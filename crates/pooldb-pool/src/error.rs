//! Pool error types.

use std::fmt;

use thiserror::Error;

/// Which bounded wait expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    /// Waiting for capacity in a bounded pool.
    Wait,
    /// Constructing a new item.
    Create,
}

impl fmt::Display for TimeoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wait => f.write_str("pool capacity"),
            Self::Create => f.write_str("item creation"),
        }
    }
}

/// Invalid pool configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// `max_size` of zero would make every acquire wait forever.
    #[error("max_size must be at least 1")]
    ZeroMaxSize,

    /// More items requested at warm-up than the pool may hold.
    #[error("min_idle ({min_idle}) exceeds max_size ({max_size})")]
    MinIdleAboveMax {
        /// Requested warm-up count.
        min_idle: usize,
        /// Configured bound.
        max_size: usize,
    },
}

/// Errors returned by [`Pool`](crate::Pool) operations.
///
/// `E` is the error type of the pool's [`Manager`](crate::Manager).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError<E = pooldb_client::Error> {
    /// A lifecycle hook failed. The affected item has been discarded.
    #[error("backend error: {0}")]
    Backend(#[source] E),

    /// A bounded wait expired.
    #[error("timed out waiting for {0}")]
    Timeout(TimeoutKind),

    /// The pool has been closed.
    #[error("pool is closed")]
    Closed,

    /// The pool already holds this slot as idle.
    #[error("slot {slot} released twice")]
    DoubleRelease {
        /// Slot id.
        slot: u64,
    },

    /// The item was not lent out by this pool.
    #[error("slot {slot} does not belong to this pool")]
    ForeignItem {
        /// Slot id.
        slot: u64,
    },

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PoolError<pooldb_client::Error> {
    /// Whether the backing store could not be reached or refused the
    /// credentials.
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Backend(e) if e.is_connectivity())
    }
}

/// Errors returned by recycled command execution.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CommandError {
    /// Borrowing or returning a connection failed.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// Binding or running the statement failed.
    #[error(transparent)]
    Store(#[from] pooldb_client::Error),
}

impl CommandError {
    /// Whether the backing store could not be reached.
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        match self {
            Self::Pool(e) => e.is_unreachable(),
            Self::Store(e) => e.is_connectivity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_unreachable() {
        let err: PoolError = PoolError::Backend(pooldb_client::Error::unreachable("db", "down"));
        assert!(err.is_unreachable());

        let err: PoolError = PoolError::Backend(pooldb_client::Error::Query("bad".into()));
        assert!(!err.is_unreachable());
        assert!(!PoolError::<pooldb_client::Error>::Closed.is_unreachable());
    }

    #[test]
    fn test_display() {
        let err: PoolError = PoolError::Timeout(TimeoutKind::Wait);
        assert_eq!(err.to_string(), "timed out waiting for pool capacity");

        let err: PoolError = ConfigError::ZeroMaxSize.into();
        assert_eq!(err.to_string(), "max_size must be at least 1");
    }
}
