//! # pooldb-ids
//!
//! Unique integer ids for rows of a backing-store table, found by scanning
//! the id column for gaps instead of relying on the store to generate them.
//!
//! An [`IdAllocator`] keeps a buffer of ids known to be free, hands out the
//! smallest first, and refills the buffer in the background with a gap scan
//! ([`scan`]) when it runs low. Waiting for a refill is bounded; on expiry the
//! caller gets [`AllocError::Timeout`] carrying the last refill failure.
//!
//! Only this allocator may create ids in its column; see the precondition on
//! [`allocator`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use pooldb_client::ColumnRef;
//! use pooldb_ids::IdAllocator;
//! use pooldb_pool::ConnectionPool;
//!
//! let pool = ConnectionPool::for_endpoint(connector, endpoint).build().await?;
//! let ids = IdAllocator::builder(pool, ColumnRef::new("guilds", "id")?)
//!     .stack_size(64)
//!     .critical_size(8)
//!     .build()?;
//!
//! let id = ids.get_next().await?;
//! if insert_guild(id).await.is_err() {
//!     ids.free_id(id);
//! }
//!
//! ids.close().await;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod allocator;
pub mod config;
pub mod error;
pub mod scan;

pub use allocator::{AllocatorBuilder, AllocatorHealth, IdAllocator};
pub use config::AllocatorConfig;
pub use error::{AllocError, ConfigError};
pub use scan::{GapScanner, ScanOutcome, scan_gaps};
