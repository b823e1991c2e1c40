//! # pooldb-pool
//!
//! Pools that sit between game logic and a persistent backing store.
//!
//! - [`Pool`]: a generic object pool driven by a [`Manager`] that defines what
//!   creating, activating and deactivating an item means.
//! - [`ConnectionPool`]: the pool specialised to backing-store connections.
//!   A connection is open while lent out and closed while idle.
//! - [`CommandRecycler`]: per-query-shape stacks of prepared commands so hot
//!   statements skip slot declaration on every call.
//!
//! Pools are explicitly constructed values. Cloning a pool clones a handle to
//! the same inventory, so several isolated pools can coexist in one process.
//!
//! ## Example
//!
//! ```rust,ignore
//! use pooldb_client::{ParamType, QueryShape, Value};
//! use pooldb_pool::{CommandRecycler, ConnectionPool};
//!
//! let pool = ConnectionPool::for_endpoint(connector, endpoint)
//!     .min_idle(2)
//!     .build()
//!     .await?;
//!
//! // Borrow a connection directly
//! let conn = pool.get().await?;
//! // Use connection...
//! pool.release(conn).await?;
//!
//! // Or run a recycled command; each execution borrows and returns a connection
//! let rename = CommandRecycler::new(
//!     pool.clone(),
//!     QueryShape::new("UPDATE guilds SET name = @name WHERE id = @id")
//!         .param("@name", ParamType::Text)
//!         .param("@id", ParamType::Int),
//! );
//! let affected = rename.execute(&[Value::from("Ravens"), Value::from(7)]).await?;
//!
//! let status = pool.status();
//! println!("in use: {} of {}", status.in_use, status.total);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod lifecycle;
pub mod pool;

// Configuration
pub use config::PoolConfig;

// Error types
pub use error::{CommandError, ConfigError, PoolError, TimeoutKind};

// Pool types
pub use pool::{Pool, PoolBuilder, PoolMetrics, PoolStatus, Pooled};

// Connections
pub use connection::{ConnectionManager, ConnectionPool, PooledConnection};

// Recycled commands
pub use command::{CommandRecycler, CommandRegistry, RecycledCommand, RentedCommand};

// Lifecycle management
pub use lifecycle::{Manager, SlotMetadata, SlotState};
