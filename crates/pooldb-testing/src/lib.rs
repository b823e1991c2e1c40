//! # pooldb-testing
//!
//! Test infrastructure for pooldb.
//!
//! [`MemoryStore`] is an in-memory backing store that implements the
//! [`pooldb_client::Connector`] and [`pooldb_client::Connection`] traits. It
//! counts every session and statement, tracks how many sessions are open at
//! once, and can inject connect, authentication and scan failures or scan
//! latency.
//!
//! ```rust,ignore
//! use pooldb_testing::MemoryStore;
//!
//! let store = MemoryStore::new();
//! store.insert(&column, [0, 1, 2, 5, 6, 9]);
//! let pool = ConnectionPool::for_endpoint(store.connector(), store.endpoint()).build().await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

mod connection;
mod store;

pub use connection::{MemoryConnection, MemoryConnector};
pub use store::{Executed, MemoryStore, StoreStats};

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Honours `RUST_LOG`; safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
