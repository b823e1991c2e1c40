//! Connection pool: the object pool specialised to backing-store connections.
//!
//! A pooled connection holds one live handle. The handle is created once; its
//! logical session is opened on every acquire and closed on every release, so
//! two callers never share a session on the same handle.

use async_trait::async_trait;
use pooldb_client::{Connection, Connector, Endpoint, Error};

use crate::lifecycle::Manager;
use crate::pool::{Pool, PoolBuilder, Pooled};

/// A pool of backing-store connections.
pub type ConnectionPool<C> = Pool<ConnectionManager<C>>;

/// A connection lent out by a [`ConnectionPool`].
pub type PooledConnection<C> = Pooled<ConnectionManager<C>>;

/// Lifecycle hooks for backing-store connections.
///
/// - create: connect to the endpoint
/// - activate: open a session if none is open
/// - deactivate: close the session, keeping the handle
#[derive(Debug)]
pub struct ConnectionManager<C> {
    connector: C,
    endpoint: Endpoint,
}

impl<C: Connector> ConnectionManager<C> {
    /// Create a manager connecting to `endpoint` through `connector`.
    pub fn new(connector: C, endpoint: Endpoint) -> Self {
        Self {
            connector,
            endpoint,
        }
    }

    /// The endpoint connections are made to.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

#[async_trait]
impl<C: Connector> Manager for ConnectionManager<C> {
    type Item = C::Connection;
    type Error = Error;

    async fn create(&self) -> Result<C::Connection, Error> {
        tracing::debug!(address = %self.endpoint.address, "opening connection handle");
        self.connector.connect(&self.endpoint).await
    }

    async fn activate(&self, conn: &mut C::Connection) -> Result<(), Error> {
        if !conn.is_open() {
            conn.open().await?;
        }
        Ok(())
    }

    async fn deactivate(&self, conn: &mut C::Connection) -> Result<(), Error> {
        conn.close().await
    }
}

impl<C: Connector> Pool<ConnectionManager<C>> {
    /// Create a builder for a connection pool.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let pool = ConnectionPool::for_endpoint(connector, Endpoint::new("db:5432"))
    ///     .min_idle(2)
    ///     .build()
    ///     .await?;
    /// ```
    #[must_use]
    pub fn for_endpoint(connector: C, endpoint: Endpoint) -> PoolBuilder<ConnectionManager<C>> {
        PoolBuilder::new(ConnectionManager::new(connector, endpoint))
    }

    /// The endpoint this pool connects to.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        self.manager().endpoint()
    }
}
