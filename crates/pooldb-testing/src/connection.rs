//! Connector and connection over [`MemoryStore`].

use std::sync::atomic::Ordering;

use async_trait::async_trait;
use futures_util::stream;
use pooldb_client::{ColumnRef, Connection, Connector, Endpoint, Error, IdStream, Result, Value};

use crate::store::MemoryStore;

/// Hands out [`MemoryConnection`]s to one [`MemoryStore`].
#[derive(Clone)]
pub struct MemoryConnector {
    store: MemoryStore,
}

impl MemoryConnector {
    pub(crate) fn new(store: MemoryStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Connection = MemoryConnection;

    async fn connect(&self, endpoint: &Endpoint) -> Result<MemoryConnection> {
        let inner = &self.store.inner;
        if inner.fail_connects.load(Ordering::SeqCst) {
            return Err(Error::unreachable(&endpoint.address, "connection refused"));
        }
        if inner.reject_credentials.load(Ordering::SeqCst) {
            let user = endpoint
                .credentials
                .as_ref()
                .map(|c| c.username.as_str())
                .unwrap_or("<none>");
            return Err(Error::Authentication(format!("login failed for '{user}'")));
        }

        inner.connects.fetch_add(1, Ordering::SeqCst);
        let id = inner.next_connection_id.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::trace!(connection_id = id, "memory connection created");

        Ok(MemoryConnection {
            store: self.store.clone(),
            id,
            open: false,
        })
    }
}

/// A connection handle to a [`MemoryStore`].
pub struct MemoryConnection {
    store: MemoryStore,
    id: u64,
    open: bool,
}

impl MemoryConnection {
    /// Handle id, unique per store.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn open(&mut self) -> Result<()> {
        if self.open {
            return Ok(());
        }
        if self.store.inner.fail_opens.load(Ordering::SeqCst) {
            return Err(Error::unreachable("memory://pooldb", "session open refused"));
        }
        self.open = true;
        self.store.inner.session_opened();
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            self.store.inner.session_closed();
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        if !self.open {
            return Err(Error::ConnectionClosed);
        }
        self.store.inner.executes.fetch_add(1, Ordering::SeqCst);
        self.store.inner.record(self.id, sql, params);
        Ok(1)
    }

    async fn sorted_ids(&mut self, column: &ColumnRef) -> Result<IdStream<'_>> {
        if !self.open {
            return Err(Error::ConnectionClosed);
        }
        let inner = &self.store.inner;
        inner.scans.fetch_add(1, Ordering::SeqCst);

        let delay = inner.scan_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if inner.fail_scans.load(Ordering::SeqCst) {
            return Err(Error::unreachable("memory://pooldb", "scan aborted"));
        }

        let ids = inner.snapshot(column);
        Ok(Box::pin(stream::iter(ids.into_iter().map(Ok))))
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        if self.open {
            self.store.inner.open_sessions.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
