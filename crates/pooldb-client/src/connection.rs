//! Connection and connector traits.

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::column::ColumnRef;
use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::value::Value;

/// Ascending stream of identifier values read from a column.
pub type IdStream<'a> = Pin<Box<dyn Stream<Item = Result<i64>> + Send + 'a>>;

/// A handle to one backing-store connection.
///
/// The handle outlives its logical session: [`close`](Connection::close)
/// ends the session without destroying the handle, and
/// [`open`](Connection::open) starts a fresh one on the same handle.
#[async_trait]
pub trait Connection: Send + 'static {
    /// Start a logical session. Opening an already open session is a no-op.
    async fn open(&mut self) -> Result<()>;

    /// End the logical session. Closing a closed session is a no-op.
    async fn close(&mut self) -> Result<()>;

    /// Whether a session is currently open.
    fn is_open(&self) -> bool;

    /// Run a parameterized non-reading statement, returning the number of
    /// affected rows.
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Stream every value of `column` in ascending order.
    ///
    /// The stream may be dropped early; implementations must tolerate
    /// partial consumption.
    async fn sorted_ids(&mut self, column: &ColumnRef) -> Result<IdStream<'_>>;
}

/// Factory for [`Connection`] handles.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The connection type produced.
    type Connection: Connection;

    /// Create a handle to `endpoint`.
    ///
    /// Failure to reach the store must be reported as
    /// [`Error::Unreachable`](crate::Error::Unreachable) or
    /// [`Error::Authentication`](crate::Error::Authentication).
    async fn connect(&self, endpoint: &Endpoint) -> Result<Self::Connection>;
}
