//! Recycled commands.
//!
//! Declaring a statement's text and parameter slots is the expensive part of
//! preparing it, and for any one call site the shape never changes. A
//! [`CommandRecycler`] keeps a small stack of prepared commands for a single
//! [`QueryShape`]; renting pops one (or prepares one when the stack is empty),
//! each execution only rebinds values into the existing slots, and returning
//! pushes it back.
//!
//! Commands are never shared: two concurrent executions of the same shape use
//! two different rented instances.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use parking_lot::Mutex;
use pooldb_client::instrumentation::{SanitizationConfig, execute_span};
use pooldb_client::{Connection, Connector, Error, QueryShape, Value};
use smallvec::SmallVec;
use tracing::Instrument;

use crate::connection::{ConnectionPool, PooledConnection};
use crate::error::CommandError;

/// Initial capacity of each recycler's free stack.
const INITIAL_FREE_CAPACITY: usize = 2;

/// A prepared command bound to one query shape.
#[derive(Debug)]
pub struct RecycledCommand {
    id: u64,
    shape: Arc<QueryShape>,
    /// One entry per declared slot, rebound on every execution.
    bound: SmallVec<[Value; 4]>,
}

impl RecycledCommand {
    fn prepare(id: u64, shape: Arc<QueryShape>) -> Self {
        let bound = SmallVec::from_elem(Value::Null, shape.params().len());
        Self { id, shape, bound }
    }

    /// Instance id, unique within its recycler.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The shape this command was prepared for.
    #[must_use]
    pub fn shape(&self) -> &QueryShape {
        &self.shape
    }

    /// Values bound by the last execution.
    #[must_use]
    pub fn bound(&self) -> &[Value] {
        &self.bound
    }

    fn bind(&mut self, values: &[Value]) -> Result<(), Error> {
        self.shape.check(values)?;
        for (slot, value) in self.bound.iter_mut().zip(values) {
            slot.clone_from(value);
        }
        Ok(())
    }

    fn clear(&mut self) {
        for slot in &mut self.bound {
            *slot = Value::Null;
        }
    }

    async fn run<T: Connection>(
        &self,
        conn: &mut T,
        sanitization: &SanitizationConfig,
    ) -> Result<u64, Error> {
        let span = execute_span(self.shape.sql(), sanitization);
        let affected = conn
            .execute(self.shape.sql(), &self.bound)
            .instrument(span.clone())
            .await?;
        span.record("db.rows_affected", affected);
        tracing::debug!(parent: &span, command = self.id, affected, "command executed");
        Ok(affected)
    }
}

/// A per-shape stack of prepared commands over a connection pool.
///
/// Cloning yields another handle to the same stack.
pub struct CommandRecycler<C: Connector> {
    inner: Arc<RecyclerInner<C>>,
}

struct RecyclerInner<C: Connector> {
    shape: Arc<QueryShape>,
    pool: ConnectionPool<C>,
    free: Mutex<Vec<RecycledCommand>>,
    created: AtomicU64,
    sanitization: SanitizationConfig,
}

impl<C: Connector> CommandRecycler<C> {
    /// Create a recycler for `shape`, executing on connections from `pool`.
    pub fn new(pool: ConnectionPool<C>, shape: QueryShape) -> Self {
        Self {
            inner: Arc::new(RecyclerInner {
                shape: Arc::new(shape),
                pool,
                free: Mutex::new(Vec::with_capacity(INITIAL_FREE_CAPACITY)),
                created: AtomicU64::new(0),
                sanitization: SanitizationConfig::default(),
            }),
        }
    }

    /// Rent a command: pop a free one or prepare a new one.
    #[must_use]
    pub fn rent(&self) -> RentedCommand<C> {
        let popped = self.inner.free.lock().pop();
        let command = popped.unwrap_or_else(|| self.inner.prepare());
        RentedCommand {
            command: Some(command),
            recycler: Arc::clone(&self.inner),
        }
    }

    /// Return a rented command to its stack.
    ///
    /// Equivalent to dropping it.
    pub fn give_back(&self, command: RentedCommand<C>) {
        drop(command);
    }

    /// Rent a command, execute it once, and return it.
    pub async fn execute(&self, params: &[Value]) -> Result<u64, CommandError> {
        let mut command = self.rent();
        command.execute(params).await
    }

    /// How many command objects this recycler has ever prepared.
    #[must_use]
    pub fn created(&self) -> u64 {
        self.inner.created.load(Ordering::Relaxed)
    }

    /// How many prepared commands are waiting on the free stack.
    #[must_use]
    pub fn free_len(&self) -> usize {
        self.inner.free.lock().len()
    }

    /// The shape this recycler prepares.
    #[must_use]
    pub fn shape(&self) -> &QueryShape {
        &self.inner.shape
    }

    /// The pool executions borrow connections from.
    #[must_use]
    pub fn pool(&self) -> &ConnectionPool<C> {
        &self.inner.pool
    }
}

impl<C: Connector> Clone for CommandRecycler<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector> fmt::Debug for CommandRecycler<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRecycler")
            .field("sql", &self.inner.shape.sql())
            .field("created", &self.created())
            .field("free", &self.free_len())
            .finish()
    }
}

impl<C: Connector> RecyclerInner<C> {
    fn prepare(&self) -> RecycledCommand {
        let id = self.created.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::trace!(command = id, sql = %self.shape.sql(), "preparing command");
        RecycledCommand::prepare(id, Arc::clone(&self.shape))
    }
}

/// A command rented from a [`CommandRecycler`].
///
/// Returned to the recycler's free stack when dropped, whether or not its
/// executions succeeded.
pub struct RentedCommand<C: Connector> {
    /// Always `Some` until dropped.
    command: Option<RecycledCommand>,
    recycler: Arc<RecyclerInner<C>>,
}

impl<C: Connector> RentedCommand<C> {
    /// The rented command.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn command(&self) -> &RecycledCommand {
        self.command
            .as_ref()
            .expect("rented command present until returned")
    }

    /// Bind `params` and execute on a connection borrowed from the pool for
    /// this execution only.
    ///
    /// Parameters are checked before any connection is borrowed. The
    /// connection is released whether or not the statement succeeds.
    #[allow(clippy::expect_used)]
    pub async fn execute(&mut self, params: &[Value]) -> Result<u64, CommandError> {
        let Self { command, recycler } = self;
        let command = command
            .as_mut()
            .expect("rented command present until returned");
        command.bind(params)?;

        let mut conn = recycler.pool.get().await?;
        let result = command.run(&mut *conn, &recycler.sanitization).await;
        let released = recycler.pool.release(conn).await;

        let affected = result?;
        released?;
        Ok(affected)
    }

    /// Bind `params` and execute on a connection the caller already holds.
    #[allow(clippy::expect_used)]
    pub async fn execute_on(
        &mut self,
        conn: &mut PooledConnection<C>,
        params: &[Value],
    ) -> Result<u64, CommandError> {
        let Self { command, recycler } = self;
        let command = command
            .as_mut()
            .expect("rented command present until returned");
        command.bind(params)?;
        Ok(command.run(&mut **conn, &recycler.sanitization).await?)
    }
}

impl<C: Connector> fmt::Debug for RentedCommand<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RentedCommand")
            .field("command", &self.command)
            .finish()
    }
}

impl<C: Connector> Drop for RentedCommand<C> {
    fn drop(&mut self) {
        if let Some(mut command) = self.command.take() {
            command.clear();
            tracing::trace!(command = command.id, "returning command");
            self.recycler.free.lock().push(command);
        }
    }
}

/// Recyclers keyed by query shape, created on first use.
pub struct CommandRegistry<C: Connector> {
    pool: ConnectionPool<C>,
    recyclers: Mutex<HashMap<QueryShape, CommandRecycler<C>>>,
}

impl<C: Connector> CommandRegistry<C> {
    /// Create an empty registry over `pool`.
    pub fn new(pool: ConnectionPool<C>) -> Self {
        Self {
            pool,
            recyclers: Mutex::new(HashMap::new()),
        }
    }

    /// The recycler for `shape`, creating it if needed.
    pub fn recycler(&self, shape: &QueryShape) -> CommandRecycler<C> {
        let mut recyclers = self.recyclers.lock();
        if let Some(recycler) = recyclers.get(shape) {
            return recycler.clone();
        }
        let recycler = CommandRecycler::new(self.pool.clone(), shape.clone());
        recyclers.insert(shape.clone(), recycler.clone());
        recycler
    }

    /// Execute `shape` once with `params` through its recycler.
    pub async fn execute(&self, shape: &QueryShape, params: &[Value]) -> Result<u64, CommandError> {
        self.recycler(shape).execute(params).await
    }

    /// Number of distinct shapes seen.
    #[must_use]
    pub fn len(&self) -> usize {
        self.recyclers.lock().len()
    }

    /// Whether no shape has been seen yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recyclers.lock().is_empty()
    }
}
