//! The id allocator.
//!
//! Free ids live in an in-memory stack kept sorted so the smallest is popped
//! first. When a pop leaves fewer than `critical_size` ids, or finds the stack
//! empty, a refill is started on a background task: it borrows a connection,
//! reads the column in ascending order and pushes the gaps it finds. Callers
//! that find the stack empty wait for the refill, up to a deadline.
//!
//! Ids that have been handed out but not yet seen in the column are tracked
//! as outstanding and treated as occupied by every scan, so a refill that
//! runs before callers persist their ids cannot hand the same id out again.
//! An outstanding id is forgotten once a scan observes it in the column, or
//! once it has been outstanding for longer than `outstanding_lease`. The
//! lease keeps ids that callers abandon from piling up: after it expires the
//! next scan finds them again.
//!
//! # Precondition
//!
//! Nothing else may insert ids into the column while the allocator is in
//! use. An external writer can take an id between the scan that found it and
//! the caller that persists it, and the allocator has no way to notice.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;
use pooldb_client::instrumentation::span_names;
use pooldb_client::{ColumnRef, Connection, Connector};
use pooldb_pool::ConnectionPool;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::config::AllocatorConfig;
use crate::error::AllocError;
use crate::scan::{ScanOutcome, scan_gaps};

/// Hands out unique ids for one integer column.
///
/// Cloning yields another handle to the same allocator.
pub struct IdAllocator<C: Connector> {
    inner: Arc<AllocatorInner<C>>,
}

struct AllocatorInner<C: Connector> {
    pool: ConnectionPool<C>,
    column: ColumnRef,
    config: AllocatorConfig,
    state: Mutex<State>,
    /// Signalled whenever ids land on the stack or a refill ends.
    arrived: Notify,
}

#[derive(Default)]
struct State {
    /// Free ids, descending; the smallest is last.
    free: Vec<i64>,
    /// Issued, not freed, not yet seen in the column; with the issue time.
    outstanding: HashMap<i64, tokio::time::Instant>,
    refilling: bool,
    refill_task: Option<JoinHandle<()>>,
    closed: bool,
    scans: u64,
    failed_scans: u64,
    last_error: Option<String>,
}

impl State {
    /// Forget outstanding ids issued at least `lease` ago.
    fn expire_outstanding(&mut self, lease: Duration) -> usize {
        let before = self.outstanding.len();
        self.outstanding.retain(|_, issued| issued.elapsed() < lease);
        before - self.outstanding.len()
    }

    fn push_free(&mut self, id: i64) {
        let pos = self.free.partition_point(|&x| x > id);
        if self.free.get(pos) != Some(&id) {
            self.free.insert(pos, id);
        }
    }
}

/// A snapshot of allocator health.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatorHealth {
    /// Ids waiting on the stack.
    pub free: usize,
    /// Ids issued and still reserved against rescans.
    pub outstanding: usize,
    /// Whether a refill is running.
    pub refilling: bool,
    /// Scans finished, successful or not.
    pub scans: u64,
    /// Scans that failed.
    pub failed_scans: u64,
    /// Error of the most recent scan, if it failed.
    pub last_error: Option<String>,
    /// Whether the allocator has been closed.
    pub closed: bool,
}

impl AllocatorHealth {
    /// Open, and the last scan (if any) succeeded.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        !self.closed && self.last_error.is_none()
    }
}

impl<C: Connector> IdAllocator<C> {
    /// Create an allocator for `column`, scanning through `pool`.
    ///
    /// No scan runs until the first id is requested.
    pub fn new(
        pool: ConnectionPool<C>,
        column: ColumnRef,
        config: AllocatorConfig,
    ) -> Result<Self, AllocError> {
        config.validate()?;

        tracing::info!(
            column = %column,
            stack_size = config.stack_size,
            critical_size = config.critical_threshold(),
            outstanding_lease_ms = config.outstanding_lease.as_millis() as u64,
            "id allocator created"
        );

        Ok(Self {
            inner: Arc::new(AllocatorInner {
                pool,
                column,
                config,
                state: Mutex::new(State::default()),
                arrived: Notify::new(),
            }),
        })
    }

    /// Create a builder for an allocator.
    #[must_use]
    pub fn builder(pool: ConnectionPool<C>, column: ColumnRef) -> AllocatorBuilder<C> {
        AllocatorBuilder {
            pool,
            column,
            config: AllocatorConfig::default(),
        }
    }

    /// Take the next free id, waiting at most the configured `wait_timeout`.
    pub async fn get_next(&self) -> Result<i64, AllocError> {
        self.get_next_within(self.inner.config.wait_timeout).await
    }

    /// Take the next free id, waiting at most `timeout` for a refill.
    ///
    /// On expiry the error carries the most recent refill failure, if any.
    pub async fn get_next_within(&self, timeout: Duration) -> Result<i64, AllocError> {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            // registered before checking so a push between check and wait
            // still wakes us
            let arrived = self.inner.arrived.notified();
            if let Some(id) = self.take()? {
                return Ok(id);
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                let last_error = self.inner.state.lock().last_error.clone();
                return Err(AllocError::Timeout {
                    waited: started.elapsed(),
                    last_error,
                });
            }

            let wake = deadline.min(now + self.inner.config.poll_interval);
            let _ = tokio::time::timeout_at(wake, arrived).await;
        }
    }

    /// Take the next free id if one is buffered, without waiting.
    ///
    /// Starts a refill when the stack runs low, like [`get_next`](Self::get_next).
    pub fn try_get_next(&self) -> Result<Option<i64>, AllocError> {
        self.take()
    }

    /// Hand back an id that was issued by this allocator and never used.
    ///
    /// Returns `false` (and does nothing) for ids this allocator did not
    /// issue, ids already freed, ids whose lease has been reclaimed by a
    /// refill, and after close.
    pub fn free_id(&self, id: i64) -> bool {
        let mut state = self.inner.state.lock();
        if state.closed || state.outstanding.remove(&id).is_none() {
            tracing::trace!(id, "ignoring free of unknown id");
            return false;
        }
        state.push_free(id);
        drop(state);

        tracing::trace!(id, "id freed");
        self.inner.arrived.notify_waiters();
        true
    }

    /// Start a background refill unless one is already running.
    ///
    /// Returns whether a refill was started. Nothing is started when the
    /// stack is already full, after close, or outside a tokio runtime.
    pub fn begin_refill(&self) -> bool {
        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!(column = %self.inner.column, "no runtime to run refill on");
            return false;
        };

        let mut state = self.inner.state.lock();
        if state.closed || state.refilling {
            return false;
        }
        let amount = self.inner.config.stack_size.saturating_sub(state.free.len());
        if amount == 0 {
            return false;
        }

        let expired = state.expire_outstanding(self.inner.config.outstanding_lease);
        if expired > 0 {
            tracing::debug!(column = %self.inner.column, expired, "outstanding id leases expired");
        }
        let reserved: HashSet<i64> = state
            .free
            .iter()
            .chain(state.outstanding.keys())
            .copied()
            .collect();
        state.refilling = true;

        let guard = RefillGuard {
            inner: Arc::clone(&self.inner),
        };
        let span = tracing::debug_span!(
            span_names::REFILL,
            column = %self.inner.column,
            amount
        );
        // spawned under the state lock so `close` always sees the latest task
        state.refill_task = Some(runtime.spawn(
            async move {
                let guard = guard;
                guard.inner.refill(amount, reserved).await;
            }
            .instrument(span),
        ));
        true
    }

    /// Current health snapshot.
    #[must_use]
    pub fn health(&self) -> AllocatorHealth {
        let state = self.inner.state.lock();
        AllocatorHealth {
            free: state.free.len(),
            outstanding: state.outstanding.len(),
            refilling: state.refilling,
            scans: state.scans,
            failed_scans: state.failed_scans,
            last_error: state.last_error.clone(),
            closed: state.closed,
        }
    }

    /// Shut the allocator down.
    ///
    /// Waits for a running refill to finish, then closes the connection
    /// pool. Later requests fail with [`AllocError::Closed`]. Closing twice
    /// is a no-op.
    pub async fn close(&self) {
        let task = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.refill_task.take()
        };
        self.inner.arrived.notify_waiters();

        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(column = %self.inner.column, error = %e, "refill task ended abnormally");
            }
        }
        self.inner.pool.close().await;

        tracing::info!(column = %self.inner.column, "id allocator closed");
    }

    /// The column ids are allocated for.
    #[must_use]
    pub fn column(&self) -> &ColumnRef {
        &self.inner.column
    }

    /// The allocator configuration.
    #[must_use]
    pub fn config(&self) -> &AllocatorConfig {
        &self.inner.config
    }

    /// Pop the smallest free id, starting a refill when the stack runs low.
    fn take(&self) -> Result<Option<i64>, AllocError> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return Err(AllocError::Closed);
        }

        let popped = state.free.pop();
        if let Some(id) = popped {
            state.outstanding.insert(id, tokio::time::Instant::now());
        }
        let low = state.free.len() < self.inner.config.critical_threshold();
        let start = popped.is_none() || low;
        drop(state);

        if start {
            self.begin_refill();
        }
        if let Some(id) = popped {
            tracing::trace!(id, "id issued");
        }
        Ok(popped)
    }
}

impl<C: Connector> Clone for IdAllocator<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector> fmt::Debug for IdAllocator<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdAllocator")
            .field("column", &self.inner.column)
            .field("config", &self.inner.config)
            .field("health", &self.health())
            .finish()
    }
}

impl<C: Connector> AllocatorInner<C> {
    async fn refill(&self, amount: usize, reserved: HashSet<i64>) {
        let started = Instant::now();
        tracing::debug!("refill started");

        let result = self.scan(amount, &reserved).await;

        let mut state = self.state.lock();
        state.scans += 1;
        match result {
            Ok(ScanOutcome { ids, seen_reserved }) => {
                for id in &seen_reserved {
                    state.outstanding.remove(id);
                    state.free.retain(|free| free != id);
                }
                let found = ids.len();
                for id in ids {
                    if !state.outstanding.contains_key(&id) {
                        state.push_free(id);
                    }
                }
                state.last_error = None;
                tracing::debug!(
                    found,
                    persisted = seen_reserved.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "refill finished"
                );
            }
            Err(e) => {
                state.failed_scans += 1;
                state.last_error = Some(e.to_string());
                tracing::warn!(error = %e, "refill failed");
            }
        }
    }

    /// Run one gap scan on a borrowed connection.
    async fn scan(&self, amount: usize, reserved: &HashSet<i64>) -> Result<ScanOutcome, AllocError> {
        let mut conn = self.pool.get().await?;
        let result = async {
            let ids = conn.sorted_ids(&self.column).await?;
            scan_gaps(ids, amount, reserved).await
        }
        .await;
        let released = self.pool.release(conn).await;

        let outcome = result?;
        released?;
        Ok(outcome)
    }
}

/// Clears the in-flight flag however the refill task ends.
struct RefillGuard<C: Connector> {
    inner: Arc<AllocatorInner<C>>,
}

impl<C: Connector> Drop for RefillGuard<C> {
    fn drop(&mut self) {
        self.inner.state.lock().refilling = false;
        self.inner.arrived.notify_waiters();
    }
}

/// Builder for an [`IdAllocator`].
///
/// # Example
///
/// ```rust,ignore
/// let ids = IdAllocator::builder(pool, ColumnRef::new("guilds", "id")?)
///     .stack_size(64)
///     .critical_size(8)
///     .build()?;
/// let id = ids.get_next().await?;
/// ```
pub struct AllocatorBuilder<C: Connector> {
    pool: ConnectionPool<C>,
    column: ColumnRef,
    config: AllocatorConfig,
}

impl<C: Connector> AllocatorBuilder<C> {
    /// Set the whole configuration.
    #[must_use]
    pub fn allocator_config(mut self, config: AllocatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the number of ids to keep buffered.
    #[must_use]
    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = size;
        self
    }

    /// Set the refill threshold.
    ///
    /// Left unset, it is a tenth of the stack size.
    #[must_use]
    pub fn critical_size(mut self, size: usize) -> Self {
        self.config.critical_size = Some(size);
        self
    }

    /// Set how long an issued id stays reserved.
    #[must_use]
    pub fn outstanding_lease(mut self, lease: Duration) -> Self {
        self.config.outstanding_lease = lease;
        self
    }

    /// Set the bound on waiting for an id.
    #[must_use]
    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.config.wait_timeout = timeout;
        self
    }

    /// Set the interval between checks while waiting.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Validate the configuration and build the allocator.
    pub fn build(self) -> Result<IdAllocator<C>, AllocError> {
        IdAllocator::new(self.pool, self.column, self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use pooldb_testing::{MemoryConnector, MemoryStore};

    fn column() -> ColumnRef {
        ColumnRef::new("guilds", "id").unwrap()
    }

    async fn allocator(store: &MemoryStore, stack: usize, critical: usize) -> IdAllocator<MemoryConnector> {
        let pool = ConnectionPool::for_endpoint(store.connector(), store.endpoint())
            .build()
            .await
            .unwrap();
        IdAllocator::builder(pool, column())
            .stack_size(stack)
            .critical_size(critical)
            .wait_timeout(Duration::from_secs(2))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_ids_come_lowest_first() {
        let store = MemoryStore::new();
        store.insert(&column(), [0, 1, 2, 5, 6, 9]);
        let ids = allocator(&store, 3, 0).await;

        assert_eq!(ids.get_next().await.unwrap(), 3);
        assert_eq!(ids.get_next().await.unwrap(), 4);
        assert_eq!(ids.get_next().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let store = MemoryStore::new();
        let pool = ConnectionPool::for_endpoint(store.connector(), store.endpoint())
            .build()
            .await
            .unwrap();
        let err = IdAllocator::builder(pool, column())
            .stack_size(0)
            .critical_size(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, AllocError::Config(ConfigError::ZeroStackSize)));
    }

    #[tokio::test]
    async fn test_outstanding_ids_not_reissued_by_rescan() {
        let store = MemoryStore::new();
        let ids = allocator(&store, 2, 0).await;

        // none of these are persisted, so every rescan sees an empty column
        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(ids.get_next().await.unwrap());
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(ids.health().outstanding, 6);
    }

    #[tokio::test]
    async fn test_persisted_ids_pruned_from_outstanding() {
        let store = MemoryStore::new();
        let ids = allocator(&store, 2, 0).await;

        let a = ids.get_next().await.unwrap();
        let b = ids.get_next().await.unwrap();
        store.insert(&column(), [a, b]);
        assert_eq!(ids.health().outstanding, 2);

        // the next pop finds the stack empty and rescans
        let c = ids.get_next().await.unwrap();
        assert_eq!(c, 2);
        let health = ids.health();
        assert_eq!(health.outstanding, 1);
        assert_eq!(health.scans, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_ids_reissued_after_lease() {
        let store = MemoryStore::new();
        let pool = ConnectionPool::for_endpoint(store.connector(), store.endpoint())
            .build()
            .await
            .unwrap();
        let ids = IdAllocator::builder(pool, column())
            .stack_size(4)
            .critical_size(0)
            .outstanding_lease(Duration::from_secs(30))
            .build()
            .unwrap();

        // never persisted, never freed
        for expected in 0..5 {
            assert_eq!(ids.get_next().await.unwrap(), expected);
        }
        tokio::time::advance(Duration::from_secs(31)).await;
        for expected in 5..8 {
            assert_eq!(ids.get_next().await.unwrap(), expected);
        }

        // this rescan no longer reserves 0..=4, but still reserves 5..=7
        assert_eq!(ids.get_next().await.unwrap(), 0);
        let health = ids.health();
        assert_eq!(health.outstanding, 4);
        assert_eq!(health.free, 3);
        assert!(!ids.free_id(4));
    }

    #[tokio::test]
    async fn test_stack_size_alone_builds() {
        let store = MemoryStore::new();
        let pool = ConnectionPool::for_endpoint(store.connector(), store.endpoint())
            .build()
            .await
            .unwrap();
        let ids = IdAllocator::builder(pool, column())
            .stack_size(4)
            .build()
            .unwrap();

        assert_eq!(ids.config().critical_threshold(), 0);
        assert_eq!(ids.get_next().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_free_id_reused_lowest_first() {
        let store = MemoryStore::new();
        let ids = allocator(&store, 4, 0).await;

        let a = ids.get_next().await.unwrap();
        let b = ids.get_next().await.unwrap();
        assert_eq!((a, b), (0, 1));

        assert!(ids.free_id(b));
        assert!(ids.free_id(a));
        assert!(!ids.free_id(a));
        assert!(!ids.free_id(1_000));

        assert_eq!(ids.get_next().await.unwrap(), 0);
        assert_eq!(ids.get_next().await.unwrap(), 1);
        assert_eq!(ids.get_next().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_begin_refill_is_single_flight() {
        let store = MemoryStore::new();
        store.set_scan_delay(Duration::from_millis(50));
        let ids = allocator(&store, 8, 0).await;

        assert!(ids.begin_refill());
        assert!(!ids.begin_refill());
        assert!(ids.health().refilling);

        assert_eq!(ids.get_next().await.unwrap(), 0);
        assert_eq!(store.stats().scans, 1);
    }

    #[tokio::test]
    async fn test_full_stack_skips_refill() {
        let store = MemoryStore::new();
        let ids = allocator(&store, 2, 0).await;

        let id = ids.get_next().await.unwrap();
        assert!(ids.free_id(id));
        tokio_test::assert_ok!(tokio::time::timeout(Duration::from_secs(1), async {
            while ids.health().refilling {
                tokio::task::yield_now().await;
            }
        })
        .await);
        assert_eq!(ids.health().free, 2);
        assert!(!ids.begin_refill());
    }

    #[tokio::test]
    async fn test_timeout_reports_last_refill_error() {
        let store = MemoryStore::new();
        store.fail_scans(true);
        let ids = allocator(&store, 4, 0).await;

        let err = ids.get_next_within(Duration::from_millis(100)).await.unwrap_err();
        match err {
            AllocError::Timeout { waited, last_error } => {
                assert!(waited >= Duration::from_millis(100));
                assert!(last_error.unwrap().contains("scan aborted"));
            }
            other => panic!("unexpected error: {other}"),
        }
        let health = ids.health();
        assert!(!health.is_healthy());
        assert!(health.failed_scans >= 1);

        store.fail_scans(false);
        assert_eq!(ids.get_next().await.unwrap(), 0);
        assert!(ids.health().is_healthy());
    }

    #[tokio::test]
    async fn test_try_get_next_does_not_wait() {
        let store = MemoryStore::new();
        store.set_scan_delay(Duration::from_millis(20));
        let ids = allocator(&store, 4, 0).await;

        assert_eq!(ids.try_get_next().unwrap(), None);
        assert!(ids.health().refilling);
        assert_eq!(ids.get_next().await.unwrap(), 0);
        assert_eq!(ids.try_get_next().unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_drains_refill() {
        let store = MemoryStore::new();
        store.set_scan_delay(Duration::from_millis(30));
        let ids = allocator(&store, 4, 0).await;

        assert!(ids.begin_refill());
        ids.close().await;
        ids.close().await;

        let health = ids.health();
        assert!(health.closed);
        assert!(!health.refilling);
        assert_eq!(store.stats().scans, 1);
        assert_eq!(store.stats().open_sessions, 0);

        assert!(matches!(ids.get_next().await, Err(AllocError::Closed)));
        assert!(!ids.begin_refill());
        assert!(!ids.free_id(0));
    }
}
