//! Generic object pool implementation.
//!
//! Items are created on demand, lent out through [`Pooled`] guards and
//! recycled for the lifetime of the pool. Every transition between idle and
//! active runs the [`Manager`]'s hooks, so the pool itself never needs to know
//! what kind of resource it holds.

use std::fmt;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use hashbrown::HashMap;
use parking_lot::Mutex;
use pooldb_client::instrumentation::span_names;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::Instrument;

use crate::config::PoolConfig;
use crate::error::{PoolError, TimeoutKind};
use crate::lifecycle::{Manager, SlotMetadata, SlotState};

/// Source of pool ids, used only to tell pools apart in logs and guards.
static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// A generic object pool.
///
/// The pool hands out items through [`Pooled`] guards. Acquiring reuses the
/// most recently returned idle item, or creates a new one when none is idle.
/// Returning runs the deactivate hook before the item becomes available
/// again, so two callers never observe the same item at once.
///
/// Cloning the pool yields another handle to the same inventory.
///
/// # Example
///
/// ```rust,ignore
/// let pool = Pool::builder(manager).min_idle(2).build().await?;
///
/// let item = pool.get().await?;
/// // Use item...
/// pool.release(item).await?;
/// ```
pub struct Pool<M: Manager> {
    inner: Arc<PoolInner<M>>,
}

pub(crate) struct PoolInner<M: Manager> {
    /// Pool id for logs and ownership checks.
    id: u64,

    /// Lifecycle hooks.
    manager: M,

    /// Pool configuration.
    config: PoolConfig,

    /// Idle items, most recently returned last.
    idle: Mutex<Vec<IdleSlot<M::Item>>>,

    /// State of every item the pool currently owns or has lent out.
    inventory: Mutex<HashMap<u64, SlotState>>,

    /// Capacity permits when `max_size` is set.
    permits: Option<Arc<Semaphore>>,

    /// Whether the pool is closed.
    closed: AtomicBool,

    /// Counter for generating slot ids.
    next_slot_id: AtomicU64,

    /// When the pool was created.
    created_at: Instant,

    /// Pool metrics.
    metrics: Mutex<PoolMetricsInner>,
}

struct IdleSlot<T> {
    item: T,
    meta: SlotMetadata,
    /// Returned without running the deactivate hook; it runs before reuse.
    dirty: bool,
}

/// Internal metrics tracking.
#[derive(Debug, Default)]
struct PoolMetricsInner {
    /// Total items created.
    items_created: u64,
    /// Total items disposed.
    items_disposed: u64,
    /// Total successful checkouts.
    checkouts_successful: u64,
    /// Total failed checkouts (timeouts, errors).
    checkouts_failed: u64,
    /// Total idle → active transitions.
    activations: u64,
    /// Total active → idle transitions.
    deactivations: u64,
    /// Total deactivate hook failures.
    deactivations_failed: u64,
}

impl<M: Manager> Pool<M> {
    /// Create a new pool builder.
    #[must_use]
    pub fn builder(manager: M) -> PoolBuilder<M> {
        PoolBuilder::new(manager)
    }

    /// Create a new pool with the given configuration.
    ///
    /// Creates `min_idle` items up front; any failure while doing so is
    /// returned and the pool is not built.
    pub async fn new(manager: M, config: PoolConfig) -> Result<Self, PoolError<M::Error>> {
        config.validate()?;

        let permits = config.max_size.map(|max| Arc::new(Semaphore::new(max)));
        let pool = Self {
            inner: Arc::new(PoolInner {
                id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
                manager,
                config,
                idle: Mutex::new(Vec::new()),
                inventory: Mutex::new(HashMap::new()),
                permits,
                closed: AtomicBool::new(false),
                next_slot_id: AtomicU64::new(1),
                created_at: Instant::now(),
                metrics: Mutex::new(PoolMetricsInner::default()),
            }),
        };

        for _ in 0..pool.inner.config.min_idle {
            let (item, meta) = pool.inner.construct().await?;
            pool.inner.register(meta.id, SlotState::Idle);
            pool.inner.push_idle(item, meta, false);
        }

        tracing::info!(
            pool = pool.inner.id,
            min_idle = pool.inner.config.min_idle,
            max_size = ?pool.inner.config.max_size,
            "pool created"
        );

        Ok(pool)
    }

    /// Acquire an item, waiting at most the configured `wait_timeout` for
    /// capacity.
    ///
    /// Reuses an idle item when one exists, otherwise creates a new one.
    /// If a lifecycle hook fails the item is discarded and the error is
    /// returned; the idle set is left untouched.
    pub async fn get(&self) -> Result<Pooled<M>, PoolError<M::Error>> {
        self.timeout_get(self.inner.config.wait_timeout).await
    }

    /// Acquire an item using a different capacity wait bound than the
    /// configured one.
    pub async fn timeout_get(
        &self,
        timeout: Option<Duration>,
    ) -> Result<Pooled<M>, PoolError<M::Error>> {
        let span = tracing::trace_span!(span_names::ACQUIRE, pool = self.inner.id);
        let result = self.acquire(timeout).instrument(span).await;

        let mut metrics = self.inner.metrics.lock();
        match &result {
            Ok(_) => metrics.checkouts_successful += 1,
            Err(_) => metrics.checkouts_failed += 1,
        }
        drop(metrics);

        result
    }

    async fn acquire(&self, timeout: Option<Duration>) -> Result<Pooled<M>, PoolError<M::Error>> {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }

        let permit = match &self.inner.permits {
            Some(permits) => {
                let permits = Arc::clone(permits);
                let deadline = timeout.map(|t| tokio::time::Instant::now() + t);
                Some(
                    apply_timeout(TimeoutKind::Wait, deadline, async move {
                        permits
                            .acquire_owned()
                            .await
                            .map_err(|_| PoolError::<M::Error>::Closed)
                    })
                    .await?,
                )
            }
            None => None,
        };

        let popped = self.inner.idle.lock().pop();
        let (item, meta) = match popped {
            Some(slot) => self.inner.revive(slot).await?,
            None => self.inner.create_active().await?,
        };

        tracing::trace!(slot = meta.id, activations = meta.activations, "item acquired");
        Ok(Pooled::new(item, meta, Arc::clone(&self.inner), permit))
    }

    /// Acquire an idle item without waiting and without creating one.
    ///
    /// Returns `None` when no item is idle or a bounded pool is at capacity.
    pub async fn try_get(&self) -> Result<Option<Pooled<M>>, PoolError<M::Error>> {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }

        let permit = match &self.inner.permits {
            Some(permits) => match Arc::clone(permits).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(TryAcquireError::NoPermits) => return Ok(None),
                Err(TryAcquireError::Closed) => return Err(PoolError::Closed),
            },
            None => None,
        };

        let popped = self.inner.idle.lock().pop();
        let Some(slot) = popped else {
            return Ok(None);
        };

        let result = self.inner.revive(slot).await;
        let mut metrics = self.inner.metrics.lock();
        match result {
            Ok((item, meta)) => {
                metrics.checkouts_successful += 1;
                drop(metrics);
                Ok(Some(Pooled::new(item, meta, Arc::clone(&self.inner), permit)))
            }
            Err(e) => {
                metrics.checkouts_failed += 1;
                Err(e)
            }
        }
    }

    /// Return an item to the pool.
    ///
    /// Runs the deactivate hook and then parks the item in the idle set. If
    /// deactivation fails the item is discarded and the error returned.
    ///
    /// Dropping a [`Pooled`] also returns it, in a background task; call this
    /// when the caller needs to know the item is idle again.
    pub async fn release(&self, mut obj: Pooled<M>) -> Result<(), PoolError<M::Error>> {
        if !Arc::ptr_eq(&obj.pool, &self.inner) {
            // dropping `obj` hands it back to the pool that owns it
            return Err(PoolError::ForeignItem { slot: obj.meta.id });
        }

        let permit = obj.permit.take();
        let Some(item) = obj.item.take() else {
            return Err(PoolError::DoubleRelease { slot: obj.meta.id });
        };
        let meta = obj.meta.clone();
        drop(obj);

        tracing::trace!(slot = meta.id, "releasing item");
        let result = self.inner.check_in(item, meta).await;
        drop(permit);
        result
    }

    /// Get the current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let available = self.inner.idle.lock().len();
        let inventory = self.inner.inventory.lock();
        let in_use = inventory
            .values()
            .filter(|state| **state == SlotState::Active)
            .count();

        PoolStatus {
            available,
            in_use,
            total: inventory.len(),
            max: self.inner.config.max_size,
        }
    }

    /// Get pool metrics.
    #[must_use]
    pub fn metrics(&self) -> PoolMetrics {
        let inner = self.inner.metrics.lock();
        PoolMetrics {
            items_created: inner.items_created,
            items_disposed: inner.items_disposed,
            checkouts_successful: inner.checkouts_successful,
            checkouts_failed: inner.checkouts_failed,
            activations: inner.activations,
            deactivations: inner.deactivations,
            deactivations_failed: inner.deactivations_failed,
            uptime: self.inner.created_at.elapsed(),
        }
    }

    /// Close the pool.
    ///
    /// Further acquires fail with [`PoolError::Closed`], every idle item is
    /// deactivated (if still dirty) and disposed, and items returned after
    /// this point are disposed instead of parked. Closing twice is a no-op.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(permits) = &self.inner.permits {
            permits.close();
        }

        let drained = std::mem::take(&mut *self.inner.idle.lock());
        let disposed = drained.len();
        for IdleSlot { item, meta, dirty } in drained {
            // parking a cancelled slot disposes it once the pool is closed
            let slot = meta.id;
            let mut guard = SlotGuard::new(&self.inner, item, meta, OnCancel::Park);
            if dirty {
                let result = self.inner.manager.deactivate(guard.item_mut()).await;
                if let Err(e) = result {
                    tracing::warn!(slot, error = %e, "deactivation failed during close");
                }
            }
            let (item, meta) = guard.into_inner();
            self.inner.discard(item, meta.id);
        }

        tracing::info!(pool = self.inner.id, disposed, "pool closed");
    }

    /// Check if the pool is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Get the pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Get the pool's lifecycle manager.
    #[must_use]
    pub fn manager(&self) -> &M {
        &self.inner.manager
    }
}

impl<M: Manager> Clone for Pool<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: Manager> fmt::Debug for Pool<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("id", &self.inner.id)
            .field("config", &self.inner.config)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<M: Manager> PoolInner<M> {
    /// Run `create` and `on_new`. Nothing is recorded unless both succeed.
    async fn construct(&self) -> Result<(M::Item, SlotMetadata), PoolError<M::Error>> {
        let deadline = self
            .config
            .create_timeout
            .map(|t| tokio::time::Instant::now() + t);
        let item = apply_timeout(TimeoutKind::Create, deadline, async {
            self.manager.create().await.map_err(PoolError::Backend)
        })
        .await?;

        let id = self.next_slot_id.fetch_add(1, Ordering::Relaxed);
        let mut guard = SlotGuard::new(self, item, SlotMetadata::new(id), OnCancel::Dispose);
        if let Err(e) = self.manager.on_new(guard.item_mut()).await {
            let (item, _) = guard.into_inner();
            self.manager.dispose(item);
            return Err(PoolError::Backend(e));
        }

        self.metrics.lock().items_created += 1;
        tracing::debug!(pool = self.id, slot = id, "pool item created");

        Ok(guard.into_inner())
    }

    async fn create_active(&self) -> Result<(M::Item, SlotMetadata), PoolError<M::Error>> {
        let (item, meta) = self.construct().await?;

        let mut guard = SlotGuard::new(self, item, meta, OnCancel::Discard);
        if let Err(e) = self.manager.activate(guard.item_mut()).await {
            let (item, meta) = guard.into_inner();
            tracing::warn!(slot = meta.id, error = %e, "activation of new item failed");
            self.discard(item, meta.id);
            return Err(PoolError::Backend(e));
        }

        let (item, mut meta) = guard.into_inner();
        meta.mark_activated();
        self.register(meta.id, SlotState::Active);
        self.metrics.lock().activations += 1;
        Ok((item, meta))
    }

    async fn revive(
        &self,
        slot: IdleSlot<M::Item>,
    ) -> Result<(M::Item, SlotMetadata), PoolError<M::Error>> {
        let IdleSlot { item, meta, dirty } = slot;
        let mut guard = SlotGuard::new(self, item, meta, OnCancel::Park);

        if dirty {
            if let Err(e) = self.manager.deactivate(guard.item_mut()).await {
                let (item, meta) = guard.into_inner();
                self.metrics.lock().deactivations_failed += 1;
                self.discard(item, meta.id);
                return Err(PoolError::Backend(e));
            }
            self.metrics.lock().deactivations += 1;
        }

        if let Err(e) = self.manager.activate(guard.item_mut()).await {
            let (item, meta) = guard.into_inner();
            tracing::warn!(slot = meta.id, error = %e, "activation failed, discarding item");
            self.discard(item, meta.id);
            return Err(PoolError::Backend(e));
        }

        let (item, mut meta) = guard.into_inner();
        meta.mark_activated();
        self.register(meta.id, SlotState::Active);
        self.metrics.lock().activations += 1;
        Ok((item, meta))
    }

    /// Deactivate a returned item and park it.
    async fn check_in(&self, item: M::Item, meta: SlotMetadata) -> Result<(), PoolError<M::Error>> {
        if let Err(e) = self.mark_idle(meta.id) {
            tracing::warn!(slot = meta.id, error = %e, "rejected item return");
            self.manager.dispose(item);
            return Err(e);
        }

        let mut guard = SlotGuard::new(self, item, meta, OnCancel::Park);
        let result = self.manager.deactivate(guard.item_mut()).await;
        let (item, meta) = guard.into_inner();
        match result {
            Ok(()) => {
                self.metrics.lock().deactivations += 1;
                self.push_idle(item, meta, false);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(slot = meta.id, error = %e, "deactivation failed, discarding item");
                self.metrics.lock().deactivations_failed += 1;
                self.discard(item, meta.id);
                Err(PoolError::Backend(e))
            }
        }
    }

    /// Park a returned item without deactivating it. Used when no runtime
    /// will run the hook; it runs before the next activation.
    fn check_in_dirty(&self, item: M::Item, meta: SlotMetadata) {
        if let Err(e) = self.mark_idle(meta.id) {
            tracing::warn!(slot = meta.id, error = %e, "rejected item return");
            self.manager.dispose(item);
            return;
        }
        self.push_idle(item, meta, true);
    }

    fn mark_idle(&self, slot: u64) -> Result<(), PoolError<M::Error>> {
        let mut inventory = self.inventory.lock();
        match inventory.get_mut(&slot) {
            Some(state) if *state == SlotState::Active => {
                *state = SlotState::Idle;
                Ok(())
            }
            Some(_) => Err(PoolError::DoubleRelease { slot }),
            None => Err(PoolError::ForeignItem { slot }),
        }
    }

    fn push_idle(&self, item: M::Item, meta: SlotMetadata, dirty: bool) {
        let mut idle = self.idle.lock();
        // checked under the idle lock so `close` cannot miss this item
        if self.closed.load(Ordering::SeqCst) {
            drop(idle);
            self.discard(item, meta.id);
            return;
        }
        idle.push(IdleSlot { item, meta, dirty });
    }

    fn register(&self, slot: u64, state: SlotState) {
        self.inventory.lock().insert(slot, state);
    }

    fn discard(&self, item: M::Item, slot: u64) {
        self.inventory.lock().remove(&slot);
        self.manager.dispose(item);
        self.metrics.lock().items_disposed += 1;
        tracing::debug!(pool = self.id, slot, "pool item disposed");
    }
}

async fn apply_timeout<T, E>(
    kind: TimeoutKind,
    deadline: Option<tokio::time::Instant>,
    future: impl Future<Output = Result<T, PoolError<E>>>,
) -> Result<T, PoolError<E>> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, future)
            .await
            .map_err(|_| PoolError::Timeout(kind))?,
        None => future.await,
    }
}

/// What happens to an item whose hook await was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnCancel {
    /// Not counted yet; hand it straight to `dispose`.
    Dispose,
    /// Counted but never registered; dispose it and record the disposal.
    Discard,
    /// Registered as idle; park it dirty so deactivation runs before reuse.
    Park,
}

/// Holds an item while one of the manager's hooks runs on it.
///
/// Acquire and release are awaited by callers that may give up at any point
/// (`tokio::time::timeout`, `select!`). If the future is dropped mid-hook the
/// guard still owns the item and settles it according to [`OnCancel`], so the
/// inventory never keeps a slot whose item is gone.
struct SlotGuard<'a, M: Manager> {
    pool: &'a PoolInner<M>,
    slot: Option<(M::Item, SlotMetadata)>,
    on_cancel: OnCancel,
}

impl<'a, M: Manager> SlotGuard<'a, M> {
    fn new(pool: &'a PoolInner<M>, item: M::Item, meta: SlotMetadata, on_cancel: OnCancel) -> Self {
        Self {
            pool,
            slot: Some((item, meta)),
            on_cancel,
        }
    }

    #[allow(clippy::expect_used)]
    fn item_mut(&mut self) -> &mut M::Item {
        &mut self.slot.as_mut().expect("guarded item present until taken").0
    }

    #[allow(clippy::expect_used)]
    fn into_inner(mut self) -> (M::Item, SlotMetadata) {
        self.slot.take().expect("guarded item present until taken")
    }
}

impl<M: Manager> Drop for SlotGuard<'_, M> {
    fn drop(&mut self) {
        let Some((item, meta)) = self.slot.take() else {
            return;
        };
        tracing::debug!(slot = meta.id, on_cancel = ?self.on_cancel, "hook abandoned mid-flight");
        match self.on_cancel {
            OnCancel::Dispose => self.pool.manager.dispose(item),
            OnCancel::Discard => self.pool.discard(item, meta.id),
            OnCancel::Park => self.pool.push_idle(item, meta, true),
        }
    }
}

/// A dropped [`Pooled`] on its way back to the pool.
///
/// Owned by the background task that deactivates it. If that task is dropped
/// before it runs, as happens to pending tasks when a runtime shuts down, the
/// item is parked dirty instead of being lost.
struct Returning<M: Manager> {
    pool: Arc<PoolInner<M>>,
    slot: Option<(M::Item, SlotMetadata)>,
}

impl<M: Manager> Returning<M> {
    async fn check_in(mut self) {
        let Some((item, meta)) = self.slot.take() else {
            return;
        };
        if let Err(e) = self.pool.check_in(item, meta).await {
            tracing::warn!(error = %e, "failed to return dropped item");
        }
    }
}

impl<M: Manager> Drop for Returning<M> {
    fn drop(&mut self) {
        if let Some((item, meta)) = self.slot.take() {
            tracing::debug!(slot = meta.id, "return task never ran, parking item dirty");
            self.pool.check_in_dirty(item, meta);
        }
    }
}

/// Builder for creating a pool.
///
/// # Example
///
/// ```rust,ignore
/// let pool = Pool::builder(manager)
///     .max_size(16)
///     .wait_timeout(Duration::from_secs(5))
///     .build()
///     .await?;
/// ```
pub struct PoolBuilder<M: Manager> {
    manager: M,
    pool_config: PoolConfig,
}

impl<M: Manager> PoolBuilder<M> {
    /// Create a new pool builder with default settings.
    pub fn new(manager: M) -> Self {
        Self {
            manager,
            pool_config: PoolConfig::default(),
        }
    }

    /// Set the pool configuration.
    #[must_use]
    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = config;
        self
    }

    /// Set the number of items created at build time.
    #[must_use]
    pub fn min_idle(mut self, count: usize) -> Self {
        self.pool_config.min_idle = count;
        self
    }

    /// Cap the number of items.
    #[must_use]
    pub fn max_size(mut self, count: usize) -> Self {
        self.pool_config.max_size = Some(count);
        self
    }

    /// Set how long an acquire may wait for capacity.
    #[must_use]
    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.pool_config.wait_timeout = Some(timeout);
        self
    }

    /// Set how long creating an item may take.
    #[must_use]
    pub fn create_timeout(mut self, timeout: Duration) -> Self {
        self.pool_config.create_timeout = Some(timeout);
        self
    }

    /// Build the pool.
    pub async fn build(self) -> Result<Pool<M>, PoolError<M::Error>> {
        Pool::new(self.manager, self.pool_config).await
    }
}

/// Status information about the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Number of idle items available.
    pub available: usize,
    /// Number of items currently lent out.
    pub in_use: usize,
    /// Total number of items the pool knows about.
    pub total: usize,
    /// Maximum allowed items, if bounded.
    pub max: Option<usize>,
}

impl PoolStatus {
    /// Calculate the utilization percentage.
    ///
    /// Measured against `max` for bounded pools and against `total` otherwise.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        let capacity = self.max.unwrap_or(self.total);
        if capacity == 0 {
            return 0.0;
        }
        (self.in_use as f64 / capacity as f64) * 100.0
    }

    /// Check if a bounded pool is at capacity. Unbounded pools never are.
    #[must_use]
    pub fn is_at_capacity(&self) -> bool {
        self.max.is_some_and(|max| self.total >= max)
    }
}

/// Metrics collected from the pool.
#[derive(Debug, Clone)]
pub struct PoolMetrics {
    /// Total items created since pool start.
    pub items_created: u64,
    /// Total items disposed since pool start.
    pub items_disposed: u64,
    /// Successful checkouts.
    pub checkouts_successful: u64,
    /// Failed checkouts (timeouts, pool closed, hook failures).
    pub checkouts_failed: u64,
    /// Idle → active transitions.
    pub activations: u64,
    /// Active → idle transitions.
    pub deactivations: u64,
    /// Deactivations that failed.
    pub deactivations_failed: u64,
    /// Time since pool creation.
    pub uptime: Duration,
}

impl PoolMetrics {
    /// Calculate checkout success rate (0.0 to 1.0).
    #[must_use]
    pub fn checkout_success_rate(&self) -> f64 {
        let total = self.checkouts_successful + self.checkouts_failed;
        if total == 0 {
            return 1.0;
        }
        self.checkouts_successful as f64 / total as f64
    }

    /// Calculate deactivation success rate (0.0 to 1.0).
    #[must_use]
    pub fn deactivation_success_rate(&self) -> f64 {
        let total = self.deactivations + self.deactivations_failed;
        if total == 0 {
            return 1.0;
        }
        self.deactivations as f64 / total as f64
    }
}

/// An item lent out by a [`Pool`].
///
/// When dropped, the item is automatically returned to its pool. Inside a
/// runtime the deactivate hook runs in a spawned task; outside one, or when
/// that task is dropped unrun during runtime shutdown, the item is parked
/// dirty and deactivated before its next activation.
/// Use [`detach()`](Pooled::detach) to take it out of the pool for good.
pub struct Pooled<M: Manager> {
    /// Always `Some` until the guard is released, detached or dropped.
    item: Option<M::Item>,
    /// Slot metadata.
    meta: SlotMetadata,
    /// Owning pool.
    pool: Arc<PoolInner<M>>,
    /// Capacity permit, for bounded pools.
    permit: Option<OwnedSemaphorePermit>,
}

impl<M: Manager> Pooled<M> {
    fn new(
        item: M::Item,
        meta: SlotMetadata,
        pool: Arc<PoolInner<M>>,
        permit: Option<OwnedSemaphorePermit>,
    ) -> Self {
        Self {
            item: Some(item),
            meta,
            pool,
            permit,
        }
    }

    /// Get the slot metadata.
    #[must_use]
    pub fn metadata(&self) -> &SlotMetadata {
        &self.meta
    }

    /// Detach the item from the pool.
    ///
    /// The pool forgets the slot and frees its capacity; the caller owns the
    /// item from now on and no hook runs for it again.
    #[allow(clippy::expect_used)]
    pub fn detach(mut self) -> M::Item {
        let item = self.item.take().expect("pooled item present until detached");
        self.pool.inventory.lock().remove(&self.meta.id);
        tracing::debug!(slot = self.meta.id, "item detached from pool");
        item
    }
}

impl<M: Manager> Deref for Pooled<M> {
    type Target = M::Item;

    #[allow(clippy::expect_used)]
    fn deref(&self) -> &M::Item {
        self.item.as_ref().expect("pooled item present until dropped")
    }
}

impl<M: Manager> DerefMut for Pooled<M> {
    #[allow(clippy::expect_used)]
    fn deref_mut(&mut self) -> &mut M::Item {
        self.item.as_mut().expect("pooled item present until dropped")
    }
}

impl<M: Manager> fmt::Debug for Pooled<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pooled")
            .field("pool", &self.pool.id)
            .field("meta", &self.meta)
            .finish()
    }
}

impl<M: Manager> Drop for Pooled<M> {
    fn drop(&mut self) {
        let Some(item) = self.item.take() else {
            return;
        };
        let meta = self.meta.clone();
        let pool = Arc::clone(&self.pool);
        let permit = self.permit.take();

        tracing::trace!(slot = meta.id, "returning dropped item to pool");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let returning = Returning {
                    pool,
                    slot: Some((item, meta)),
                };
                handle.spawn(async move {
                    returning.check_in().await;
                    drop(permit);
                });
            }
            Err(_) => {
                pool.check_in_dirty(item, meta);
                drop(permit);
            }
        }
    }
}
