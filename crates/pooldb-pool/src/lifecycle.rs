//! Item lifecycle: the hooks a pool drives and the metadata it keeps.

use std::time::Instant;

use async_trait::async_trait;

/// Defines how a pool creates, activates and deactivates its items.
///
/// The pool calls the hooks in a fixed order:
///
/// 1. [`create`](Self::create) then [`on_new`](Self::on_new), exactly once per
///    item, when an acquire finds no idle item;
/// 2. [`activate`](Self::activate) every time an item goes idle → active;
/// 3. [`deactivate`](Self::deactivate) every time an item goes active → idle;
/// 4. [`dispose`](Self::dispose) once, when the item leaves the pool for good.
///
/// An item whose hook fails is disposed and never reaches the idle set.
#[async_trait]
pub trait Manager: Send + Sync + 'static {
    /// The pooled item type.
    type Item: Send + 'static;

    /// Error returned by the hooks.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Construct a new item.
    async fn create(&self) -> Result<Self::Item, Self::Error>;

    /// Run once, right after construction.
    async fn on_new(&self, _item: &mut Self::Item) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Make an idle item usable.
    async fn activate(&self, item: &mut Self::Item) -> Result<(), Self::Error>;

    /// Return a used item to its idle condition.
    async fn deactivate(&self, item: &mut Self::Item) -> Result<(), Self::Error>;

    /// Release an item that is leaving the pool.
    fn dispose(&self, _item: Self::Item) {}
}

/// Lifecycle state of a pooled item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Owned by the pool.
    Idle,
    /// Lent out to a caller.
    Active,
}

/// Bookkeeping the pool keeps alongside each item.
#[derive(Debug, Clone)]
pub struct SlotMetadata {
    /// Pool-assigned slot id, unique within the pool.
    pub id: u64,
    /// When the item was created.
    pub created_at: Instant,
    /// When the item was last activated.
    pub last_activated: Option<Instant>,
    /// How many times the item has been activated.
    pub activations: u64,
}

impl SlotMetadata {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            created_at: Instant::now(),
            last_activated: None,
            activations: 0,
        }
    }

    pub(crate) fn mark_activated(&mut self) {
        self.last_activated = Some(Instant::now());
        self.activations += 1;
    }

    /// Time since the item was created.
    #[must_use]
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }
}
