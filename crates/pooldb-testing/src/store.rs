//! Shared in-memory store state.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use pooldb_client::{ColumnRef, Endpoint, Value};

use crate::connection::MemoryConnector;

/// Address reported by [`MemoryStore::endpoint`].
const MEMORY_ADDRESS: &str = "memory://pooldb";

/// An in-memory backing store.
///
/// Cloning yields another handle to the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    pub(crate) inner: Arc<StoreInner>,
}

#[derive(Default)]
pub(crate) struct StoreInner {
    tables: Mutex<HashMap<ColumnRef, BTreeSet<i64>>>,
    executed: Mutex<Vec<Executed>>,
    /// Statement text -> (column, parameter index) mirrored on execute.
    tracked_inserts: Mutex<HashMap<String, (ColumnRef, usize)>>,
    scan_delay: Mutex<Duration>,

    pub(crate) fail_connects: AtomicBool,
    pub(crate) reject_credentials: AtomicBool,
    pub(crate) fail_opens: AtomicBool,
    pub(crate) fail_scans: AtomicBool,

    pub(crate) next_connection_id: AtomicU64,
    pub(crate) connects: AtomicU64,
    pub(crate) opens: AtomicU64,
    pub(crate) closes: AtomicU64,
    pub(crate) executes: AtomicU64,
    pub(crate) scans: AtomicU64,
    pub(crate) open_sessions: AtomicUsize,
    pub(crate) peak_open_sessions: AtomicUsize,
}

/// A statement run against the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Executed {
    /// Connection that ran it.
    pub connection_id: u64,
    /// Statement text.
    pub sql: String,
    /// Bound values.
    pub params: Vec<Value>,
}

/// Counters collected by the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Connection handles created.
    pub connects: u64,
    /// Sessions opened.
    pub opens: u64,
    /// Sessions closed.
    pub closes: u64,
    /// Statements executed.
    pub executes: u64,
    /// Sorted-column reads issued.
    pub scans: u64,
    /// Sessions open right now.
    pub open_sessions: usize,
    /// Largest number of sessions ever open at once.
    pub peak_open_sessions: usize,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A connector handing out connections to this store.
    #[must_use]
    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector::new(self.clone())
    }

    /// An endpoint naming this store.
    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(MEMORY_ADDRESS).credentials("pooldb", "pooldb")
    }

    /// Insert ids into a column.
    pub fn insert(&self, column: &ColumnRef, ids: impl IntoIterator<Item = i64>) {
        self.inner
            .tables
            .lock()
            .entry(column.clone())
            .or_default()
            .extend(ids);
    }

    /// Whether a column contains `id`.
    #[must_use]
    pub fn contains(&self, column: &ColumnRef, id: i64) -> bool {
        self.inner
            .tables
            .lock()
            .get(column)
            .is_some_and(|ids| ids.contains(&id))
    }

    /// All ids in a column, ascending.
    #[must_use]
    pub fn ids(&self, column: &ColumnRef) -> Vec<i64> {
        self.inner
            .tables
            .lock()
            .get(column)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Mirror executions of `sql` into `column`, taking the id from the
    /// parameter at `param_index`.
    pub fn track_inserts(&self, sql: impl Into<String>, column: &ColumnRef, param_index: usize) {
        self.inner
            .tracked_inserts
            .lock()
            .insert(sql.into(), (column.clone(), param_index));
    }

    /// Every statement executed so far.
    #[must_use]
    pub fn executed(&self) -> Vec<Executed> {
        self.inner.executed.lock().clone()
    }

    /// Make new connection handles fail as unreachable.
    pub fn fail_connects(&self, fail: bool) {
        self.inner.fail_connects.store(fail, Ordering::SeqCst);
    }

    /// Make new connection handles fail authentication.
    pub fn reject_credentials(&self, reject: bool) {
        self.inner.reject_credentials.store(reject, Ordering::SeqCst);
    }

    /// Make session opens fail as unreachable.
    pub fn fail_opens(&self, fail: bool) {
        self.inner.fail_opens.store(fail, Ordering::SeqCst);
    }

    /// Make sorted-column reads fail as unreachable.
    pub fn fail_scans(&self, fail: bool) {
        self.inner.fail_scans.store(fail, Ordering::SeqCst);
    }

    /// Delay every sorted-column read by `delay`.
    pub fn set_scan_delay(&self, delay: Duration) {
        *self.inner.scan_delay.lock() = delay;
    }

    /// Snapshot of the store counters.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let inner = &self.inner;
        StoreStats {
            connects: inner.connects.load(Ordering::SeqCst),
            opens: inner.opens.load(Ordering::SeqCst),
            closes: inner.closes.load(Ordering::SeqCst),
            executes: inner.executes.load(Ordering::SeqCst),
            scans: inner.scans.load(Ordering::SeqCst),
            open_sessions: inner.open_sessions.load(Ordering::SeqCst),
            peak_open_sessions: inner.peak_open_sessions.load(Ordering::SeqCst),
        }
    }
}

impl StoreInner {
    pub(crate) fn scan_delay(&self) -> Duration {
        *self.scan_delay.lock()
    }

    pub(crate) fn snapshot(&self, column: &ColumnRef) -> Vec<i64> {
        self.tables
            .lock()
            .get(column)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub(crate) fn record(&self, connection_id: u64, sql: &str, params: &[Value]) {
        let tracked = self.tracked_inserts.lock().get(sql).cloned();
        if let Some((column, index)) = tracked {
            if let Some(id) = params.get(index).and_then(Value::as_int) {
                self.tables.lock().entry(column).or_default().insert(id);
            }
        }

        self.executed.lock().push(Executed {
            connection_id,
            sql: sql.to_string(),
            params: params.to_vec(),
        });
    }

    pub(crate) fn session_opened(&self) {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let now = self.open_sessions.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_open_sessions.fetch_max(now, Ordering::SeqCst);
    }

    pub(crate) fn session_closed(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}
