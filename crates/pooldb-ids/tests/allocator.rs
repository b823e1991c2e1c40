//! Id allocator tests against the in-memory store.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::HashSet;
use std::time::Duration;

use pooldb_client::{ColumnRef, ParamType, QueryShape, Value};
use pooldb_ids::{AllocError, IdAllocator};
use pooldb_pool::{CommandRecycler, ConnectionPool};
use pooldb_testing::{MemoryConnector, MemoryStore, init_tracing};

const INSERT_SQL: &str = "INSERT INTO players (id, name) VALUES (@id, @name)";

fn column() -> ColumnRef {
    ColumnRef::new("players", "id").unwrap()
}

async fn pool(store: &MemoryStore) -> ConnectionPool<MemoryConnector> {
    ConnectionPool::for_endpoint(store.connector(), store.endpoint())
        .build()
        .await
        .unwrap()
}

// =============================================================================
// Uniqueness
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_get_distinct_ids() {
    init_tracing();
    let store = MemoryStore::new();
    store.insert(&column(), [0, 1, 2, 5, 6, 9]);
    let ids = IdAllocator::builder(pool(&store).await, column())
        .stack_size(8)
        .critical_size(2)
        .build()
        .unwrap();

    let mut tasks = Vec::new();
    for _ in 0..50 {
        let ids = ids.clone();
        tasks.push(tokio::spawn(async move { ids.get_next().await.unwrap() }));
    }

    let mut issued = HashSet::new();
    for task in tasks {
        let id = task.await.unwrap();
        assert!(!store.contains(&column(), id), "issued existing id {id}");
        assert!(issued.insert(id), "issued {id} twice");
    }
    assert_eq!(issued.len(), 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_persisting_callers_keep_the_column_dense() {
    let store = MemoryStore::new();
    store.track_inserts(INSERT_SQL, &column(), 0);
    let pool = pool(&store).await;
    let ids = IdAllocator::builder(pool.clone(), column())
        .stack_size(4)
        .critical_size(1)
        .build()
        .unwrap();
    let insert = CommandRecycler::new(
        pool,
        QueryShape::new(INSERT_SQL)
            .param("@id", ParamType::Int)
            .param("@name", ParamType::Text),
    );

    let mut tasks = Vec::new();
    for worker in 0..5 {
        let ids = ids.clone();
        let insert = insert.clone();
        tasks.push(tokio::spawn(async move {
            for n in 0..8 {
                let id = ids.get_next().await.unwrap();
                insert
                    .execute(&[Value::from(id), Value::from(format!("p{worker}-{n}"))])
                    .await
                    .unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let stored = store.ids(&column());
    assert_eq!(stored, (0..40).collect::<Vec<i64>>());
    assert_eq!(store.stats().executes, 40);
}

#[tokio::test]
async fn test_gaps_left_by_deletes_are_reused() {
    let store = MemoryStore::new();
    store.insert(&column(), (0..10).filter(|id| id % 3 != 0));
    let ids = IdAllocator::builder(pool(&store).await, column())
        .stack_size(5)
        .critical_size(0)
        .build()
        .unwrap();

    let mut got = Vec::new();
    for _ in 0..5 {
        got.push(ids.get_next().await.unwrap());
    }
    assert_eq!(got, vec![0, 3, 6, 9, 10]);
}

// =============================================================================
// Refill behaviour
// =============================================================================

#[tokio::test]
async fn test_critical_size_refills_before_empty() {
    let store = MemoryStore::new();
    store.set_scan_delay(Duration::from_millis(5));
    let ids = IdAllocator::builder(pool(&store).await, column())
        .stack_size(4)
        .critical_size(2)
        .build()
        .unwrap();

    assert_eq!(ids.get_next().await.unwrap(), 0);
    assert_eq!(ids.get_next().await.unwrap(), 1);
    // two left, nothing started yet
    assert_eq!(store.stats().scans, 1);

    assert_eq!(ids.get_next().await.unwrap(), 2);
    tokio::time::timeout(Duration::from_secs(1), async {
        while ids.health().scans < 2 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(ids.health().free, 4);
    assert_eq!(ids.get_next().await.unwrap(), 3);
    assert_eq!(ids.get_next().await.unwrap(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_ids_do_not_accumulate() {
    let store = MemoryStore::new();
    let ids = IdAllocator::builder(pool(&store).await, column())
        .stack_size(4)
        .critical_size(0)
        .outstanding_lease(Duration::from_secs(1))
        .build()
        .unwrap();

    // a caller that takes ids and never persists or frees them
    let mut highest = 0;
    for _ in 0..1000 {
        highest = highest.max(ids.get_next().await.unwrap());
        tokio::time::advance(Duration::from_millis(10)).await;
    }

    let health = ids.health();
    assert!(health.outstanding <= 110, "{health:?}");
    assert!(highest < 120, "ids climbed to {highest}");
}

#[tokio::test]
async fn test_unreachable_store_times_out_then_recovers() {
    let store = MemoryStore::new();
    store.fail_connects(true);
    let ids = IdAllocator::builder(pool(&store).await, column())
        .stack_size(4)
        .critical_size(0)
        .wait_timeout(Duration::from_millis(50))
        .build()
        .unwrap();

    let err = ids.get_next().await.unwrap_err();
    assert!(err.is_transient());
    match err {
        AllocError::Timeout { last_error, .. } => {
            assert!(last_error.unwrap().contains("unreachable"));
        }
        other => panic!("expected timeout, got {other}"),
    }

    store.fail_connects(false);
    assert_eq!(ids.get_next().await.unwrap(), 0);
}

#[tokio::test]
async fn test_close_releases_connections() {
    let store = MemoryStore::new();
    let pool = pool(&store).await;
    let ids = IdAllocator::builder(pool.clone(), column())
        .stack_size(4)
        .critical_size(0)
        .build()
        .unwrap();

    ids.get_next().await.unwrap();
    ids.close().await;

    assert!(pool.is_closed());
    assert_eq!(pool.status().total, 0);
    assert_eq!(store.stats().open_sessions, 0);
    assert!(matches!(ids.try_get_next(), Err(AllocError::Closed)));
}
