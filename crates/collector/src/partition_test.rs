use super::*;
use crate::record::{AccessLogRecord, SlowQueryRecord};
use crate::store::StoreWriter;
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Default)]
struct MockStore {
    existing: Vec<String>,
    created: Mutex<Vec<String>>,
    inserts: AtomicUsize,
    failures_left: AtomicUsize,
}

#[async_trait]
impl LogStore for MockStore {
    async fn existing_tables(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .existing
            .iter()
            .filter(|t| t.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn create_partition(&self, _kind: RecordKind, table: &str) -> Result<(), StoreError> {
        // Widen the race window for concurrent first writes
        tokio::time::sleep(Duration::from_millis(20)).await;

        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::InvalidTable(format!("{table} (injected)")));
        }

        let mut created = self.created.lock().unwrap();
        if created.iter().any(|t| t == table) {
            panic!("table {table} already exists");
        }
        created.push(table.to_string());
        Ok(())
    }

    async fn insert(&self, table: &str, _record: &ParsedRecord) -> Result<(), StoreError> {
        let exists = self.existing.iter().any(|t| t == table)
            || self.created.lock().unwrap().iter().any(|t| t == table);
        if !exists {
            return Err(StoreError::InvalidTable(format!("{table} does not exist")));
        }
        self.inserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn access(time: &str) -> ParsedRecord {
    ParsedRecord::Access(AccessLogRecord {
        time: time.to_string(),
        host: String::new(),
        client_ip: String::new(),
        request_uri: String::new(),
        request_query: String::new(),
        request_version: String::new(),
        request_method: String::new(),
        status: "200".into(),
        size: "0".into(),
        upstream_addr: String::new(),
        upstream_status: "0".into(),
        upstream_response_time: "0".into(),
        request_time: "0".into(),
        http_referer: String::new(),
        user_agent: String::new(),
        x_forwarded_for: String::new(),
        tag_hash: None,
    })
}

fn slow(time: &str) -> ParsedRecord {
    ParsedRecord::Slow(SlowQueryRecord {
        time: time.to_string(),
        user: "app".into(),
        host: "db1".into(),
        query_id: 1,
        query_time: 0.5,
        lock_time: 0.0,
        rows_sent: 1,
        rows_examined: 1,
        content: String::new(),
    })
}

fn router(store: Arc<MockStore>) -> (PartitionRouter, Arc<IngestMetrics>) {
    let metrics = Arc::new(IngestMetrics::new());
    let router = PartitionRouter::new(store, "access_log_", "slow_log_", Arc::clone(&metrics));
    (router, metrics)
}

#[test]
fn test_partition_key() {
    assert_eq!(partition_key("2024-03-05 10:00:00.000").unwrap(), "202403");
    assert_eq!(partition_key("1999-12-31").unwrap(), "199912");
    assert!(partition_key("2024").is_err());
    assert!(partition_key("garbage-time").is_err());
    assert!(partition_key("").is_err());
}

#[test]
fn test_table_for_uses_kind_prefix() {
    let (router, _) = router(Arc::new(MockStore::default()));
    assert_eq!(
        router.table_for(&access("2024-03-05 10:00:00.000")).unwrap(),
        "access_log_202403"
    );
    assert_eq!(
        router.table_for(&slow("2024-03-05 10:00:00.000")).unwrap(),
        "slow_log_202403"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_writes_create_once() {
    let store = Arc::new(MockStore::default());
    let (router, metrics) = router(Arc::clone(&store));
    let router = Arc::new(router);
    let writer = StoreWriter::new(store.clone());

    let mut tasks = Vec::new();
    for i in 0..16 {
        let router = Arc::clone(&router);
        let writer = writer.clone();
        tasks.push(tokio::spawn(async move {
            let record = access(&format!("2024-03-{:02} 10:00:00.000", i % 28 + 1));
            let table = router.route_and_ensure(&record).await?;
            writer.write(&record, &table).await
        }));
    }

    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(*store.created.lock().unwrap(), vec!["access_log_202403"]);
    assert_eq!(store.inserts.load(Ordering::SeqCst), 16);
    assert_eq!(metrics.snapshot().partitions_created, 1);
}

#[tokio::test]
async fn test_access_and_slow_partitions_are_independent() {
    let store = Arc::new(MockStore::default());
    let (router, _) = router(Arc::clone(&store));

    router
        .route_and_ensure(&access("2024-03-05 10:00:00.000"))
        .await
        .unwrap();
    router
        .route_and_ensure(&slow("2024-03-05 10:00:00.000"))
        .await
        .unwrap();
    router
        .route_and_ensure(&access("2024-04-01 00:00:00.000"))
        .await
        .unwrap();

    assert_eq!(
        *store.created.lock().unwrap(),
        vec!["access_log_202403", "slow_log_202403", "access_log_202404"]
    );
}

#[tokio::test]
async fn test_out_of_order_months_reuse_known_tables() {
    let store = Arc::new(MockStore::default());
    let (router, _) = router(Arc::clone(&store));

    for time in [
        "2024-04-01 00:00:00.000",
        "2024-03-31 23:59:59.000",
        "2024-04-02 00:00:00.000",
        "2024-03-01 00:00:00.000",
    ] {
        router.route_and_ensure(&access(time)).await.unwrap();
    }

    assert_eq!(store.created.lock().unwrap().len(), 2);
    assert_eq!(router.known_count().await, 2);
}

#[tokio::test]
async fn test_seeded_tables_are_not_created_again() {
    let store = Arc::new(MockStore {
        existing: vec![
            "access_log_202402".into(),
            "slow_log_202402".into(),
            "unrelated".into(),
        ],
        ..Default::default()
    });
    let (router, _) = router(Arc::clone(&store));

    assert_eq!(router.seed().await.unwrap(), 2);
    assert!(router.is_known("access_log_202402").await);
    assert!(!router.is_known("unrelated").await);

    router
        .route_and_ensure(&access("2024-02-10 08:00:00.000"))
        .await
        .unwrap();
    router
        .route_and_ensure(&slow("2024-02-10 08:00:00.000"))
        .await
        .unwrap();
    assert!(store.created.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_creation_is_retried() {
    let store = Arc::new(MockStore {
        failures_left: AtomicUsize::new(1),
        ..Default::default()
    });
    let (router, metrics) = router(Arc::clone(&store));
    let record = access("2024-05-01 00:00:00.000");

    assert!(router.route_and_ensure(&record).await.is_err());
    assert!(!router.is_known("access_log_202405").await);

    assert_eq!(router.route_and_ensure(&record).await.unwrap(), "access_log_202405");
    assert_eq!(metrics.snapshot().partitions_created, 1);
}

#[tokio::test]
async fn test_bad_time_is_an_error() {
    let (router, _) = router(Arc::new(MockStore::default()));
    let result = router.route_and_ensure(&access("soon")).await;
    assert!(matches!(result, Err(StoreError::InvalidPartitionKey(_))));
}

/// Tables can be listed and written, but DDL never completes
struct StalledDdlStore {
    existing: Vec<String>,
}

#[async_trait]
impl LogStore for StalledDdlStore {
    async fn existing_tables(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .existing
            .iter()
            .filter(|t| t.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn create_partition(&self, _kind: RecordKind, _table: &str) -> Result<(), StoreError> {
        std::future::pending().await
    }

    async fn insert(&self, _table: &str, _record: &ParsedRecord) -> Result<(), StoreError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_known_partition_not_blocked_by_stalled_creation() {
    let store = Arc::new(StalledDdlStore {
        existing: vec!["access_log_202401".into()],
    });
    let metrics = Arc::new(IngestMetrics::new());
    let router = Arc::new(PartitionRouter::new(
        store,
        "access_log_",
        "slow_log_",
        metrics,
    ));
    router.seed().await.unwrap();

    let stalled = {
        let router = Arc::clone(&router);
        tokio::spawn(async move { router.route_and_ensure(&access("2024-02-01 00:00:00.000")).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!stalled.is_finished());

    let table = tokio::time::timeout(
        Duration::from_millis(500),
        router.route_and_ensure(&access("2024-01-15 00:00:00.000")),
    )
    .await
    .expect("known partition waited on DDL")
    .unwrap();
    assert_eq!(table, "access_log_202401");

    stalled.abort();
}
