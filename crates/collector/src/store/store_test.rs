use super::*;
use crate::record::{AccessLogRecord, SlowQueryRecord};

fn access_record(time: &str) -> ParsedRecord {
    ParsedRecord::Access(AccessLogRecord {
        time: time.to_string(),
        host: "shop.example".into(),
        client_ip: "10.0.0.8".into(),
        request_uri: "/cart".into(),
        request_query: "id=1".into(),
        request_version: "1.1".into(),
        request_method: "GET".into(),
        status: "200".into(),
        size: "512".into(),
        upstream_addr: "127.0.0.1:9000".into(),
        upstream_status: "200".into(),
        upstream_response_time: "0.041".into(),
        request_time: "0.042".into(),
        http_referer: String::new(),
        user_agent: "curl/8.5".into(),
        x_forwarded_for: String::new(),
        tag_hash: Some("ab".repeat(32)),
    })
}

fn slow_record() -> ParsedRecord {
    ParsedRecord::Slow(SlowQueryRecord {
        time: "2024-03-05 10:00:00.000".into(),
        user: "app".into(),
        host: "db1".into(),
        query_id: 42,
        query_time: 1.5,
        lock_time: 0.1,
        rows_sent: 3,
        rows_examined: 900,
        content: "SELECT * FROM orders;".into(),
    })
}

async fn count(store: &TursoStore, table: &str) -> i64 {
    let conn = store.database().connect().unwrap();
    let mut rows = conn
        .query(&format!("SELECT COUNT(*) FROM {table}"), ())
        .await
        .unwrap();
    let row = rows.next().await.unwrap().unwrap();
    *row.get_value(0).unwrap().as_integer().unwrap()
}

#[test]
fn test_plain_identifier() {
    assert!(is_plain_identifier("access_log_202403"));
    assert!(is_plain_identifier("_t1"));
    assert!(!is_plain_identifier(""));
    assert!(!is_plain_identifier("1table"));
    assert!(!is_plain_identifier("t; DROP TABLE x"));
    assert!(!is_plain_identifier("t-1"));
}

#[tokio::test]
async fn test_create_partition_is_idempotent() {
    let store = TursoStore::memory().await.unwrap();

    store
        .create_partition(RecordKind::Access, "access_log_202403")
        .await
        .unwrap();
    store
        .create_partition(RecordKind::Access, "access_log_202403")
        .await
        .unwrap();

    let tables = store.existing_tables("access_log_").await.unwrap();
    assert_eq!(tables, vec!["access_log_202403"]);
}

#[tokio::test]
async fn test_existing_tables_filters_by_prefix() {
    let store = TursoStore::memory().await.unwrap();
    store
        .create_partition(RecordKind::Access, "access_log_202402")
        .await
        .unwrap();
    store
        .create_partition(RecordKind::Access, "access_log_202403")
        .await
        .unwrap();
    store
        .create_partition(RecordKind::Slow, "slow_log_202403")
        .await
        .unwrap();

    assert_eq!(
        store.existing_tables("access_log_").await.unwrap(),
        vec!["access_log_202402", "access_log_202403"]
    );
    assert_eq!(
        store.existing_tables("slow_log_").await.unwrap(),
        vec!["slow_log_202403"]
    );
}

#[tokio::test]
async fn test_insert_both_kinds() {
    let store = TursoStore::memory().await.unwrap();
    store
        .create_partition(RecordKind::Access, "access_log_202403")
        .await
        .unwrap();
    store
        .create_partition(RecordKind::Slow, "slow_log_202403")
        .await
        .unwrap();

    let writer = StoreWriter::new(Arc::new(store));
    writer
        .write(&access_record("2024-03-05 10:00:00.000"), "access_log_202403")
        .await
        .unwrap();
    writer
        .write(&access_record("2024-03-05 10:00:01.000"), "access_log_202403")
        .await
        .unwrap();
    writer.write(&slow_record(), "slow_log_202403").await.unwrap();
}

#[tokio::test]
async fn test_inserted_values_use_column_types() {
    let store = TursoStore::memory().await.unwrap();
    store
        .create_partition(RecordKind::Access, "access_log_202403")
        .await
        .unwrap();
    store
        .insert("access_log_202403", &access_record("2024-03-05 10:00:00.000"))
        .await
        .unwrap();

    assert_eq!(count(&store, "access_log_202403").await, 1);

    let conn = store.database().connect().unwrap();
    let mut rows = conn
        .query("SELECT status, request_uri FROM access_log_202403", ())
        .await
        .unwrap();
    let row = rows.next().await.unwrap().unwrap();
    assert_eq!(*row.get_value(0).unwrap().as_integer().unwrap(), 200);
    assert_eq!(row.get_value(1).unwrap().as_text().unwrap(), "/cart");
}

#[tokio::test]
async fn test_insert_into_missing_table_fails() {
    let store = TursoStore::memory().await.unwrap();
    let result = store
        .insert("access_log_209912", &access_record("2099-12-01 00:00:00.000"))
        .await;
    assert!(matches!(result, Err(StoreError::Database(_))));
}

#[tokio::test]
async fn test_unsafe_table_name_rejected() {
    let store = TursoStore::memory().await.unwrap();
    let result = store
        .create_partition(RecordKind::Access, "x; DROP TABLE y")
        .await;
    assert!(matches!(result, Err(StoreError::InvalidTable(_))));
}

#[tokio::test]
async fn test_open_creates_parent_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/logs.db");

    let store = TursoStore::open(&path).await.unwrap();
    store
        .create_partition(RecordKind::Slow, "slow_log_202401")
        .await
        .unwrap();
    assert!(path.parent().unwrap().is_dir());
}
