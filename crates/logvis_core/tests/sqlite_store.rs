use logvis_core::db::migrations::latest_version;
use logvis_core::db::{open_db, DbError};
use logvis_core::store::{SearchRequest, SortField, SortOrder};
use logvis_core::{ChannelSchema, DocumentStore, FieldKind, SqliteDocumentStore, StoreError};
use std::sync::Arc;
use rusqlite::Connection;
use serde_json::json;

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logvis.db");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "collections");
    assert_table_exists(&conn_second, "documents");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    match open_db(&path).unwrap_err() {
        DbError::LayoutTooNew { found, supported } => {
            assert_eq!(found, 999);
            assert_eq!(supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn documents_survive_reopening_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logvis.db");

    {
        let store = SqliteDocumentStore::open(&path).unwrap();
        store
            .create_collection("c1", &ChannelSchema::fixed())
            .await
            .unwrap();
        store
            .index_document("c1", "d1", &json!({ "group": "db" }))
            .await
            .unwrap();
    }

    let store = SqliteDocumentStore::open(&path).unwrap();
    let document = store.get_document("c1", "d1").await.unwrap();
    assert_eq!(document.collection, "c1");
    assert_eq!(document.source, Some(json!({ "group": "db" })));
}

#[tokio::test]
async fn creating_existing_collection_is_rejected() {
    let store = SqliteDocumentStore::open_in_memory().unwrap();
    store
        .create_collection("c1", &ChannelSchema::fixed())
        .await
        .unwrap();

    let err = store
        .create_collection("c1", &ChannelSchema::fixed())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists(_)));
}

#[tokio::test]
async fn missing_collection_and_document_are_not_found() {
    let store = SqliteDocumentStore::open_in_memory().unwrap();

    assert!(matches!(
        store.get_document("nope", "d1").await.unwrap_err(),
        StoreError::NotFound(_)
    ));
    assert!(matches!(
        store.delete_collection("nope").await.unwrap_err(),
        StoreError::NotFound(_)
    ));

    store
        .create_collection("c1", &ChannelSchema::fixed())
        .await
        .unwrap();
    assert!(matches!(
        store.get_document("c1", "d1").await.unwrap_err(),
        StoreError::NotFound(_)
    ));
    assert!(matches!(
        store.delete_document("c1", "d1").await.unwrap_err(),
        StoreError::NotFound(_)
    ));
}

#[tokio::test]
async fn indexing_same_id_overwrites_document() {
    let store = SqliteDocumentStore::open_in_memory().unwrap();
    store
        .index_document("c1", "d1", &json!({ "message": "first" }))
        .await
        .unwrap();
    store
        .index_document("c1", "d1", &json!({ "message": "second" }))
        .await
        .unwrap();

    let document = store.get_document("c1", "d1").await.unwrap();
    assert_eq!(document.source, Some(json!({ "message": "second" })));
    assert_eq!(
        store.get_collection("c1").await.unwrap().document_count,
        Some(1)
    );
}

#[tokio::test]
async fn search_applies_sort_chain_and_size() {
    let store = SqliteDocumentStore::open_in_memory().unwrap();
    let docs = [
        ("d1", json!({ "group": "a", "timestamp": "2024-01-01T00:00:05.000Z" })),
        ("d2", json!({ "group": "b", "timestamp": "2024-01-01T00:00:01.000Z" })),
        ("d3", json!({ "group": "b", "timestamp": "2024-01-01T00:00:02.000Z" })),
        ("d4", json!({ "timestamp": "2024-01-01T00:00:09.000Z" })),
    ];
    for (id, body) in &docs {
        store.index_document("c1", id, body).await.unwrap();
    }

    let request = SearchRequest {
        sort: vec![
            SortField::field("group", SortOrder::Desc),
            SortField::field("timestamp", SortOrder::Desc),
            SortField::score(SortOrder::Desc),
        ],
        size: 10,
    };
    let response = store.search_documents("c1", &request).await.unwrap();
    let ids = response
        .hits
        .iter()
        .map(|hit| hit.document.id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["d3", "d2", "d1", "d4"]);
    assert_eq!(response.total.unwrap().value, 4);

    let limited = store
        .search_documents("c1", &SearchRequest { size: 2, ..request })
        .await
        .unwrap();
    assert_eq!(limited.hits.len(), 2);
    assert_eq!(limited.total.unwrap().value, 4);
}

#[tokio::test]
async fn unreadable_body_surfaces_without_source() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logvis.db");

    let store = SqliteDocumentStore::open(&path).unwrap();
    store
        .index_document("c1", "d1", &json!({ "group": "db" }))
        .await
        .unwrap();

    let conn = Connection::open(&path).unwrap();
    conn.execute("UPDATE documents SET body = 'not json' WHERE doc_id = 'd1';", [])
        .unwrap();
    drop(conn);

    let document = store.get_document("c1", "d1").await.unwrap();
    assert_eq!(document.source, None);
}

#[tokio::test]
async fn implicit_collection_schema_grows_with_indexed_fields() {
    let store = SqliteDocumentStore::open_in_memory().unwrap();
    store
        .index_document(
            "c1",
            "d1",
            &json!({ "group": "db", "timestamp": "2024-01-01T00:00:00.000Z" }),
        )
        .await
        .unwrap();
    store
        .index_document("c1", "d2", &json!({ "group": "2024-02-02", "metadata": {} }))
        .await
        .unwrap();

    let schema = store.get_collection("c1").await.unwrap().schema.unwrap();
    assert_eq!(schema.fields.get("group"), Some(&FieldKind::Keyword));
    assert_eq!(schema.fields.get("timestamp"), Some(&FieldKind::Date));
    assert_eq!(schema.fields.get("metadata"), Some(&FieldKind::Object));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writes_from_many_tasks_all_land() {
    let store = Arc::new(SqliteDocumentStore::open_in_memory().unwrap());
    store
        .create_collection("c1", &ChannelSchema::fixed())
        .await
        .unwrap();

    let tasks = (0..16)
        .map(|n| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .index_document("c1", &format!("d{n}"), &json!({ "n": n }))
                    .await
            })
        })
        .collect::<Vec<_>>();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(
        store.get_collection("c1").await.unwrap().document_count,
        Some(16)
    );
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
