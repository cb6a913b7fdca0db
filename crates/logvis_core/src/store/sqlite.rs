//! Embedded document store on SQLite.
//!
//! # Responsibility
//! - Keep collections and JSON documents in the `collections`/`documents`
//!   tables created by `db::migrations`.
//! - Emulate the search backend semantics the repositories rely on.
//!
//! # Invariants
//! - Deleting a collection removes all of its documents (FK cascade).
//! - Indexing into an absent collection creates it, and fields not yet in a
//!   collection schema are added from the indexed body (strings that parse
//!   as instants become `date`, other strings `keyword`).
//! - Search compares `date` fields as instants and every other string
//!   field lexicographically; missing values sort last in either direction.
//! - SQLite work runs on the blocking pool; the connection mutex is only
//!   taken there.

use crate::db::{open_db, open_db_in_memory};
use crate::model::channel::{ChannelSchema, FieldKind};
use crate::model::entry::parse_instant;
use crate::store::{
    CollectionInfo, DocumentStore, RawDocument, SearchHit, SearchRequest, SearchResponse,
    ShardStats, SortField, SortKey, SortOrder, StoreError, StoreResult, TotalHits,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Relevance score of every hit; the embedded store only runs match-all.
const MATCH_ALL_SCORE: f64 = 1.0;

const COLLECTION_SELECT_SQL: &str = "SELECT
    collections.name AS name,
    collections.schema_json AS schema_json,
    (SELECT COUNT(*) FROM documents WHERE documents.collection = collections.name) AS doc_count
FROM collections";

/// SQLite-backed [`DocumentStore`].
///
/// Every call takes the single connection on a `spawn_blocking` worker, so
/// calls are serialized but never block the async executor.
pub struct SqliteDocumentStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDocumentStore {
    /// Wraps a connection that already went through `db::open_db*`.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Opens (and migrates) a database file.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Ok(Self::new(open_db(path)?))
    }

    /// Opens (and migrates) a private in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self::new(open_db_in_memory()?))
    }

    async fn with_conn<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| StoreError::Transport("sqlite connection lock poisoned".to_string()))?;
            op(&mut conn)
        })
        .await
        .map_err(|err| StoreError::Transport(format!("sqlite task failed: {err}")))?
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn list_collections(&self) -> StoreResult<Vec<CollectionInfo>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{COLLECTION_SELECT_SQL} ORDER BY collections.created_at ASC, collections.name ASC;"
            ))?;
            let mut rows = stmt.query([])?;
            let mut collections = Vec::new();
            while let Some(row) = rows.next()? {
                collections.push(parse_collection_row(row)?);
            }
            Ok(collections)
        })
        .await
    }

    async fn create_collection(
        &self,
        name: &str,
        schema: &ChannelSchema,
    ) -> StoreResult<CollectionInfo> {
        let schema_json = encode_json(&schema.to_mappings())?;
        let name = name.to_string();
        let schema = schema.clone();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "INSERT INTO collections (name, schema_json) VALUES (?1, ?2)
                 ON CONFLICT (name) DO NOTHING;",
                params![name, schema_json],
            )?;
            if changed == 0 {
                return Err(StoreError::AlreadyExists(format!("collection `{name}`")));
            }

            Ok(CollectionInfo {
                name,
                document_count: Some(0),
                schema: Some(schema),
                ..CollectionInfo::default()
            })
        })
        .await
    }

    async fn get_collection(&self, name: &str) -> StoreResult<CollectionInfo> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            let mut stmt =
                conn.prepare(&format!("{COLLECTION_SELECT_SQL} WHERE collections.name = ?1;"))?;
            let mut rows = stmt.query([&name])?;
            let Some(row) = rows.next()? else {
                return Err(collection_not_found(&name));
            };
            parse_collection_row(row)
        })
        .await
    }

    async fn collection_exists(&self, name: &str) -> StoreResult<bool> {
        let name = name.to_string();
        self.with_conn(move |conn| collection_exists(conn, &name))
            .await
    }

    async fn delete_collection(&self, name: &str) -> StoreResult<()> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            let changed = conn.execute("DELETE FROM collections WHERE name = ?1;", [&name])?;
            if changed == 0 {
                return Err(collection_not_found(&name));
            }
            Ok(())
        })
        .await
    }

    async fn index_document(&self, collection: &str, doc_id: &str, body: &Value) -> StoreResult<()> {
        let body_json = encode_json(body)?;
        let discovered = dynamic_fields(body);
        let collection = collection.to_string();
        let doc_id = doc_id.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let stored = tx
                .query_row(
                    "SELECT schema_json FROM collections WHERE name = ?1;",
                    [&collection],
                    |row| row.get::<_, String>(0),
                )
                .optional()?;

            match stored {
                None => {
                    let schema = ChannelSchema { fields: discovered };
                    tx.execute(
                        "INSERT INTO collections (name, schema_json) VALUES (?1, ?2);",
                        params![collection, encode_json(&schema.to_mappings())?],
                    )?;
                }
                Some(schema_json) => {
                    let mut schema = decode_schema(&collection, &schema_json)?;
                    let known = schema.fields.len();
                    for (field, kind) in discovered {
                        schema.fields.entry(field).or_insert(kind);
                    }
                    if schema.fields.len() != known {
                        tx.execute(
                            "UPDATE collections SET schema_json = ?2 WHERE name = ?1;",
                            params![collection, encode_json(&schema.to_mappings())?],
                        )?;
                    }
                }
            }

            tx.execute(
                "INSERT INTO documents (collection, doc_id, body) VALUES (?1, ?2, ?3)
                 ON CONFLICT (collection, doc_id) DO UPDATE SET
                    body = excluded.body,
                    indexed_at = (strftime('%s', 'now') * 1000);",
                params![collection, doc_id, body_json],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get_document(&self, collection: &str, doc_id: &str) -> StoreResult<RawDocument> {
        let collection = collection.to_string();
        let doc_id = doc_id.to_string();
        self.with_conn(move |conn| {
            if !collection_exists(conn, &collection)? {
                return Err(collection_not_found(&collection));
            }

            let body = conn
                .query_row(
                    "SELECT body FROM documents WHERE collection = ?1 AND doc_id = ?2;",
                    params![collection, doc_id],
                    |row| row.get::<_, String>(0),
                )
                .optional()?;

            match body {
                Some(body) => Ok(RawDocument {
                    source: decode_body(&body),
                    id: doc_id,
                    collection,
                }),
                None => Err(StoreError::NotFound(format!(
                    "document `{doc_id}` in collection `{collection}`"
                ))),
            }
        })
        .await
    }

    async fn search_documents(
        &self,
        collection: &str,
        request: &SearchRequest,
    ) -> StoreResult<SearchResponse> {
        let started_at = Instant::now();
        let collection = collection.to_string();
        let (schema, documents) = self
            .with_conn(move |conn| {
                let schema_json = conn
                    .query_row(
                        "SELECT schema_json FROM collections WHERE name = ?1;",
                        [&collection],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()?
                    .ok_or_else(|| collection_not_found(&collection))?;
                let schema = decode_schema(&collection, &schema_json)?;

                let mut stmt = conn.prepare(
                    "SELECT doc_id, body FROM documents WHERE collection = ?1 ORDER BY rowid ASC;",
                )?;
                let mut rows = stmt.query([&collection])?;
                let mut documents = Vec::new();
                while let Some(row) = rows.next()? {
                    let doc_id: String = row.get(0)?;
                    let body: String = row.get(1)?;
                    documents.push(RawDocument {
                        id: doc_id,
                        collection: collection.clone(),
                        source: decode_body(&body),
                    });
                }
                Ok((schema, documents))
            })
            .await?;

        let total = documents.len() as u64;
        let mut keyed = documents
            .into_iter()
            .map(|document| (sort_keys(&document, &request.sort, &schema), document))
            .collect::<Vec<_>>();
        keyed.sort_by(|(left, _), (right, _)| compare_keys(left, right, &request.sort));

        let hits = keyed
            .into_iter()
            .take(request.size as usize)
            .map(|(_, document)| SearchHit {
                document,
                score: Some(MATCH_ALL_SCORE),
            })
            .collect::<Vec<_>>();
        let max_score = (!hits.is_empty()).then_some(MATCH_ALL_SCORE);

        Ok(SearchResponse {
            hits,
            took_ms: started_at.elapsed().as_millis() as u64,
            timed_out: false,
            shards: ShardStats {
                total: 1,
                successful: 1,
                skipped: 0,
                failed: 0,
            },
            total: Some(TotalHits {
                value: total,
                relation: "eq".to_string(),
            }),
            max_score,
        })
    }

    async fn delete_document(&self, collection: &str, doc_id: &str) -> StoreResult<()> {
        let collection = collection.to_string();
        let doc_id = doc_id.to_string();
        self.with_conn(move |conn| {
            if !collection_exists(conn, &collection)? {
                return Err(collection_not_found(&collection));
            }

            let changed = conn.execute(
                "DELETE FROM documents WHERE collection = ?1 AND doc_id = ?2;",
                params![collection, doc_id],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!(
                    "document `{doc_id}` in collection `{collection}`"
                )));
            }
            Ok(())
        })
        .await
    }
}

fn collection_exists(conn: &Connection, name: &str) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM collections WHERE name = ?1);",
        [name],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn collection_not_found(name: &str) -> StoreError {
    StoreError::NotFound(format!("collection `{name}`"))
}

fn parse_collection_row(row: &Row<'_>) -> StoreResult<CollectionInfo> {
    let name: String = row.get("name")?;
    let schema_json: String = row.get("schema_json")?;
    let schema = decode_schema(&name, &schema_json)?;
    let doc_count: i64 = row.get("doc_count")?;

    Ok(CollectionInfo {
        name,
        document_count: u64::try_from(doc_count).ok(),
        schema: Some(schema),
        ..CollectionInfo::default()
    })
}

fn decode_schema(collection: &str, schema_json: &str) -> StoreResult<ChannelSchema> {
    let mappings = serde_json::from_str::<Value>(schema_json).map_err(|err| {
        StoreError::InvalidResponse(format!(
            "invalid schema_json for collection `{collection}`: {err}"
        ))
    })?;
    Ok(ChannelSchema::from_mappings(&mappings))
}

/// Field kinds detected from a body's top-level values.
fn dynamic_fields(body: &Value) -> BTreeMap<String, FieldKind> {
    let Some(fields) = body.as_object() else {
        return BTreeMap::new();
    };

    fields
        .iter()
        .filter_map(|(name, value)| {
            let kind = match value {
                Value::String(text) if parse_instant(text).is_some() => FieldKind::Date,
                Value::String(_) => FieldKind::Keyword,
                Value::Object(_) => FieldKind::Object,
                _ => return None,
            };
            Some((name.clone(), kind))
        })
        .collect()
}

fn encode_json(value: &Value) -> StoreResult<String> {
    serde_json::to_string(value)
        .map_err(|err| StoreError::InvalidResponse(format!("cannot encode document: {err}")))
}

/// Stored bodies that no longer parse surface as an inaccessible source.
fn decode_body(body: &str) -> Option<Value> {
    serde_json::from_str(body).ok()
}

#[derive(Debug, Clone, PartialEq, PartialOrd)]
enum SortValue {
    Bool(bool),
    Number(f64),
    Instant(DateTime<Utc>),
    Text(String),
}

fn sort_keys(
    document: &RawDocument,
    sort: &[SortField],
    schema: &ChannelSchema,
) -> Vec<Option<SortValue>> {
    sort.iter()
        .map(|field| match &field.key {
            SortKey::Score => Some(SortValue::Number(MATCH_ALL_SCORE)),
            SortKey::Field(name) => field_sort_value(
                document.source.as_ref(),
                name,
                schema.fields.get(name).copied(),
            ),
        })
        .collect()
}

/// Sort value of `field`; a `date` field that does not parse has none.
fn field_sort_value(
    source: Option<&Value>,
    field: &str,
    kind: Option<FieldKind>,
) -> Option<SortValue> {
    match source?.get(field)? {
        Value::Bool(value) => Some(SortValue::Bool(*value)),
        Value::Number(value) => value.as_f64().map(SortValue::Number),
        Value::String(value) => match kind {
            Some(FieldKind::Date) => parse_instant(value).map(SortValue::Instant),
            _ => Some(SortValue::Text(value.clone())),
        },
        _ => None,
    }
}

fn compare_keys(
    left: &[Option<SortValue>],
    right: &[Option<SortValue>],
    sort: &[SortField],
) -> Ordering {
    for ((left, right), field) in left.iter().zip(right).zip(sort) {
        let ordering = match (left, right) {
            (Some(left), Some(right)) => {
                let natural = left.partial_cmp(right).unwrap_or(Ordering::Equal);
                match field.order {
                    SortOrder::Asc => natural,
                    SortOrder::Desc => natural.reverse(),
                }
            }
            // Missing values go last in both directions.
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::{compare_keys, dynamic_fields, field_sort_value, SortValue};
    use crate::model::channel::FieldKind;
    use crate::store::{SortField, SortOrder};
    use serde_json::json;
    use std::cmp::Ordering;

    #[test]
    fn date_fields_compare_chronologically() {
        let source = json!({
            "early": "2024-01-01T09:00:00+02:00",
            "late": "2024-01-01T08:00:00Z",
            "broken": "soon"
        });
        let date = Some(FieldKind::Date);
        let early = field_sort_value(Some(&source), "early", date).unwrap();
        let late = field_sort_value(Some(&source), "late", date).unwrap();
        assert!(matches!(early, SortValue::Instant(_)));
        assert_eq!(early.partial_cmp(&late), Some(Ordering::Less));
        assert_eq!(field_sort_value(Some(&source), "broken", date), None);
    }

    #[test]
    fn keyword_fields_compare_as_text_even_when_instant_like() {
        let source = json!({ "a": "2024-01-01T00:00:00Z", "b": "0-legacy" });
        for kind in [Some(FieldKind::Keyword), None] {
            let a = field_sort_value(Some(&source), "a", kind).unwrap();
            let b = field_sort_value(Some(&source), "b", kind).unwrap();
            assert_eq!(a, SortValue::Text("2024-01-01T00:00:00Z".to_string()));
            assert_eq!(a.partial_cmp(&b), Some(Ordering::Greater));
        }
    }

    #[test]
    fn dynamic_fields_detect_dates_keywords_and_objects() {
        let fields = dynamic_fields(&json!({
            "group": "db",
            "timestamp": "2024-01-01T00:00:00.000Z",
            "metadata": { "k": 1 },
            "count": 3
        }));
        assert_eq!(fields.get("group"), Some(&FieldKind::Keyword));
        assert_eq!(fields.get("timestamp"), Some(&FieldKind::Date));
        assert_eq!(fields.get("metadata"), Some(&FieldKind::Object));
        assert_eq!(fields.get("count"), None);
    }

    #[test]
    fn missing_values_sort_last_for_both_orders() {
        let present = vec![Some(SortValue::Text("a".to_string()))];
        let missing = vec![None];

        for order in [SortOrder::Asc, SortOrder::Desc] {
            let sort = vec![SortField::field("group", order)];
            assert_eq!(compare_keys(&present, &missing, &sort), Ordering::Less);
            assert_eq!(compare_keys(&missing, &present, &sort), Ordering::Greater);
        }
    }

    #[test]
    fn later_sort_fields_break_ties() {
        let sort = vec![
            SortField::field("group", SortOrder::Desc),
            SortField::field("n", SortOrder::Desc),
        ];
        let first = vec![
            Some(SortValue::Text("b".to_string())),
            Some(SortValue::Number(2.0)),
        ];
        let second = vec![
            Some(SortValue::Text("b".to_string())),
            Some(SortValue::Number(1.0)),
        ];
        assert_eq!(compare_keys(&first, &second, &sort), Ordering::Less);
    }

    #[test]
    fn non_scalar_values_have_no_sort_value() {
        let source = json!({ "metadata": { "k": 1 }, "nothing": null });
        assert_eq!(field_sort_value(Some(&source), "metadata", None), None);
        assert_eq!(field_sort_value(Some(&source), "nothing", None), None);
        assert_eq!(field_sort_value(None, "metadata", None), None);
    }
}
