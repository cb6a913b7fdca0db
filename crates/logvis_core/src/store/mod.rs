//! Document store collaborator contract and backends.
//!
//! # Responsibility
//! - Define the async operations the repositories issue against a store.
//! - Translate backend failures into [`StoreError`] values at the boundary.
//!
//! # Invariants
//! - Every fallible operation reports an absent collection or document as
//!   [`StoreError::NotFound`], distinct from every other failure.
//! - Backends never retry; one failed call is one error.

use crate::db::DbError;
use crate::model::channel::ChannelSchema;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod elasticsearch;
pub mod sqlite;

pub use elasticsearch::ElasticsearchStore;
pub use sqlite::SqliteDocumentStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failure raised by a store backend.
#[derive(Debug)]
pub enum StoreError {
    /// The addressed collection or document does not exist.
    NotFound(String),
    /// A collection with the requested name already exists.
    AlreadyExists(String),
    /// The backend answered but refused the request.
    Rejected { status: u16, reason: String },
    /// The request did not complete (connection, TLS, timeout).
    Transport(String),
    /// Embedded database failure.
    Db(DbError),
    /// The backend answered with a payload that could not be read.
    InvalidResponse(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(resource) => write!(f, "resource not found: {resource}"),
            Self::AlreadyExists(resource) => write!(f, "resource already exists: {resource}"),
            Self::Rejected { status, reason } => {
                write!(f, "store rejected request with status {status}: {reason}")
            }
            Self::Transport(message) => write!(f, "store transport failure: {message}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidResponse(message) => write!(f, "invalid store response: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Collection metadata reported by the store.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CollectionInfo {
    pub name: String,
    pub document_count: Option<u64>,
    pub health: Option<String>,
    pub status: Option<String>,
    pub schema: Option<ChannelSchema>,
}

/// Raw document as read from the store; the body is an untyped field bag.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    pub id: String,
    pub collection: String,
    /// `None` when the backend did not return the body at all.
    pub source: Option<Value>,
}

/// Sort key of a search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortKey {
    Field(String),
    Score,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    pub key: SortKey,
    pub order: SortOrder,
}

impl SortField {
    pub fn field(name: impl Into<String>, order: SortOrder) -> Self {
        Self {
            key: SortKey::Field(name.into()),
            order,
        }
    }

    pub fn score(order: SortOrder) -> Self {
        Self {
            key: SortKey::Score,
            order,
        }
    }
}

/// Match-all search over one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Tie-break chain, applied in order.
    pub sort: Vec<SortField>,
    /// Maximum number of hits to return.
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub document: RawDocument,
    pub score: Option<f64>,
}

/// Shard accounting reported with a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShardStats {
    pub total: u32,
    pub successful: u32,
    #[serde(default)]
    pub skipped: u32,
    pub failed: u32,
}

/// Total hit count, possibly a lower bound (`relation = "gte"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalHits {
    pub value: u64,
    pub relation: String,
}

/// Search outcome: hits plus the store's metadata about the search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    pub took_ms: u64,
    pub timed_out: bool,
    pub shards: ShardStats,
    pub total: Option<TotalHits>,
    pub max_score: Option<f64>,
}

/// Store collaborator consumed by the repositories.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list_collections(&self) -> StoreResult<Vec<CollectionInfo>>;
    async fn create_collection(
        &self,
        name: &str,
        schema: &ChannelSchema,
    ) -> StoreResult<CollectionInfo>;
    async fn get_collection(&self, name: &str) -> StoreResult<CollectionInfo>;
    async fn collection_exists(&self, name: &str) -> StoreResult<bool>;
    async fn delete_collection(&self, name: &str) -> StoreResult<()>;
    /// Writes (or overwrites) one document.
    async fn index_document(&self, collection: &str, doc_id: &str, body: &Value)
        -> StoreResult<()>;
    async fn get_document(&self, collection: &str, doc_id: &str) -> StoreResult<RawDocument>;
    async fn search_documents(
        &self,
        collection: &str,
        request: &SearchRequest,
    ) -> StoreResult<SearchResponse>;
    async fn delete_document(&self, collection: &str, doc_id: &str) -> StoreResult<()>;
}
