//! Elasticsearch document store over its REST API.
//!
//! # Responsibility
//! - Map each store operation to one REST call (indices are collections).
//! - Translate HTTP outcomes into [`StoreError`] values.
//!
//! # Invariants
//! - HTTP 404 always becomes [`StoreError::NotFound`].
//! - Path segments taken from callers are percent-encoded, never spliced raw.

use crate::config::ElasticsearchConfig;
use crate::model::channel::ChannelSchema;
use crate::store::{
    CollectionInfo, DocumentStore, RawDocument, SearchHit, SearchRequest, SearchResponse,
    ShardStats, SortKey, StoreError, StoreResult, TotalHits,
};
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::time::Duration;

const MAX_ERROR_REASON_CHARS: usize = 200;

/// [`DocumentStore`] backed by an Elasticsearch cluster.
pub struct ElasticsearchStore {
    client: Client,
    base_url: Url,
    username: Option<String>,
    password: Option<String>,
    refresh_on_write: bool,
}

impl ElasticsearchStore {
    /// Builds the HTTP client from configuration. No request is sent.
    pub fn new(config: &ElasticsearchConfig) -> StoreResult<Self> {
        let base_url = Url::parse(config.url.trim()).map_err(|err| {
            StoreError::Transport(format!("invalid elasticsearch url `{}`: {err}", config.url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::Transport(format!(
                "elasticsearch url `{}` cannot carry a path",
                config.url
            )));
        }

        let mut builder = Client::builder().danger_accept_invalid_certs(config.accept_invalid_certs);
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|err| StoreError::Transport(format!("cannot build http client: {err}")))?;

        Ok(Self {
            client,
            base_url,
            username: config.username.clone(),
            password: config.password.clone(),
            refresh_on_write: config.refresh_on_write,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> StoreResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                StoreError::Transport(format!("base url `{}` cannot carry a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn write_endpoint(&self, segments: &[&str]) -> StoreResult<Url> {
        let mut url = self.endpoint(segments)?;
        if self.refresh_on_write {
            url.query_pairs_mut().append_pair("refresh", "wait_for");
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!(
            "event=store_request module=store backend=elasticsearch method={method} path={}",
            url.path()
        );
        let builder = self.client.request(method, url);
        match &self.username {
            Some(username) => builder.basic_auth(username, self.password.as_ref()),
            None => builder,
        }
    }

    /// Sends a request and turns every non-2xx answer into an error.
    async fn send(&self, builder: RequestBuilder, resource: &str) -> StoreResult<Response> {
        let response = builder
            .send()
            .await
            .map_err(|err| StoreError::Transport(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(error_from_status(status, &body, resource))
    }
}

#[async_trait]
impl DocumentStore for ElasticsearchStore {
    async fn list_collections(&self) -> StoreResult<Vec<CollectionInfo>> {
        let mut url = self.endpoint(&["_cat", "indices"])?;
        url.query_pairs_mut().append_pair("format", "json");

        let response = self.send(self.request(Method::GET, url), "indices").await?;
        let rows: Vec<CatIndexRow> = read_json(response).await?;

        Ok(rows
            .into_iter()
            .map(|row| CollectionInfo {
                name: row.index,
                document_count: row.docs_count.as_ref().and_then(value_as_u64),
                health: row.health,
                status: row.status,
                schema: None,
            })
            .collect())
    }

    async fn create_collection(
        &self,
        name: &str,
        schema: &ChannelSchema,
    ) -> StoreResult<CollectionInfo> {
        let url = self.endpoint(&[name])?;
        let body = json!({ "mappings": schema.to_mappings() });
        let resource = format!("index `{name}`");

        self.send(self.request(Method::PUT, url).json(&body), &resource)
            .await?;

        Ok(CollectionInfo {
            name: name.to_string(),
            document_count: Some(0),
            schema: Some(schema.clone()),
            ..CollectionInfo::default()
        })
    }

    async fn get_collection(&self, name: &str) -> StoreResult<CollectionInfo> {
        let url = self.endpoint(&[name])?;
        let resource = format!("index `{name}`");

        let response = self.send(self.request(Method::GET, url), &resource).await?;
        let mut indices: HashMap<String, IndexDefinition> = read_json(response).await?;

        // An alias answers under its concrete index name. Anything that
        // resolves to several indices does not name a single collection.
        let found = match indices.remove_entry(name) {
            Some(found) => Some(found),
            None if indices.len() == 1 => indices.into_iter().next(),
            None => None,
        };
        let Some((index_name, definition)) = found else {
            return Err(StoreError::NotFound(resource));
        };

        Ok(CollectionInfo {
            name: index_name,
            schema: Some(ChannelSchema::from_mappings(&definition.mappings)),
            ..CollectionInfo::default()
        })
    }

    async fn collection_exists(&self, name: &str) -> StoreResult<bool> {
        let url = self.endpoint(&[name])?;
        let response = self
            .request(Method::HEAD, url)
            .send()
            .await
            .map_err(|err| StoreError::Transport(err.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(StoreError::Rejected {
                status: status.as_u16(),
                reason: format!("existence check for index `{name}` failed"),
            }),
        }
    }

    async fn delete_collection(&self, name: &str) -> StoreResult<()> {
        let url = self.endpoint(&[name])?;
        let resource = format!("index `{name}`");
        self.send(self.request(Method::DELETE, url), &resource).await?;
        Ok(())
    }

    async fn index_document(&self, collection: &str, doc_id: &str, body: &Value) -> StoreResult<()> {
        let url = self.write_endpoint(&[collection, "_doc", doc_id])?;
        let resource = format!("document `{doc_id}` in index `{collection}`");
        self.send(self.request(Method::PUT, url).json(body), &resource)
            .await?;
        Ok(())
    }

    async fn get_document(&self, collection: &str, doc_id: &str) -> StoreResult<RawDocument> {
        let url = self.endpoint(&[collection, "_doc", doc_id])?;
        let resource = format!("document `{doc_id}` in index `{collection}`");

        let response = self.send(self.request(Method::GET, url), &resource).await?;
        let document: DocumentBody = read_json(response).await?;

        Ok(RawDocument {
            id: document.id,
            collection: document.index,
            source: document.source,
        })
    }

    async fn search_documents(
        &self,
        collection: &str,
        request: &SearchRequest,
    ) -> StoreResult<SearchResponse> {
        let url = self.endpoint(&[collection, "_search"])?;
        let resource = format!("index `{collection}`");
        let body = search_body(request);

        let response = self
            .send(self.request(Method::POST, url).json(&body), &resource)
            .await?;
        let search: SearchBody = read_json(response).await?;

        Ok(SearchResponse {
            hits: search
                .hits
                .hits
                .into_iter()
                .map(|hit| SearchHit {
                    document: RawDocument {
                        id: hit.id,
                        collection: hit.index,
                        source: hit.source,
                    },
                    score: hit.score,
                })
                .collect(),
            took_ms: search.took,
            timed_out: search.timed_out,
            shards: search.shards,
            total: search.hits.total.map(TotalBody::into_total_hits),
            max_score: search.hits.max_score,
        })
    }

    async fn delete_document(&self, collection: &str, doc_id: &str) -> StoreResult<()> {
        let url = self.write_endpoint(&[collection, "_doc", doc_id])?;
        let resource = format!("document `{doc_id}` in index `{collection}`");
        self.send(self.request(Method::DELETE, url), &resource).await?;
        Ok(())
    }
}

fn search_body(request: &SearchRequest) -> Value {
    let sort = request
        .sort
        .iter()
        .map(|field| {
            let key = match &field.key {
                SortKey::Field(name) => name.as_str(),
                SortKey::Score => "_score",
            };
            let mut clause = Map::new();
            clause.insert(key.to_string(), json!({ "order": field.order.as_str() }));
            Value::Object(clause)
        })
        .collect::<Vec<_>>();

    json!({
        "size": request.size,
        "query": { "match_all": {} },
        "sort": sort,
    })
}

async fn read_json<T: DeserializeOwned>(response: Response) -> StoreResult<T> {
    response
        .json::<T>()
        .await
        .map_err(|err| StoreError::InvalidResponse(err.to_string()))
}

fn error_from_status(status: StatusCode, body: &str, resource: &str) -> StoreError {
    if status == StatusCode::NOT_FOUND {
        return StoreError::NotFound(resource.to_string());
    }

    let (error_type, reason) = parse_error_body(body);
    if error_type.as_deref() == Some("resource_already_exists_exception") {
        return StoreError::AlreadyExists(resource.to_string());
    }

    let reason = reason.unwrap_or_else(|| {
        let mut truncated = body.chars().take(MAX_ERROR_REASON_CHARS).collect::<String>();
        if body.chars().count() > MAX_ERROR_REASON_CHARS {
            truncated.push_str("...");
        }
        truncated
    });

    StoreError::Rejected {
        status: status.as_u16(),
        reason,
    }
}

/// Extracts `error.type` and `error.reason` from an error payload.
fn parse_error_body(body: &str) -> (Option<String>, Option<String>) {
    let Ok(payload) = serde_json::from_str::<Value>(body) else {
        return (None, None);
    };

    match payload.get("error") {
        Some(Value::Object(error)) => (
            error.get("type").and_then(Value::as_str).map(str::to_string),
            error.get("reason").and_then(Value::as_str).map(str::to_string),
        ),
        Some(Value::String(reason)) => (None, Some(reason.clone())),
        _ => (None, None),
    }
}

fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.parse().ok(),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct CatIndexRow {
    index: String,
    #[serde(default)]
    health: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default, rename = "docs.count")]
    docs_count: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct IndexDefinition {
    #[serde(default)]
    mappings: Value,
}

#[derive(Debug, Deserialize)]
struct DocumentBody {
    #[serde(rename = "_index")]
    index: String,
    #[serde(rename = "_id")]
    id: String,
    #[serde(default, rename = "_source")]
    source: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SearchBody {
    took: u64,
    timed_out: bool,
    #[serde(rename = "_shards")]
    shards: ShardStats,
    hits: HitsBody,
}

#[derive(Debug, Deserialize)]
struct HitsBody {
    #[serde(default)]
    total: Option<TotalBody>,
    #[serde(default)]
    max_score: Option<f64>,
    #[serde(default)]
    hits: Vec<HitBody>,
}

/// Older clusters report the total as a bare number.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TotalBody {
    Detailed(TotalHits),
    Count(u64),
}

impl TotalBody {
    fn into_total_hits(self) -> TotalHits {
        match self {
            Self::Detailed(total) => total,
            Self::Count(value) => TotalHits {
                value,
                relation: "eq".to_string(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct HitBody {
    #[serde(rename = "_index")]
    index: String,
    #[serde(rename = "_id")]
    id: String,
    #[serde(default, rename = "_score")]
    score: Option<f64>,
    #[serde(default, rename = "_source")]
    source: Option<Value>,
}
