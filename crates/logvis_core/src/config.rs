//! Store configuration and backend selection.
//!
//! # Responsibility
//! - Describe how to reach the document store (embedded file, in-memory, or
//!   a remote Elasticsearch cluster).
//! - Build the shared store handle injected into the repositories.
//!
//! # Invariants
//! - Client-level policies (timeouts, TLS leniency) live here, never in the
//!   repositories.

use crate::store::{DocumentStore, ElasticsearchStore, SqliteDocumentStore, StoreResult};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Default Elasticsearch node address.
pub const DEFAULT_ELASTIC_URL: &str = "http://localhost:9200";

/// Shared store handle held by every repository.
pub type SharedStore = Arc<dyn DocumentStore>;

/// Which backend to open and how.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreConfig {
    Sqlite(SqliteConfig),
    Elasticsearch(ElasticsearchConfig),
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Sqlite(SqliteConfig::default())
    }
}

/// Embedded store settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// Database file; a private in-memory database when `None`.
    pub path: Option<PathBuf>,
}

/// Elasticsearch client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElasticsearchConfig {
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Accept self-signed certificates (development clusters only).
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// Per-request timeout; no timeout when `None`.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    /// Ask the cluster to make writes visible to search before returning.
    #[serde(default)]
    pub refresh_on_write: bool,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_ELASTIC_URL.to_string(),
            username: None,
            password: None,
            accept_invalid_certs: false,
            request_timeout_secs: None,
            refresh_on_write: false,
        }
    }
}

/// Opens the configured backend.
pub fn open_store(config: &StoreConfig) -> StoreResult<SharedStore> {
    match config {
        StoreConfig::Sqlite(sqlite) => {
            let store = match &sqlite.path {
                Some(path) => SqliteDocumentStore::open(path)?,
                None => SqliteDocumentStore::open_in_memory()?,
            };
            info!("event=store_open module=config status=ok backend=sqlite");
            Ok(Arc::new(store))
        }
        StoreConfig::Elasticsearch(elastic) => {
            let store = ElasticsearchStore::new(elastic)?;
            info!(
                "event=store_open module=config status=ok backend=elasticsearch url={}",
                elastic.url
            );
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{open_store, ElasticsearchConfig, SqliteConfig, StoreConfig};
    use serde_json::json;

    #[test]
    fn store_config_deserializes_tagged_backends() {
        let config: StoreConfig = serde_json::from_value(json!({
            "backend": "elasticsearch",
            "url": "https://es.internal:9200",
            "accept_invalid_certs": true
        }))
        .unwrap();

        assert_eq!(
            config,
            StoreConfig::Elasticsearch(ElasticsearchConfig {
                url: "https://es.internal:9200".to_string(),
                accept_invalid_certs: true,
                ..ElasticsearchConfig::default()
            })
        );
    }

    #[test]
    fn default_config_is_in_memory_sqlite() {
        assert_eq!(
            StoreConfig::default(),
            StoreConfig::Sqlite(SqliteConfig { path: None })
        );
        assert!(open_store(&StoreConfig::default()).is_ok());
    }

    #[test]
    fn open_store_rejects_malformed_elastic_url() {
        let config = StoreConfig::Elasticsearch(ElasticsearchConfig {
            url: "not a url".to_string(),
            ..ElasticsearchConfig::default()
        });
        assert!(open_store(&config).is_err());
    }
}
