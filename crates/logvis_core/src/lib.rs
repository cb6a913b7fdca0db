//! Channel and entry data-access layer for logvis.
//! This crate decides how store failures and malformed documents surface to
//! callers; transports only map the resulting error kinds.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod store;

use serde::Serialize;

pub use config::{
    open_store, ElasticsearchConfig, SharedStore, SqliteConfig, StoreConfig, DEFAULT_ELASTIC_URL,
};
pub use logging::{default_log_level, init_logging, logging_status, LogTarget};
pub use model::channel::{Channel, ChannelId, ChannelSchema, FieldKind};
pub use model::entry::{Entry, EntryId, NewEntry};
pub use repo::channel_repo::ChannelRepository;
pub use repo::decode::{decode_entry, DecodeError};
pub use repo::entry_repo::{EntryList, EntryRepository, HitsSummary, SearchDiagnostics, MAX_LIST_SIZE};
pub use repo::error::{is_not_found, CoreResult, ErrorKind, Resource};
pub use service::logvis_service::LogvisService;
pub use store::{
    DocumentStore, ElasticsearchStore, RawDocument, SqliteDocumentStore, StoreError, StoreResult,
};

/// Package metadata reported to transport callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
    pub authors: &'static str,
    pub license: &'static str,
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Returns name, version, description, authors and license of the core
/// crate, read from its manifest at build time.
pub fn application_info() -> ApplicationInfo {
    ApplicationInfo {
        name: "logvis",
        version: core_version(),
        description: env!("CARGO_PKG_DESCRIPTION"),
        authors: env!("CARGO_PKG_AUTHORS"),
        license: env!("CARGO_PKG_LICENSE"),
    }
}
