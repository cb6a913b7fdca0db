//! Entry repository scoped to channels.
//!
//! # Responsibility
//! - Create, get, list and delete entry documents inside a channel.
//! - Decode raw documents through [`decode_entry`] with a per-operation
//!   failure policy.
//!
//! # Invariants
//! - `get_by_id` and `delete` probe the channel before any entry-level call;
//!   the probe is not transactional with the call that follows.
//! - `create` does not probe; writing into an unknown channel lets the store
//!   create the collection implicitly.
//! - `list` omits undecodable hits; `get_by_id` returns the decode failure.
//! - List order is fixed: `group` desc, `timestamp` desc, score desc.

use crate::config::SharedStore;
use crate::model::entry::{normalize_instant, Entry, NewEntry};
use crate::repo::channel_repo::ChannelRepository;
use crate::repo::decode::decode_entry;
use crate::repo::error::{classify, log_store_failure, CoreResult, ErrorKind, Resource};
use crate::store::{SearchRequest, SearchResponse, ShardStats, SortField, SortOrder, TotalHits};
use chrono::Utc;
use log::{debug, info, warn};
use serde::Serialize;
use uuid::Uuid;

/// Upper bound of hits requested by `list`; matches the default result
/// window of Elasticsearch.
pub const MAX_LIST_SIZE: u32 = 10_000;

/// Store metadata about a list search, without the hit payload.
///
/// Serializes with the field names the search backend uses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchDiagnostics {
    #[serde(rename = "took")]
    pub took_ms: u64,
    pub timed_out: bool,
    #[serde(rename = "_shards")]
    pub shards: ShardStats,
    pub hits: HitsSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HitsSummary {
    pub total: Option<TotalHits>,
    pub max_score: Option<f64>,
}

impl From<&SearchResponse> for SearchDiagnostics {
    fn from(response: &SearchResponse) -> Self {
        Self {
            took_ms: response.took_ms,
            timed_out: response.timed_out,
            shards: response.shards,
            hits: HitsSummary {
                total: response.total.clone(),
                max_score: response.max_score,
            },
        }
    }
}

/// Result of [`EntryRepository::list`].
#[derive(Debug, Clone, PartialEq)]
pub struct EntryList {
    pub entries: Vec<Entry>,
    pub diagnostics: SearchDiagnostics,
}

/// Entry operations against the injected store.
#[derive(Clone)]
pub struct EntryRepository {
    store: SharedStore,
    channels: ChannelRepository,
}

impl EntryRepository {
    pub fn new(store: SharedStore) -> Self {
        let channels = ChannelRepository::new(store.clone());
        Self { store, channels }
    }

    /// Writes a new entry and returns it as stored.
    ///
    /// `inserted` is the write moment; `timestamp` defaults to it.
    pub async fn create(&self, channel_id: &str, new_entry: NewEntry) -> CoreResult<Entry> {
        let inserted = normalize_instant(Utc::now());
        let entry = Entry {
            entry_id: Uuid::new_v4().to_string(),
            channel_id: channel_id.to_string(),
            group: new_entry.group,
            message: new_entry.message,
            metadata: new_entry.metadata,
            timestamp: new_entry.timestamp.map_or(inserted, normalize_instant),
            inserted,
        };

        self.store
            .index_document(channel_id, &entry.entry_id, &entry.to_document())
            .await
            .map_err(|err| {
                log_store_failure(
                    "entry_create",
                    &target(channel_id, &entry.entry_id),
                    &err,
                );
                ErrorKind::UnsuccessfulResponse
            })?;

        info!(
            "event=entry_create module=repo status=ok channel_id={channel_id} entry_id={}",
            entry.entry_id
        );
        Ok(entry)
    }

    pub async fn get_by_id(&self, channel_id: &str, entry_id: &str) -> CoreResult<Entry> {
        self.ensure_channel(channel_id).await?;

        let document = self
            .store
            .get_document(channel_id, entry_id)
            .await
            .map_err(|err| {
                log_store_failure("entry_get", &target(channel_id, entry_id), &err);
                classify(&err, Resource::Entry, ErrorKind::UnsuccessfulResponse)
            })?;

        decode_entry(&document).map_err(|err| {
            warn!(
                "event=entry_decode module=repo status=error {} error={err}",
                target(channel_id, entry_id)
            );
            ErrorKind::from(err)
        })
    }

    /// Lists the channel's entries in the fixed sort order.
    pub async fn list(&self, channel_id: &str) -> CoreResult<EntryList> {
        let request = SearchRequest {
            sort: list_sort(),
            size: MAX_LIST_SIZE,
        };

        let response = self
            .store
            .search_documents(channel_id, &request)
            .await
            .map_err(|err| {
                log_store_failure("entry_list", &format!("channel_id={channel_id}"), &err);
                classify(&err, Resource::Channel, ErrorKind::UnsuccessfulSearch)
            })?;

        let diagnostics = SearchDiagnostics::from(&response);
        let entries = response
            .hits
            .iter()
            .filter_map(|hit| match decode_entry(&hit.document) {
                Ok(entry) => Some(entry),
                Err(err) => {
                    debug!(
                        "event=entry_list_skip module=repo {} reason={err}",
                        target(channel_id, &hit.document.id)
                    );
                    None
                }
            })
            .collect::<Vec<_>>();

        Ok(EntryList {
            entries,
            diagnostics,
        })
    }

    pub async fn delete(&self, channel_id: &str, entry_id: &str) -> CoreResult<()> {
        self.ensure_channel(channel_id).await?;

        self.store
            .delete_document(channel_id, entry_id)
            .await
            .map_err(|err| {
                log_store_failure("entry_delete", &target(channel_id, entry_id), &err);
                classify(&err, Resource::Entry, ErrorKind::UnsuccessfulDelete)
            })?;

        info!("event=entry_delete module=repo status=ok channel_id={channel_id} entry_id={entry_id}");
        Ok(())
    }

    async fn ensure_channel(&self, channel_id: &str) -> CoreResult<()> {
        if self.channels.exists(channel_id).await? {
            Ok(())
        } else {
            Err(ErrorKind::NotFound(Resource::Channel))
        }
    }
}

fn list_sort() -> Vec<SortField> {
    vec![
        SortField::field("group", SortOrder::Desc),
        SortField::field("timestamp", SortOrder::Desc),
        SortField::score(SortOrder::Desc),
    ]
}

fn target(channel_id: &str, entry_id: &str) -> String {
    format!("channel_id={channel_id} entry_id={entry_id}")
}
