//! Channel/entry use-case service.
//!
//! # Responsibility
//! - Expose `list/create/get/delete` for channels and entries.
//! - Delegate to the repositories without adding policy of its own.
//!
//! # Invariants
//! - Service APIs never bypass repository error translation.
//! - Mapping `ErrorKind` to protocol statuses is left to the caller.

use crate::config::{open_store, SharedStore, StoreConfig};
use crate::model::channel::Channel;
use crate::model::entry::{Entry, NewEntry};
use crate::repo::channel_repo::ChannelRepository;
use crate::repo::entry_repo::{EntryList, EntryRepository};
use crate::repo::error::CoreResult;
use crate::store::StoreResult;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Entry points consumed by transports.
#[derive(Clone)]
pub struct LogvisService {
    channels: ChannelRepository,
    entries: EntryRepository,
}

impl LogvisService {
    /// Creates a service whose repositories share `store`.
    pub fn new(store: SharedStore) -> Self {
        Self {
            channels: ChannelRepository::new(store.clone()),
            entries: EntryRepository::new(store),
        }
    }

    /// Opens the configured store and wires the repositories to it.
    pub fn from_config(config: &StoreConfig) -> StoreResult<Self> {
        Ok(Self::new(open_store(config)?))
    }

    pub async fn list_channels(&self) -> CoreResult<Vec<Channel>> {
        self.channels.list().await
    }

    pub async fn create_channel(&self) -> CoreResult<Channel> {
        self.channels.create().await
    }

    pub async fn get_channel(&self, channel_id: &str) -> CoreResult<Channel> {
        self.channels.get_by_id(channel_id).await
    }

    pub async fn delete_channel(&self, channel_id: &str) -> CoreResult<()> {
        self.channels.delete(channel_id).await
    }

    pub async fn list_entries(&self, channel_id: &str) -> CoreResult<EntryList> {
        self.entries.list(channel_id).await
    }

    /// Creates an entry; `timestamp` defaults to the moment of the call.
    pub async fn create_entry(
        &self,
        channel_id: &str,
        group: impl Into<String>,
        message: impl Into<String>,
        metadata: Value,
        timestamp: Option<DateTime<Utc>>,
    ) -> CoreResult<Entry> {
        let new_entry = NewEntry {
            group: group.into(),
            message: message.into(),
            metadata,
            timestamp,
        };
        self.entries.create(channel_id, new_entry).await
    }

    pub async fn get_entry(&self, channel_id: &str, entry_id: &str) -> CoreResult<Entry> {
        self.entries.get_by_id(channel_id, entry_id).await
    }

    pub async fn delete_entry(&self, channel_id: &str, entry_id: &str) -> CoreResult<()> {
        self.entries.delete(channel_id, entry_id).await
    }
}
