//! Channel repository over store collections.
//!
//! # Responsibility
//! - List, create, get and delete channel collections.
//! - Provide the existence probe used before entry-scoped reads and deletes.
//!
//! # Invariants
//! - New channels always get a fresh UUID v4 id and the fixed schema.
//! - Absent collections map to `NotFound(Channel)`; every other failure maps
//!   to the operation's `Unsuccessful*` kind.

use crate::config::SharedStore;
use crate::model::channel::{Channel, ChannelId, ChannelSchema};
use crate::repo::error::{classify, log_store_failure, CoreResult, ErrorKind, Resource};
use crate::store::{CollectionInfo, StoreError};
use log::info;
use uuid::Uuid;

/// Channel operations against the injected store.
#[derive(Clone)]
pub struct ChannelRepository {
    store: SharedStore,
}

impl ChannelRepository {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Lists every collection the store reports.
    pub async fn list(&self) -> CoreResult<Vec<Channel>> {
        let collections = self.store.list_collections().await.map_err(|err| {
            log_failure("channel_list", "-", &err);
            ErrorKind::UnsuccessfulResponse
        })?;

        Ok(collections.into_iter().map(to_channel).collect())
    }

    /// Allocates a new channel id and creates its collection.
    pub async fn create(&self) -> CoreResult<Channel> {
        let channel_id: ChannelId = Uuid::new_v4().to_string();
        let collection = self
            .store
            .create_collection(&channel_id, &ChannelSchema::fixed())
            .await
            .map_err(|err| {
                log_failure("channel_create", &channel_id, &err);
                ErrorKind::UnsuccessfulResponse
            })?;

        info!("event=channel_create module=repo status=ok channel_id={channel_id}");
        Ok(to_channel(collection))
    }

    pub async fn get_by_id(&self, channel_id: &str) -> CoreResult<Channel> {
        let collection = self
            .store
            .get_collection(channel_id)
            .await
            .map_err(|err| {
                log_failure("channel_get", channel_id, &err);
                classify(&err, Resource::Channel, ErrorKind::UnsuccessfulResponse)
            })?;

        Ok(to_channel(collection))
    }

    /// Deletes the channel collection together with all of its entries.
    pub async fn delete(&self, channel_id: &str) -> CoreResult<()> {
        self.store
            .delete_collection(channel_id)
            .await
            .map_err(|err| {
                log_failure("channel_delete", channel_id, &err);
                classify(&err, Resource::Channel, ErrorKind::UnsuccessfulDelete)
            })?;

        info!("event=channel_delete module=repo status=ok channel_id={channel_id}");
        Ok(())
    }

    /// Existence probe. A probe that cannot be answered is
    /// `UnsuccessfulResponse`, never `Ok(false)`.
    pub async fn exists(&self, channel_id: &str) -> CoreResult<bool> {
        self.store
            .collection_exists(channel_id)
            .await
            .map_err(|err| {
                log_failure("channel_exists", channel_id, &err);
                ErrorKind::UnsuccessfulResponse
            })
    }
}

fn to_channel(collection: CollectionInfo) -> Channel {
    Channel {
        channel_id: collection.name,
        document_count: collection.document_count,
        health: collection.health,
        status: collection.status,
        schema: collection.schema,
    }
}

fn log_failure(event: &str, channel_id: &str, err: &StoreError) {
    log_store_failure(event, &format!("channel_id={channel_id}"), err);
}
