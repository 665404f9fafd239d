//! Mock upstream inventory for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::inventory::{Inventory, InventoryArtist, InventoryError, InventoryReleaseGroup};

/// Mock implementation of the Inventory trait.
///
/// Serves a configurable catalog, records which artists had their release
/// groups listed, and can fail the next call.
#[derive(Debug)]
pub struct MockInventory {
    artists: Arc<RwLock<Vec<InventoryArtist>>>,
    release_groups: Arc<RwLock<HashMap<String, Vec<InventoryReleaseGroup>>>>,
    /// Artist ids passed to `list_release_groups`.
    release_group_queries: Arc<RwLock<Vec<String>>>,
    /// If set, the next call fails with this error.
    next_error: Arc<RwLock<Option<InventoryError>>>,
}

impl Default for MockInventory {
    fn default() -> Self {
        Self::new()
    }
}

impl MockInventory {
    /// Create an empty inventory.
    pub fn new() -> Self {
        Self {
            artists: Arc::new(RwLock::new(Vec::new())),
            release_groups: Arc::new(RwLock::new(HashMap::new())),
            release_group_queries: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn add_artist(&self, artist: InventoryArtist) {
        self.artists.write().await.push(artist);
    }

    pub async fn add_release_group(&self, artist_id: &str, release_group: InventoryReleaseGroup) {
        self.release_groups
            .write()
            .await
            .entry(artist_id.to_string())
            .or_default()
            .push(release_group);
    }

    /// Make the next call fail.
    pub async fn set_next_error(&self, error: InventoryError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn recorded_release_group_queries(&self) -> Vec<String> {
        self.release_group_queries.read().await.clone()
    }

    async fn take_error(&self) -> Result<(), InventoryError> {
        match self.next_error.write().await.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Inventory for MockInventory {
    async fn list_artists(&self) -> Result<Vec<InventoryArtist>, InventoryError> {
        self.take_error().await?;
        Ok(self.artists.read().await.clone())
    }

    async fn list_release_groups(
        &self,
        artist_id: &str,
    ) -> Result<Vec<InventoryReleaseGroup>, InventoryError> {
        self.take_error().await?;
        self.release_group_queries
            .write()
            .await
            .push(artist_id.to_string());
        Ok(self
            .release_groups
            .read()
            .await
            .get(artist_id)
            .cloned()
            .unwrap_or_default())
    }
}
