//! Upstream inventory: the artists and release groups a Lidarr instance manages.

mod lidarr;
mod sync;

pub use lidarr::LidarrClient;
pub use sync::{sync_inventory, SyncStats};

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::ledger::is_excluded_artist;

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Inventory rejected the API key (HTTP {0})")]
    Unauthorized(u16),

    #[error("Inventory API error at {path}: HTTP {status}")]
    Api { path: String, status: u16 },

    #[error("No known endpoint serves '{0}'")]
    NoEndpoint(String),

    #[error("Failed to parse inventory response: {0}")]
    Parse(String),
}

/// An artist as listed upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryArtist {
    pub id: String,
    pub name: Option<String>,
}

/// A release group as listed upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryReleaseGroup {
    pub id: String,
    pub title: Option<String>,
}

/// Source of the entities to warm. Any error is fatal to the run.
#[async_trait]
pub trait Inventory: Send + Sync {
    async fn list_artists(&self) -> Result<Vec<InventoryArtist>, InventoryError>;

    async fn list_release_groups(
        &self,
        artist_id: &str,
    ) -> Result<Vec<InventoryReleaseGroup>, InventoryError>;
}

/// Everything fetched from the inventory for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventorySnapshot {
    /// Artists in inventory order, excluded artists removed.
    pub artists: Vec<InventoryArtist>,
    /// Release groups keyed by owning artist id. Empty when not requested.
    pub release_groups: HashMap<String, Vec<InventoryReleaseGroup>>,
}

impl InventorySnapshot {
    /// Fetch artists, and their release groups when `include_release_groups` is set.
    pub async fn fetch(
        inventory: &dyn Inventory,
        include_release_groups: bool,
    ) -> Result<Self, InventoryError> {
        let artists: Vec<InventoryArtist> = inventory
            .list_artists()
            .await?
            .into_iter()
            .filter(|a| !a.id.trim().is_empty() && !is_excluded_artist(&a.id))
            .collect();

        let mut release_groups = HashMap::new();
        if include_release_groups {
            for artist in &artists {
                let groups = inventory.list_release_groups(&artist.id).await?;
                if !groups.is_empty() {
                    release_groups.insert(artist.id.clone(), groups);
                }
            }
        }

        let snapshot = Self {
            artists,
            release_groups,
        };
        info!(
            artists = snapshot.artists.len(),
            release_groups = snapshot.release_group_count(),
            "Fetched inventory"
        );
        Ok(snapshot)
    }

    pub fn release_group_count(&self) -> usize {
        self.release_groups.values().map(Vec::len).sum()
    }

    pub fn release_groups_for(&self, artist_id: &str) -> &[InventoryReleaseGroup] {
        self.release_groups
            .get(artist_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::VARIOUS_ARTISTS_ID;
    use crate::testing::{fixtures, MockInventory};

    #[tokio::test]
    async fn test_fetch_skips_excluded_artist() {
        let inventory = MockInventory::new();
        inventory.add_artist(fixtures::inventory_artist("a1", "Artist One")).await;
        inventory
            .add_artist(fixtures::inventory_artist(VARIOUS_ARTISTS_ID, "Various Artists"))
            .await;
        inventory
            .add_release_group("a1", fixtures::inventory_release_group("rg1", "Album"))
            .await;
        inventory
            .add_release_group(
                VARIOUS_ARTISTS_ID,
                fixtures::inventory_release_group("rg-va", "Compilation"),
            )
            .await;

        let snapshot = InventorySnapshot::fetch(&inventory, true).await.unwrap();
        assert_eq!(snapshot.artists.len(), 1);
        assert_eq!(snapshot.release_group_count(), 1);
        assert_eq!(snapshot.release_groups_for("a1")[0].id, "rg1");
        assert!(inventory
            .recorded_release_group_queries()
            .await
            .iter()
            .all(|id| id != VARIOUS_ARTISTS_ID));
    }

    #[tokio::test]
    async fn test_fetch_without_release_groups() {
        let inventory = MockInventory::new();
        inventory.add_artist(fixtures::inventory_artist("a1", "Artist One")).await;
        inventory
            .add_release_group("a1", fixtures::inventory_release_group("rg1", "Album"))
            .await;

        let snapshot = InventorySnapshot::fetch(&inventory, false).await.unwrap();
        assert_eq!(snapshot.release_group_count(), 0);
        assert!(inventory.recorded_release_group_queries().await.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_propagates_errors() {
        let inventory = MockInventory::new();
        inventory
            .set_next_error(InventoryError::Http("connection refused".into()))
            .await;
        assert!(InventorySnapshot::fetch(&inventory, false).await.is_err());
    }
}
