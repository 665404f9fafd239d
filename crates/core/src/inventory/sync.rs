use std::collections::HashMap;

use serde::Serialize;
use tracing::info;

use super::InventorySnapshot;
use crate::ledger::{
    is_excluded_artist, ArtistRecord, LedgerError, LedgerFilter, LedgerStore, ReleaseGroupRecord,
};

/// Ledger changes staged by an inventory sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub artists_new: usize,
    pub artists_renamed: usize,
    pub release_groups_new: usize,
    pub release_groups_updated: usize,
}

impl SyncStats {
    pub fn changed(&self) -> bool {
        self.artists_new + self.artists_renamed + self.release_groups_new + self.release_groups_updated
            > 0
    }
}

/// Stage the inventory into the ledger.
///
/// Unknown entities are inserted as pending. Known ones only get their
/// display fields refreshed; status and attempts are untouched. Release
/// groups are synced only when the snapshot carries them. The caller commits.
pub fn sync_inventory(
    ledger: &dyn LedgerStore,
    snapshot: &InventorySnapshot,
) -> Result<SyncStats, LedgerError> {
    let filter = LedgerFilter::new();
    let artists: HashMap<String, ArtistRecord> = ledger
        .list_artists(&filter)?
        .into_iter()
        .map(|a| (a.id.clone(), a))
        .collect();

    let mut stats = SyncStats::default();

    for artist in &snapshot.artists {
        if is_excluded_artist(&artist.id) {
            continue;
        }
        let name = artist
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());

        match artists.get(&artist.id) {
            None => {
                ledger.upsert_artist(ArtistRecord::pending(&artist.id, name.map(String::from)))?;
                stats.artists_new += 1;
            }
            Some(existing) => {
                if let Some(name) = name {
                    if existing.name.as_deref() != Some(name) {
                        let mut updated = existing.clone();
                        updated.name = Some(name.to_string());
                        ledger.upsert_artist(updated)?;
                        stats.artists_renamed += 1;
                    }
                }
            }
        }
    }

    if !snapshot.release_groups.is_empty() {
        let mut release_groups: HashMap<String, ReleaseGroupRecord> = ledger
            .list_release_groups(&filter)?
            .into_iter()
            .map(|rg| (rg.id.clone(), rg))
            .collect();

        for artist in &snapshot.artists {
            if is_excluded_artist(&artist.id) {
                continue;
            }
            let artist_name = artist
                .name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty());

            for rg in snapshot.release_groups_for(&artist.id) {
                let title = rg.title.as_deref().map(str::trim).filter(|t| !t.is_empty());

                match release_groups.get(&rg.id) {
                    None => {
                        let record = ReleaseGroupRecord::pending(
                            &rg.id,
                            &artist.id,
                            artist_name.map(String::from),
                            title.map(String::from),
                        );
                        ledger.upsert_release_group(record.clone())?;
                        release_groups.insert(rg.id.clone(), record);
                        stats.release_groups_new += 1;
                    }
                    Some(existing) => {
                        let mut updated = existing.clone();
                        if updated.artist_id != artist.id {
                            updated.artist_id = artist.id.clone();
                        }
                        if let Some(artist_name) = artist_name {
                            updated.artist_name = Some(artist_name.to_string());
                        }
                        if let Some(title) = title {
                            updated.title = Some(title.to_string());
                        }
                        if &updated != existing {
                            ledger.upsert_release_group(updated.clone())?;
                            release_groups.insert(rg.id.clone(), updated);
                            stats.release_groups_updated += 1;
                        }
                    }
                }
            }
        }
    }

    info!(
        artists_new = stats.artists_new,
        artists_renamed = stats.artists_renamed,
        release_groups_new = stats.release_groups_new,
        release_groups_updated = stats.release_groups_updated,
        "Synced inventory into ledger"
    );

    Ok(stats)
}
