use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info};

use super::ManualEntries;
use crate::ledger::{
    is_excluded_artist, ArtistRecord, LedgerError, LedgerFilter, LedgerStore, ReleaseGroupRecord,
};

/// Outcome of merging manual declarations into the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub artists_new: usize,
    pub artists_updated: usize,
    pub release_groups_new: usize,
    pub release_groups_updated: usize,
}

impl MergeStats {
    pub fn changed(&self) -> bool {
        self.artists_new + self.artists_updated + self.release_groups_new + self.release_groups_updated
            > 0
    }
}

/// Stage manual declarations into the ledger.
///
/// Absent artists and release groups are inserted as pending. Existing
/// records only get their display name or owner refreshed; status and
/// attempts are never reset, so merging the same declarations twice is a
/// no-op. The caller commits.
pub fn merge_manual_entries(
    ledger: &dyn LedgerStore,
    entries: &ManualEntries,
) -> Result<MergeStats, LedgerError> {
    let filter = LedgerFilter::new();
    let mut artists: HashMap<String, ArtistRecord> = ledger
        .list_artists(&filter)?
        .into_iter()
        .map(|a| (a.id.clone(), a))
        .collect();
    let mut release_groups: HashMap<String, ReleaseGroupRecord> = ledger
        .list_release_groups(&filter)?
        .into_iter()
        .map(|rg| (rg.id.clone(), rg))
        .collect();

    let mut stats = MergeStats::default();

    for declared in &entries.artists {
        if is_excluded_artist(&declared.id) {
            debug!(artist_id = %declared.id, "Skipping excluded artist in manual entries");
            continue;
        }

        match artists.get_mut(&declared.id) {
            None => {
                let record = ArtistRecord::pending(&declared.id, Some(declared.name.clone()));
                ledger.upsert_artist(record.clone())?;
                artists.insert(declared.id.clone(), record);
                stats.artists_new += 1;
            }
            Some(existing) if existing.name.as_deref() != Some(declared.name.as_str()) => {
                existing.name = Some(declared.name.clone());
                ledger.upsert_artist(existing.clone())?;
                stats.artists_updated += 1;
            }
            Some(_) => {}
        }

        for rg_id in &declared.release_groups {
            match release_groups.get_mut(rg_id) {
                None => {
                    let record = ReleaseGroupRecord::pending(
                        rg_id,
                        &declared.id,
                        Some(declared.name.clone()),
                        None,
                    );
                    ledger.upsert_release_group(record.clone())?;
                    release_groups.insert(rg_id.clone(), record);
                    stats.release_groups_new += 1;
                }
                Some(existing)
                    if existing.artist_id != declared.id
                        || existing.artist_name.as_deref() != Some(declared.name.as_str()) =>
                {
                    existing.artist_id = declared.id.clone();
                    existing.artist_name = Some(declared.name.clone());
                    ledger.upsert_release_group(existing.clone())?;
                    stats.release_groups_updated += 1;
                }
                Some(_) => {}
            }
        }
    }

    info!(
        artists_new = stats.artists_new,
        artists_updated = stats.artists_updated,
        release_groups_new = stats.release_groups_new,
        release_groups_updated = stats.release_groups_updated,
        "Merged manual entries"
    );

    Ok(stats)
}
