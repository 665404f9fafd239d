//! Durable per-entity warming state.
//!
//! Two interchangeable backends implement [`LedgerStore`]: a pair of CSV files
//! (human-inspectable, rewritten on commit) and a SQLite database (row-level
//! upserts). Writes are staged in memory and become durable on
//! [`LedgerStore::commit_batch`]; reads always see committed state.

mod csv_store;
mod sqlite;
mod stats;
mod types;

pub use csv_store::CsvLedger;
pub use sqlite::SqliteLedger;
pub use stats::{LedgerStats, StatusCounts};
pub use types::{
    is_excluded_artist, ArtistRecord, CacheStatus, CommitStats, LedgerFilter, LedgerSnapshot,
    ReleaseGroupRecord, EXCLUDED_ARTIST_IDS, VARIOUS_ARTISTS_ID,
};

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::config::{LedgerBackend, LedgerConfig};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },

    #[error("CSV error in {path}: {message}")]
    Csv { path: String, message: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Ledger lock poisoned")]
    LockPoisoned,
}

/// Storage interface shared by both ledger backends.
pub trait LedgerStore: Send + Sync {
    /// Short backend name for logs ("csv" or "sqlite").
    fn backend_name(&self) -> &'static str;

    /// True when no artist has ever been committed.
    fn is_empty(&self) -> Result<bool, LedgerError>;

    fn list_artists(&self, filter: &LedgerFilter) -> Result<Vec<ArtistRecord>, LedgerError>;

    fn list_release_groups(
        &self,
        filter: &LedgerFilter,
    ) -> Result<Vec<ReleaseGroupRecord>, LedgerError>;

    /// Stage an insert-or-replace keyed by artist id.
    fn upsert_artist(&self, record: ArtistRecord) -> Result<(), LedgerError>;

    /// Stage an insert-or-replace keyed by release group id.
    fn upsert_release_group(&self, record: ReleaseGroupRecord) -> Result<(), LedgerError>;

    /// Number of staged, uncommitted records.
    fn pending_writes(&self) -> Result<usize, LedgerError>;

    /// Make every staged write durable.
    fn commit_batch(&self) -> Result<CommitStats, LedgerError>;

    /// Everything committed, in insertion order.
    fn load(&self) -> Result<LedgerSnapshot, LedgerError> {
        let filter = LedgerFilter::new();
        Ok(LedgerSnapshot {
            artists: self.list_artists(&filter)?,
            release_groups: self.list_release_groups(&filter)?,
        })
    }
}

/// Open the backend selected by configuration.
pub fn open_ledger(config: &LedgerConfig) -> Result<Arc<dyn LedgerStore>, LedgerError> {
    match config.backend {
        LedgerBackend::Csv => Ok(Arc::new(CsvLedger::open(
            &config.artists_csv_path,
            &config.release_groups_csv_path,
        )?)),
        LedgerBackend::Sqlite => Ok(Arc::new(SqliteLedger::new(&config.db_path)?)),
    }
}

/// Writes staged between commits. A later upsert of the same id replaces the earlier one.
#[derive(Debug, Default)]
pub(crate) struct StagedWrites {
    artists: Vec<ArtistRecord>,
    artist_index: HashMap<String, usize>,
    release_groups: Vec<ReleaseGroupRecord>,
    release_group_index: HashMap<String, usize>,
}

impl StagedWrites {
    pub(crate) fn stage_artist(&mut self, record: ArtistRecord) {
        match self.artist_index.get(&record.id) {
            Some(&idx) => self.artists[idx] = record,
            None => {
                self.artist_index
                    .insert(record.id.clone(), self.artists.len());
                self.artists.push(record);
            }
        }
    }

    pub(crate) fn stage_release_group(&mut self, record: ReleaseGroupRecord) {
        match self.release_group_index.get(&record.id) {
            Some(&idx) => self.release_groups[idx] = record,
            None => {
                self.release_group_index
                    .insert(record.id.clone(), self.release_groups.len());
                self.release_groups.push(record);
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.artists.len() + self.release_groups.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain staged writes in staging order.
    pub(crate) fn take(&mut self) -> (Vec<ArtistRecord>, Vec<ReleaseGroupRecord>) {
        self.artist_index.clear();
        self.release_group_index.clear();
        (
            std::mem::take(&mut self.artists),
            std::mem::take(&mut self.release_groups),
        )
    }

    /// Put back writes that failed to commit, ahead of anything staged since.
    pub(crate) fn restore(
        &mut self,
        artists: Vec<ArtistRecord>,
        release_groups: Vec<ReleaseGroupRecord>,
    ) {
        let newer = self.take();
        for record in artists.into_iter().chain(newer.0) {
            self.stage_artist(record);
        }
        for record in release_groups.into_iter().chain(newer.1) {
            self.stage_release_group(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staged_writes_replace_same_id() {
        let mut staged = StagedWrites::default();
        staged.stage_artist(ArtistRecord::pending("a1", Some("First".into())));
        staged.stage_artist(ArtistRecord::pending("a2", None));
        staged.stage_artist(ArtistRecord::pending("a1", Some("Second".into())));
        assert_eq!(staged.len(), 2);

        let (artists, rgs) = staged.take();
        assert!(rgs.is_empty());
        assert_eq!(artists[0].name.as_deref(), Some("Second"));
        assert_eq!(artists[1].id, "a2");
        assert!(staged.is_empty());
    }

    #[test]
    fn test_restore_keeps_newer_writes() {
        let mut staged = StagedWrites::default();
        staged.stage_artist(ArtistRecord::pending("a1", Some("Old".into())));
        let (artists, rgs) = staged.take();

        staged.stage_artist(ArtistRecord::pending("a1", Some("New".into())));
        staged.restore(artists, rgs);

        let (artists, _) = staged.take();
        assert_eq!(artists.len(), 1);
        assert_eq!(artists[0].name.as_deref(), Some("New"));
    }

    #[test]
    fn test_open_ledger_selects_backend() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = LedgerConfig {
            artists_csv_path: dir.path().join("a.csv"),
            release_groups_csv_path: dir.path().join("rg.csv"),
            db_path: dir.path().join("cache.db"),
            ..LedgerConfig::default()
        };

        let ledger = open_ledger(&config).unwrap();
        assert_eq!(ledger.backend_name(), "csv");

        config.backend = LedgerBackend::Sqlite;
        let ledger = open_ledger(&config).unwrap();
        assert_eq!(ledger.backend_name(), "sqlite");
        assert!(ledger.is_empty().unwrap());
    }
}
