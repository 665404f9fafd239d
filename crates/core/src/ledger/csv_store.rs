//! Flat-file ledger backend: one CSV per entity kind.
//!
//! The committed rows live in memory; a commit rewrites the affected file
//! through a temporary file and an atomic rename.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::types::{format_timestamp, non_empty, parse_flag, parse_timestamp};
use super::{
    ArtistRecord, CacheStatus, CommitStats, LedgerError, LedgerFilter, LedgerStore,
    ReleaseGroupRecord, StagedWrites,
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct ArtistRow {
    #[serde(default)]
    mbid: String,
    #[serde(default)]
    artist_name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    attempts: String,
    #[serde(default)]
    last_status_code: String,
    #[serde(default)]
    last_checked: String,
    #[serde(default)]
    text_search_attempted: String,
    #[serde(default)]
    text_search_success: String,
    #[serde(default)]
    text_search_last_checked: String,
}

impl ArtistRow {
    fn into_record(self) -> Option<ArtistRecord> {
        let id = self.mbid.trim().to_string();
        if id.is_empty() {
            return None;
        }
        Some(ArtistRecord {
            id,
            name: non_empty(self.artist_name),
            status: CacheStatus::parse(&self.status),
            attempts: self.attempts.trim().parse().unwrap_or(0),
            last_status_code: non_empty(self.last_status_code),
            last_checked: parse_timestamp(&self.last_checked),
            text_search_attempted: parse_flag(&self.text_search_attempted),
            text_search_success: parse_flag(&self.text_search_success),
            text_search_last_checked: parse_timestamp(&self.text_search_last_checked),
        })
    }

    fn from_record(record: &ArtistRecord) -> Self {
        Self {
            mbid: record.id.clone(),
            artist_name: record.name.clone().unwrap_or_default(),
            status: record.status.as_str().to_string(),
            attempts: record.attempts.to_string(),
            last_status_code: record.last_status_code.clone().unwrap_or_default(),
            last_checked: format_timestamp(record.last_checked),
            text_search_attempted: record.text_search_attempted.to_string(),
            text_search_success: record.text_search_success.to_string(),
            text_search_last_checked: format_timestamp(record.text_search_last_checked),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ReleaseGroupRow {
    #[serde(default)]
    rg_mbid: String,
    #[serde(default)]
    rg_title: String,
    #[serde(default)]
    artist_mbid: String,
    #[serde(default)]
    artist_name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    attempts: String,
    #[serde(default)]
    last_status_code: String,
    #[serde(default)]
    last_checked: String,
}

impl ReleaseGroupRow {
    fn into_record(self) -> Option<ReleaseGroupRecord> {
        let id = self.rg_mbid.trim().to_string();
        if id.is_empty() {
            return None;
        }
        Some(ReleaseGroupRecord {
            id,
            artist_id: self.artist_mbid.trim().to_string(),
            artist_name: non_empty(self.artist_name),
            title: non_empty(self.rg_title),
            status: CacheStatus::parse(&self.status),
            attempts: self.attempts.trim().parse().unwrap_or(0),
            last_status_code: non_empty(self.last_status_code),
            last_checked: parse_timestamp(&self.last_checked),
        })
    }

    fn from_record(record: &ReleaseGroupRecord) -> Self {
        Self {
            rg_mbid: record.id.clone(),
            rg_title: record.title.clone().unwrap_or_default(),
            artist_mbid: record.artist_id.clone(),
            artist_name: record.artist_name.clone().unwrap_or_default(),
            status: record.status.as_str().to_string(),
            attempts: record.attempts.to_string(),
            last_status_code: record.last_status_code.clone().unwrap_or_default(),
            last_checked: format_timestamp(record.last_checked),
        }
    }
}

/// Rows keyed by id, kept in first-insertion order.
#[derive(Debug, Clone)]
struct Table<T> {
    rows: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T> Table<T> {
    fn upsert(&mut self, id: &str, row: T) {
        match self.index.get(id) {
            Some(&idx) => self.rows[idx] = row,
            None => {
                self.index.insert(id.to_string(), self.rows.len());
                self.rows.push(row);
            }
        }
    }
}

#[derive(Debug, Default)]
struct CsvState {
    artists: Table<ArtistRecord>,
    release_groups: Table<ReleaseGroupRecord>,
    staged: StagedWrites,
}

/// CSV-backed ledger.
pub struct CsvLedger {
    artists_path: PathBuf,
    release_groups_path: PathBuf,
    state: Mutex<CsvState>,
}

impl CsvLedger {
    /// Open the ledger files. Missing files mean an empty ledger.
    pub fn open(artists_path: &Path, release_groups_path: &Path) -> Result<Self, LedgerError> {
        let mut state = CsvState::default();

        for row in read_rows::<ArtistRow>(artists_path)? {
            if let Some(record) = row.into_record() {
                let id = record.id.clone();
                state.artists.upsert(&id, record);
            }
        }
        for row in read_rows::<ReleaseGroupRow>(release_groups_path)? {
            if let Some(record) = row.into_record() {
                let id = record.id.clone();
                state.release_groups.upsert(&id, record);
            }
        }

        debug!(
            artists = state.artists.rows.len(),
            release_groups = state.release_groups.rows.len(),
            path = %artists_path.display(),
            "Opened CSV ledger"
        );

        Ok(Self {
            artists_path: artists_path.to_path_buf(),
            release_groups_path: release_groups_path.to_path_buf(),
            state: Mutex::new(state),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, CsvState>, LedgerError> {
        self.state.lock().map_err(|_| LedgerError::LockPoisoned)
    }

    fn apply(
        &self,
        state: &mut CsvState,
        artists: &[ArtistRecord],
        release_groups: &[ReleaseGroupRecord],
    ) -> Result<(), LedgerError> {
        if !artists.is_empty() {
            let mut table = state.artists.clone();
            for record in artists {
                table.upsert(&record.id, record.clone());
            }
            let rows: Vec<ArtistRow> = table.rows.iter().map(ArtistRow::from_record).collect();
            write_rows(&self.artists_path, &rows)?;
            state.artists = table;
        }

        if !release_groups.is_empty() {
            let mut table = state.release_groups.clone();
            for record in release_groups {
                table.upsert(&record.id, record.clone());
            }
            let rows: Vec<ReleaseGroupRow> = table
                .rows
                .iter()
                .map(ReleaseGroupRow::from_record)
                .collect();
            write_rows(&self.release_groups_path, &rows)?;
            state.release_groups = table;
        }

        Ok(())
    }
}

impl LedgerStore for CsvLedger {
    fn backend_name(&self) -> &'static str {
        "csv"
    }

    fn is_empty(&self) -> Result<bool, LedgerError> {
        Ok(self.lock()?.artists.rows.is_empty())
    }

    fn list_artists(&self, filter: &LedgerFilter) -> Result<Vec<ArtistRecord>, LedgerError> {
        let state = self.lock()?;
        Ok(state
            .artists
            .rows
            .iter()
            .filter(|a| filter.matches_artist(a))
            .cloned()
            .collect())
    }

    fn list_release_groups(
        &self,
        filter: &LedgerFilter,
    ) -> Result<Vec<ReleaseGroupRecord>, LedgerError> {
        let state = self.lock()?;
        Ok(state
            .release_groups
            .rows
            .iter()
            .filter(|rg| filter.matches_release_group(rg))
            .cloned()
            .collect())
    }

    fn upsert_artist(&self, record: ArtistRecord) -> Result<(), LedgerError> {
        self.lock()?.staged.stage_artist(record);
        Ok(())
    }

    fn upsert_release_group(&self, record: ReleaseGroupRecord) -> Result<(), LedgerError> {
        self.lock()?.staged.stage_release_group(record);
        Ok(())
    }

    fn pending_writes(&self) -> Result<usize, LedgerError> {
        Ok(self.lock()?.staged.len())
    }

    fn commit_batch(&self) -> Result<CommitStats, LedgerError> {
        let mut state = self.lock()?;
        if state.staged.is_empty() {
            return Ok(CommitStats::default());
        }

        let (artists, release_groups) = state.staged.take();
        let stats = CommitStats {
            artists_written: artists.len(),
            release_groups_written: release_groups.len(),
        };

        if let Err(e) = self.apply(&mut state, &artists, &release_groups) {
            state.staged.restore(artists, release_groups);
            return Err(e);
        }

        debug!(
            artists = stats.artists_written,
            release_groups = stats.release_groups_written,
            "Committed CSV ledger batch"
        );
        Ok(stats)
    }
}

fn io_error(path: &Path, e: impl std::fmt::Display) -> LedgerError {
    LedgerError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

fn csv_error(path: &Path, e: impl std::fmt::Display) -> LedgerError {
    LedgerError::Csv {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

fn read_rows<R>(path: &Path) -> Result<Vec<R>, LedgerError>
where
    R: for<'de> Deserialize<'de>,
{
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_path(path)
        .map_err(|e| csv_error(path, e))?;

    reader
        .deserialize()
        .collect::<Result<Vec<R>, _>>()
        .map_err(|e| csv_error(path, e))
}

fn write_rows<R: Serialize>(path: &Path, rows: &[R]) -> Result<(), LedgerError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let mut writer = csv::Writer::from_path(&tmp_path).map_err(|e| csv_error(&tmp_path, e))?;
    for row in rows {
        writer.serialize(row).map_err(|e| csv_error(&tmp_path, e))?;
    }
    let file = writer
        .into_inner()
        .map_err(|e| io_error(&tmp_path, e.error()))?;
    file.sync_all().map_err(|e| io_error(&tmp_path, e))?;

    fs::rename(&tmp_path, path).map_err(|e| io_error(path, e))
}
