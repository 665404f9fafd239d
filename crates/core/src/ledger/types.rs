//! Ledger record types and read filters.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// The "Various Artists" aggregate. Its catalog is too large to probe entity by entity.
pub const VARIOUS_ARTISTS_ID: &str = "89ad4ac3-39f7-470e-963a-56509c546377";

/// Artist identifiers skipped by every phase. Never written or deleted, only skipped.
pub const EXCLUDED_ARTIST_IDS: &[&str] = &[VARIOUS_ARTISTS_ID];

/// Whether an artist identifier is in the fixed exclusion set.
pub fn is_excluded_artist(id: &str) -> bool {
    EXCLUDED_ARTIST_IDS.contains(&id)
}

/// Cache status of a ledger entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    #[default]
    Pending,
    Success,
    Failed,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Pending => "pending",
            CacheStatus::Success => "success",
            CacheStatus::Failed => "failed",
        }
    }

    /// Parse a persisted status value.
    ///
    /// Older ledgers use `""` for pending and `"timeout"` for failed; anything
    /// unrecognized reads as pending so the entity gets probed again.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "success" => CacheStatus::Success,
            "failed" | "timeout" => CacheStatus::Failed,
            _ => CacheStatus::Pending,
        }
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-artist processing state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistRecord {
    /// MusicBrainz artist id.
    pub id: String,
    pub name: Option<String>,
    pub status: CacheStatus,
    /// Attempts consumed by the most recent artist lookup pass.
    pub attempts: u32,
    /// Last observed outcome: HTTP code, `TIMEOUT` or `EXC:<kind>`.
    pub last_status_code: Option<String>,
    pub last_checked: Option<DateTime<Utc>>,
    pub text_search_attempted: bool,
    pub text_search_success: bool,
    pub text_search_last_checked: Option<DateTime<Utc>>,
}

impl ArtistRecord {
    /// A freshly discovered artist that has never been probed.
    pub fn pending(id: impl Into<String>, name: Option<String>) -> Self {
        Self {
            id: id.into(),
            name: name.filter(|n| !n.trim().is_empty()),
            status: CacheStatus::Pending,
            attempts: 0,
            last_status_code: None,
            last_checked: None,
            text_search_attempted: false,
            text_search_success: false,
            text_search_last_checked: None,
        }
    }

    /// Display label for log lines.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Trimmed, non-empty display name, if any.
    pub fn search_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

/// Per-release-group processing state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseGroupRecord {
    /// MusicBrainz release group id.
    pub id: String,
    /// Owning artist id.
    pub artist_id: String,
    /// Owning artist name, denormalized for reporting.
    pub artist_name: Option<String>,
    pub title: Option<String>,
    pub status: CacheStatus,
    pub attempts: u32,
    pub last_status_code: Option<String>,
    pub last_checked: Option<DateTime<Utc>>,
}

impl ReleaseGroupRecord {
    pub fn pending(
        id: impl Into<String>,
        artist_id: impl Into<String>,
        artist_name: Option<String>,
        title: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            artist_id: artist_id.into(),
            artist_name: artist_name.filter(|n| !n.trim().is_empty()),
            title: title.filter(|t| !t.trim().is_empty()),
            status: CacheStatus::Pending,
            attempts: 0,
            last_status_code: None,
            last_checked: None,
        }
    }

    pub fn label(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.id)
    }
}

/// Full committed contents of a ledger, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub artists: Vec<ArtistRecord>,
    pub release_groups: Vec<ReleaseGroupRecord>,
}

impl LedgerSnapshot {
    pub fn artist(&self, id: &str) -> Option<&ArtistRecord> {
        self.artists.iter().find(|a| a.id == id)
    }

    pub fn release_group(&self, id: &str) -> Option<&ReleaseGroupRecord> {
        self.release_groups.iter().find(|rg| rg.id == id)
    }
}

/// Result of a batch commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitStats {
    pub artists_written: usize,
    pub release_groups_written: usize,
}

impl CommitStats {
    pub fn is_empty(&self) -> bool {
        self.artists_written == 0 && self.release_groups_written == 0
    }
}

/// Filter for ledger reads.
///
/// All conditions are combined with AND. Both backends apply the same
/// semantics; results keep insertion order.
#[derive(Debug, Clone, Default)]
pub struct LedgerFilter {
    /// Only entities with this status.
    pub status: Option<CacheStatus>,
    /// Skip entities with this status.
    pub exclude_status: Option<CacheStatus>,
    /// Only entities whose `last_checked` is set and at or before this instant.
    pub checked_before: Option<DateTime<Utc>>,
    /// Skip these ids. Release group reads also skip groups owned by them.
    pub excluded_ids: HashSet<String>,
    /// Release group reads only: keep groups owned by one of these artists.
    pub owner_ids: Option<HashSet<String>>,
}

impl LedgerFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: CacheStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn without_status(mut self, status: CacheStatus) -> Self {
        self.exclude_status = Some(status);
        self
    }

    pub fn checked_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.checked_before = Some(cutoff);
        self
    }

    pub fn excluding<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Skip the fixed excluded-artist set.
    pub fn excluding_default_artists(self) -> Self {
        self.excluding(EXCLUDED_ARTIST_IDS.iter().copied())
    }

    pub fn owned_by<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.owner_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    fn matches_common(
        &self,
        id: &str,
        status: CacheStatus,
        last_checked: Option<DateTime<Utc>>,
    ) -> bool {
        if self.excluded_ids.contains(id) {
            return false;
        }
        if self.status.is_some_and(|s| s != status) {
            return false;
        }
        if self.exclude_status == Some(status) {
            return false;
        }
        if let Some(cutoff) = self.checked_before {
            match last_checked {
                Some(ts) if ts <= cutoff => {}
                _ => return false,
            }
        }
        true
    }

    pub fn matches_artist(&self, artist: &ArtistRecord) -> bool {
        self.matches_common(&artist.id, artist.status, artist.last_checked)
    }

    pub fn matches_release_group(&self, rg: &ReleaseGroupRecord) -> bool {
        if self.excluded_ids.contains(&rg.artist_id) {
            return false;
        }
        if let Some(owners) = &self.owner_ids {
            if !owners.contains(&rg.artist_id) {
                return false;
            }
        }
        self.matches_common(&rg.id, rg.status, rg.last_checked)
    }
}

/// Format a timestamp for persistence.
pub(crate) fn format_timestamp(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

/// Parse a persisted timestamp.
///
/// Accepts RFC 3339 (with `Z` or an offset) and naive ISO 8601, which is
/// read as UTC. Empty or unparseable values read as unset.
pub(crate) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

/// Lenient boolean parse for flat-file columns.
pub(crate) fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}

pub(crate) fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_status_parse_legacy_values() {
        assert_eq!(CacheStatus::parse(""), CacheStatus::Pending);
        assert_eq!(CacheStatus::parse("timeout"), CacheStatus::Failed);
        assert_eq!(CacheStatus::parse(" Success "), CacheStatus::Success);
        assert_eq!(CacheStatus::parse("failed"), CacheStatus::Failed);
        assert_eq!(CacheStatus::parse("weird"), CacheStatus::Pending);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2024-03-01T12:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T12:30:00+00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T12:30:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2024-03-01T12:30:00.000000+00:00"),
            Some(expected)
        );
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_timestamp_roundtrip() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(parse_timestamp(&format_timestamp(Some(ts))), Some(ts));
        assert_eq!(format_timestamp(None), "");
    }

    #[test]
    fn test_filter_release_group_excludes_owner() {
        let rg = ReleaseGroupRecord::pending("rg1", VARIOUS_ARTISTS_ID, None, None);
        assert!(LedgerFilter::new().matches_release_group(&rg));
        assert!(!LedgerFilter::new()
            .excluding_default_artists()
            .matches_release_group(&rg));
    }

    #[test]
    fn test_filter_checked_before_skips_unset() {
        let cutoff = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let filter = LedgerFilter::new().checked_before(cutoff);

        let mut artist = ArtistRecord::pending("a1", Some("A".into()));
        assert!(!filter.matches_artist(&artist));

        artist.last_checked = Some(cutoff);
        assert!(filter.matches_artist(&artist));

        artist.last_checked = Some(cutoff + chrono::Duration::seconds(1));
        assert!(!filter.matches_artist(&artist));
    }

    #[test]
    fn test_pending_drops_blank_names() {
        let artist = ArtistRecord::pending("a1", Some("  ".into()));
        assert_eq!(artist.name, None);
        assert_eq!(artist.label(), "a1");
        assert_eq!(artist.search_name(), None);
    }
}
