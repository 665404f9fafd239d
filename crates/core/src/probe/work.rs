//! Work items handed to the probe engine.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ProbeOutcome, ProbeTarget};
use crate::ledger::{ArtistRecord, CacheStatus, LedgerError, LedgerStore, ReleaseGroupRecord};

/// Warming phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Artist,
    TextSearch,
    ReleaseGroup,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Artist => "artist",
            Phase::TextSearch => "text_search",
            Phase::ReleaseGroup => "release_group",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an entity was selected this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionReason {
    /// Never probed.
    New,
    /// Probed before without success.
    FailedRetry,
    /// Successful, re-probed because a force flag is set.
    Forced,
    /// Successful, but older than the freshness window.
    Stale,
}

/// The entity a work item probes, with its ledger state at selection time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkSubject {
    ArtistLookup(ArtistRecord),
    TextSearch { artist: ArtistRecord, query: String },
    ReleaseGroup(ReleaseGroupRecord),
}

/// A ledger record paired with why it was selected and how many attempts it may use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub subject: WorkSubject,
    pub reason: SelectionReason,
    pub budget: u32,
}

impl WorkItem {
    pub fn phase(&self) -> Phase {
        match self.subject {
            WorkSubject::ArtistLookup(_) => Phase::Artist,
            WorkSubject::TextSearch { .. } => Phase::TextSearch,
            WorkSubject::ReleaseGroup(_) => Phase::ReleaseGroup,
        }
    }

    pub fn target(&self) -> ProbeTarget {
        match &self.subject {
            WorkSubject::ArtistLookup(artist) => ProbeTarget::artist(&artist.id),
            WorkSubject::TextSearch { query, .. } => ProbeTarget::text_search(query),
            WorkSubject::ReleaseGroup(rg) => ProbeTarget::release_group(&rg.id),
        }
    }

    /// Human-readable label for log lines.
    pub fn label(&self) -> String {
        match &self.subject {
            WorkSubject::ArtistLookup(artist) => artist.label().to_string(),
            WorkSubject::TextSearch { query, .. } => format!("\"{}\"", query),
            WorkSubject::ReleaseGroup(rg) => match &rg.artist_name {
                Some(artist) => format!("{} / {}", artist, rg.label()),
                None => rg.label().to_string(),
            },
        }
    }

    /// Ledger update recording a finished entity.
    pub fn into_update(
        self,
        success: bool,
        attempts: u32,
        last_outcome: Option<&ProbeOutcome>,
        now: DateTime<Utc>,
    ) -> LedgerUpdate {
        let status = if success {
            CacheStatus::Success
        } else {
            CacheStatus::Failed
        };
        let code = last_outcome.map(ProbeOutcome::code_label);

        match self.subject {
            WorkSubject::ArtistLookup(mut artist) => {
                artist.status = status;
                artist.attempts = attempts;
                artist.last_status_code = code;
                artist.last_checked = Some(now);
                LedgerUpdate::Artist(artist)
            }
            WorkSubject::TextSearch { mut artist, .. } => {
                artist.text_search_attempted = true;
                artist.text_search_success = success;
                artist.text_search_last_checked = Some(now);
                LedgerUpdate::Artist(artist)
            }
            WorkSubject::ReleaseGroup(mut rg) => {
                rg.status = status;
                rg.attempts = attempts;
                rg.last_status_code = code;
                rg.last_checked = Some(now);
                LedgerUpdate::ReleaseGroup(rg)
            }
        }
    }
}

/// A record to stage in the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerUpdate {
    Artist(ArtistRecord),
    ReleaseGroup(ReleaseGroupRecord),
}

impl LedgerUpdate {
    pub fn stage(self, ledger: &dyn LedgerStore) -> Result<(), LedgerError> {
        match self {
            LedgerUpdate::Artist(record) => ledger.upsert_artist(record),
            LedgerUpdate::ReleaseGroup(record) => ledger.upsert_release_group(record),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_artist_update() {
        let item = WorkItem {
            subject: WorkSubject::ArtistLookup(ArtistRecord::pending("a1", Some("A".into()))),
            reason: SelectionReason::New,
            budget: 25,
        };
        assert_eq!(item.phase(), Phase::Artist);
        assert_eq!(item.target(), ProbeTarget::artist("a1"));

        let update = item.into_update(true, 2, Some(&ProbeOutcome::Status(200)), now());
        let LedgerUpdate::Artist(artist) = update else {
            panic!("expected artist update");
        };
        assert_eq!(artist.status, CacheStatus::Success);
        assert_eq!(artist.attempts, 2);
        assert_eq!(artist.last_status_code.as_deref(), Some("200"));
        assert_eq!(artist.last_checked, Some(now()));
    }

    #[test]
    fn test_text_search_update_keeps_lookup_state() {
        let mut artist = ArtistRecord::pending("a1", Some("A".into()));
        artist.status = CacheStatus::Success;
        artist.attempts = 3;
        let item = WorkItem {
            subject: WorkSubject::TextSearch {
                artist,
                query: "a".into(),
            },
            reason: SelectionReason::New,
            budget: 25,
        };

        let update = item.into_update(false, 25, Some(&ProbeOutcome::Timeout), now());
        let LedgerUpdate::Artist(artist) = update else {
            panic!("expected artist update");
        };
        assert_eq!(artist.status, CacheStatus::Success);
        assert_eq!(artist.attempts, 3);
        assert!(artist.text_search_attempted);
        assert!(!artist.text_search_success);
        assert_eq!(artist.text_search_last_checked, Some(now()));
    }

    #[test]
    fn test_release_group_update() {
        let rg = ReleaseGroupRecord::pending("rg1", "a1", Some("A".into()), Some("T".into()));
        let item = WorkItem {
            subject: WorkSubject::ReleaseGroup(rg),
            reason: SelectionReason::Stale,
            budget: 15,
        };
        assert_eq!(item.label(), "A / T");

        let update = item.into_update(false, 15, Some(&ProbeOutcome::Status(503)), now());
        let LedgerUpdate::ReleaseGroup(rg) = update else {
            panic!("expected release group update");
        };
        assert_eq!(rg.status, CacheStatus::Failed);
        assert_eq!(rg.attempts, 15);
        assert_eq!(rg.last_status_code.as_deref(), Some("503"));
    }
}
