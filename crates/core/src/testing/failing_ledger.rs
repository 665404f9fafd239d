//! Ledger whose commits start failing after a configurable count.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::ledger::{
    ArtistRecord, CommitStats, LedgerError, LedgerFilter, LedgerStore, ReleaseGroupRecord,
    SqliteLedger,
};

/// In-memory SQLite ledger that rejects every commit past the allowed count.
pub struct FailingLedger {
    inner: SqliteLedger,
    commits_allowed: AtomicUsize,
    commit_attempts: AtomicUsize,
}

impl FailingLedger {
    pub fn in_memory() -> Result<Self, LedgerError> {
        Ok(Self {
            inner: SqliteLedger::in_memory()?,
            commits_allowed: AtomicUsize::new(usize::MAX),
            commit_attempts: AtomicUsize::new(0),
        })
    }

    /// Let `commits` more commits through, then fail all later ones.
    pub fn fail_commits_after(&self, commits: usize) {
        let attempted = self.commit_attempts.load(Ordering::SeqCst);
        self.commits_allowed
            .store(attempted.saturating_add(commits), Ordering::SeqCst);
    }

    pub fn commit_attempts(&self) -> usize {
        self.commit_attempts.load(Ordering::SeqCst)
    }
}

impl LedgerStore for FailingLedger {
    fn backend_name(&self) -> &'static str {
        "failing"
    }

    fn is_empty(&self) -> Result<bool, LedgerError> {
        self.inner.is_empty()
    }

    fn list_artists(&self, filter: &LedgerFilter) -> Result<Vec<ArtistRecord>, LedgerError> {
        self.inner.list_artists(filter)
    }

    fn list_release_groups(
        &self,
        filter: &LedgerFilter,
    ) -> Result<Vec<ReleaseGroupRecord>, LedgerError> {
        self.inner.list_release_groups(filter)
    }

    fn upsert_artist(&self, record: ArtistRecord) -> Result<(), LedgerError> {
        self.inner.upsert_artist(record)
    }

    fn upsert_release_group(&self, record: ReleaseGroupRecord) -> Result<(), LedgerError> {
        self.inner.upsert_release_group(record)
    }

    fn pending_writes(&self) -> Result<usize, LedgerError> {
        self.inner.pending_writes()
    }

    fn commit_batch(&self) -> Result<CommitStats, LedgerError> {
        let attempt = self.commit_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt > self.commits_allowed.load(Ordering::SeqCst) {
            return Err(LedgerError::Io {
                path: "failing-ledger".to_string(),
                message: "disk full".to_string(),
            });
        }
        self.inner.commit_batch()
    }
}
