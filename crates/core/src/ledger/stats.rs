//! Aggregate ledger statistics for reporting.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{CacheStatus, LedgerError, LedgerFilter, LedgerStore};
use crate::freshness::FreshnessPolicy;

/// Per-status entity counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub pending: usize,
    /// Successful entities due for re-verification.
    pub stale: usize,
}

impl StatusCounts {
    fn record(&mut self, status: CacheStatus, stale: bool) {
        self.total += 1;
        match status {
            CacheStatus::Success => {
                self.success += 1;
                if stale {
                    self.stale += 1;
                }
            }
            CacheStatus::Failed => self.failed += 1,
            CacheStatus::Pending => self.pending += 1,
        }
    }

    /// Share of entities cached, in percent.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.success as f64 / self.total as f64 * 100.0
        }
    }
}

/// Snapshot of ledger health.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LedgerStats {
    pub backend: String,
    pub artists: StatusCounts,
    pub release_groups: StatusCounts,
    pub text_search_attempted: usize,
    pub text_search_success: usize,
    pub text_search_stale: usize,
    pub recheck_hours: u32,
    pub collected_at: DateTime<Utc>,
}

impl LedgerStats {
    /// Count committed entities, excluding the fixed excluded-artist set.
    pub fn collect(
        ledger: &dyn LedgerStore,
        recheck_hours: u32,
        now: DateTime<Utc>,
    ) -> Result<Self, LedgerError> {
        let policy = FreshnessPolicy::new(recheck_hours);
        let filter = LedgerFilter::new().excluding_default_artists();

        let mut stats = LedgerStats {
            backend: ledger.backend_name().to_string(),
            recheck_hours,
            collected_at: now,
            ..Default::default()
        };

        for artist in ledger.list_artists(&filter)? {
            stats
                .artists
                .record(artist.status, policy.is_stale(artist.last_checked, now));
            if artist.text_search_attempted {
                stats.text_search_attempted += 1;
            }
            if artist.text_search_success {
                stats.text_search_success += 1;
                if policy.is_stale(artist.text_search_last_checked, now) {
                    stats.text_search_stale += 1;
                }
            }
        }

        for rg in ledger.list_release_groups(&filter)? {
            stats
                .release_groups
                .record(rg.status, policy.is_stale(rg.last_checked, now));
        }

        Ok(stats)
    }
}
