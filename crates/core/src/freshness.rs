//! Re-verification policy for previously cached entities.

use chrono::{DateTime, Duration, Utc};

/// Whether a successful entity checked at `last_checked` must be re-verified at `now`.
///
/// Never stale when `recheck_hours` is 0 or the timestamp is unset. The Unix
/// epoch counts as unset; older ledgers backfill missing timestamps with it.
pub fn is_stale(last_checked: Option<DateTime<Utc>>, recheck_hours: u32, now: DateTime<Utc>) -> bool {
    if recheck_hours == 0 {
        return false;
    }
    match last_checked {
        Some(ts) if ts != DateTime::UNIX_EPOCH => {
            now.signed_duration_since(ts) >= Duration::hours(i64::from(recheck_hours))
        }
        _ => false,
    }
}

/// Freshness window applied to one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    recheck_hours: u32,
}

impl FreshnessPolicy {
    pub fn new(recheck_hours: u32) -> Self {
        Self { recheck_hours }
    }

    pub fn recheck_hours(&self) -> u32 {
        self.recheck_hours
    }

    pub fn is_stale(&self, last_checked: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        is_stale(last_checked, self.recheck_hours, now)
    }
}
