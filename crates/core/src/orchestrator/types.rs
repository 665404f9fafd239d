//! Types for the warming orchestrator.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::inventory::SyncStats;
use crate::manual::MergeStats;
use crate::probe::{Phase, PhaseSummary, SelectionCounts};

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Ledger read or write failed.
    #[error("ledger error: {0}")]
    Ledger(#[from] crate::ledger::LedgerError),

    /// The upstream inventory could not be fetched.
    #[error("inventory error: {0}")]
    Inventory(#[from] crate::inventory::InventoryError),
}

/// Why a phase did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Turned off in configuration.
    Disabled,
    /// First run against an empty ledger.
    DiscoveryMode,
    /// The run was stopped before this phase started.
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedPhase {
    pub phase: Phase,
    pub reason: SkipReason,
}

/// Outcome of one warming run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub discovery: bool,
    /// Present when manual entries were merged.
    pub manual: Option<MergeStats>,
    pub sync: SyncStats,
    pub phases: Vec<PhaseSummary>,
    pub skipped: Vec<SkippedPhase>,
}

impl RunSummary {
    pub fn phase(&self, phase: Phase) -> Option<&PhaseSummary> {
        self.phases.iter().find(|p| p.phase == phase)
    }

    pub fn was_aborted(&self) -> bool {
        self.phases.iter().any(PhaseSummary::was_aborted)
    }

    pub fn total_probes(&self) -> u64 {
        self.phases.iter().map(|p| p.probes_issued).sum()
    }

    pub fn elapsed_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

/// Work-set a phase would get, without probing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedPhase {
    pub phase: Phase,
    pub selected: usize,
    pub selection: SelectionCounts,
}

/// Dry-run view of the next run.
///
/// Release group counts assume the artists cached right now; a real run
/// evaluates that after its artist phase.
#[derive(Debug, Clone, Serialize)]
pub struct RunPlan {
    pub discovery: bool,
    pub manual: Option<MergeStats>,
    pub sync: SyncStats,
    pub phases: Vec<PlannedPhase>,
    pub skipped: Vec<SkippedPhase>,
}

impl RunPlan {
    pub fn phase(&self, phase: Phase) -> Option<&PlannedPhase> {
        self.phases.iter().find(|p| p.phase == phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerError;

    #[test]
    fn test_error_display() {
        let err: OrchestratorError = LedgerError::Database("disk full".to_string()).into();
        assert_eq!(err.to_string(), "ledger error: Database error: disk full");
    }

    #[test]
    fn test_skip_reason_serialization() {
        let skipped = SkippedPhase {
            phase: Phase::TextSearch,
            reason: SkipReason::DiscoveryMode,
        };
        let json = serde_json::to_string(&skipped).unwrap();
        assert_eq!(json, r#"{"phase":"text_search","reason":"discovery_mode"}"#);
    }
}
