use serde::Serialize;

use super::{Phase, SelectionReason, WorkItem};

/// Why a phase stopped before its work-set was exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbortReason {
    /// Too many consecutive failing attempts.
    CircuitBreaker { threshold: u32 },
    /// The run driver requested a stop.
    Stopped,
}

/// Work-set composition by selection reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SelectionCounts {
    pub new: usize,
    pub failed_retry: usize,
    pub forced: usize,
    pub stale: usize,
}

impl SelectionCounts {
    pub fn from_items(items: &[WorkItem]) -> Self {
        let mut counts = Self::default();
        for item in items {
            match item.reason {
                SelectionReason::New => counts.new += 1,
                SelectionReason::FailedRetry => counts.failed_retry += 1,
                SelectionReason::Forced => counts.forced += 1,
                SelectionReason::Stale => counts.stale += 1,
            }
        }
        counts
    }
}

/// Outcome of one phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseSummary {
    pub phase: Phase,
    pub selected: usize,
    pub selection: SelectionCounts,
    pub succeeded: usize,
    pub failed: usize,
    /// Started but cancelled between attempts; left untouched in the ledger.
    pub interrupted: usize,
    /// Never handed to a worker because the phase was cancelled.
    pub not_dispatched: usize,
    pub probes_issued: u64,
    pub batches_committed: usize,
    pub elapsed_secs: f64,
    pub aborted: Option<AbortReason>,
}

impl PhaseSummary {
    pub fn new(phase: Phase, items: &[WorkItem]) -> Self {
        Self {
            phase,
            selected: items.len(),
            selection: SelectionCounts::from_items(items),
            succeeded: 0,
            failed: 0,
            interrupted: 0,
            not_dispatched: 0,
            probes_issued: 0,
            batches_committed: 0,
            elapsed_secs: 0.0,
            aborted: None,
        }
    }

    /// Entities that left a worker, whether recorded or not.
    pub fn completed(&self) -> usize {
        self.succeeded + self.failed + self.interrupted
    }

    /// Recorded entities per second.
    pub fn throughput(&self) -> f64 {
        if self.elapsed_secs > 0.0 {
            (self.succeeded + self.failed) as f64 / self.elapsed_secs
        } else {
            0.0
        }
    }

    pub fn success_rate(&self) -> f64 {
        let recorded = self.succeeded + self.failed;
        if recorded == 0 {
            0.0
        } else {
            self.succeeded as f64 / recorded as f64 * 100.0
        }
    }

    pub fn was_aborted(&self) -> bool {
        self.aborted.is_some()
    }
}
