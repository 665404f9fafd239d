//! Per-entity retry state machine.

use std::time::Duration;

use super::ProbeOutcome;

/// What to do after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// The entity is cached; stop.
    Succeeded,
    /// Wait this long, then attempt again.
    RetryAfter(Duration),
    /// Budget consumed without success.
    Exhausted,
}

/// Decide the next step after attempt number `attempts_used` (1-based).
///
/// Every non-200 outcome is retried the same way until `budget` attempts are
/// spent. A budget of 0 behaves like 1.
pub fn next_step(
    outcome: &ProbeOutcome,
    attempts_used: u32,
    budget: u32,
    delay: Duration,
) -> RetryDecision {
    if outcome.is_success() {
        RetryDecision::Succeeded
    } else if attempts_used >= budget.max(1) {
        RetryDecision::Exhausted
    } else {
        RetryDecision::RetryAfter(delay)
    }
}
