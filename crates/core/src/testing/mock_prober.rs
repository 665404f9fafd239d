//! Mock prober for testing.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::probe::{ProbeOutcome, ProbeTarget, Prober, StopHandle};

/// Mock implementation of the Prober trait.
///
/// Provides controllable behavior for testing:
/// - Script a sequence of outcomes per target (the last one repeats)
/// - Fall back to a default outcome for unscripted targets
/// - Record every probe for assertions
/// - Simulate latency
/// - Request a stop once a number of probes have been issued
///
/// # Example
///
/// ```rust,ignore
/// use warmer_core::testing::MockProber;
/// use warmer_core::probe::{ProbeOutcome, ProbeTarget};
///
/// let prober = MockProber::new();
/// prober
///     .script(
///         ProbeTarget::artist("a1"),
///         vec![ProbeOutcome::Status(503), ProbeOutcome::Status(200)],
///     )
///     .await;
///
/// // ... run a phase ...
///
/// assert_eq!(prober.calls_for(&ProbeTarget::artist("a1")).await, 2);
/// ```
pub struct MockProber {
    /// Remaining scripted outcomes per target.
    scripts: Arc<RwLock<HashMap<ProbeTarget, VecDeque<ProbeOutcome>>>>,
    /// Outcome for targets without a script.
    default_outcome: Arc<RwLock<ProbeOutcome>>,
    /// Every probed target, in call order.
    calls: Arc<RwLock<Vec<ProbeTarget>>>,
    /// Simulated time per request.
    latency: Arc<RwLock<Option<Duration>>>,
    /// Stop this handle when the call count reaches the given number.
    stop_after: Arc<RwLock<Option<(usize, StopHandle)>>>,
}

impl std::fmt::Debug for MockProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockProber")
            .field("scripts", &"<scripts>")
            .field("calls", &"<calls>")
            .finish()
    }
}

impl Default for MockProber {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProber {
    /// Create a mock prober that answers 200 to everything.
    pub fn new() -> Self {
        Self::with_default(ProbeOutcome::Status(200))
    }

    /// Create a mock prober answering `outcome` to unscripted targets.
    pub fn with_default(outcome: ProbeOutcome) -> Self {
        Self {
            scripts: Arc::new(RwLock::new(HashMap::new())),
            default_outcome: Arc::new(RwLock::new(outcome)),
            calls: Arc::new(RwLock::new(Vec::new())),
            latency: Arc::new(RwLock::new(None)),
            stop_after: Arc::new(RwLock::new(None)),
        }
    }

    /// Answer `outcomes` in order for `target`; the last outcome repeats.
    pub async fn script(&self, target: ProbeTarget, outcomes: Vec<ProbeOutcome>) {
        self.scripts
            .write()
            .await
            .insert(target, outcomes.into_iter().collect());
    }

    /// Always answer `outcome` for `target`.
    pub async fn always(&self, target: ProbeTarget, outcome: ProbeOutcome) {
        self.script(target, vec![outcome]).await;
    }

    pub async fn set_default(&self, outcome: ProbeOutcome) {
        *self.default_outcome.write().await = outcome;
    }

    pub async fn set_latency(&self, latency: Duration) {
        *self.latency.write().await = Some(latency);
    }

    /// Stop `handle` while the `calls`-th probe is in flight.
    pub async fn stop_after(&self, calls: usize, handle: StopHandle) {
        *self.stop_after.write().await = Some((calls, handle));
    }

    /// All probed targets, in call order.
    pub async fn recorded_calls(&self) -> Vec<ProbeTarget> {
        self.calls.read().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }

    pub async fn calls_for(&self, target: &ProbeTarget) -> usize {
        self.calls.read().await.iter().filter(|t| *t == target).count()
    }

    pub async fn clear_calls(&self) {
        self.calls.write().await.clear();
    }
}

#[async_trait]
impl Prober for MockProber {
    async fn probe(&self, target: &ProbeTarget) -> ProbeOutcome {
        let issued = {
            let mut calls = self.calls.write().await;
            calls.push(target.clone());
            calls.len()
        };
        if let Some((limit, handle)) = self.stop_after.read().await.as_ref() {
            if issued >= *limit {
                handle.stop();
            }
        }

        let latency = *self.latency.read().await;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut scripts = self.scripts.write().await;
        if let Some(queue) = scripts.get_mut(target) {
            if queue.len() > 1 {
                if let Some(outcome) = queue.pop_front() {
                    return outcome;
                }
            }
            if let Some(outcome) = queue.front() {
                return outcome.clone();
            }
        }
        drop(scripts);

        self.default_outcome.read().await.clone()
    }
}
