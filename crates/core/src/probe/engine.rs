//! Bounded-concurrency, rate-limited probe loop.
//!
//! Workers pull entities from a shared queue and drive each one through its
//! retry loop. Finished entities flow over a channel to a single collector
//! (the task calling [`ProbeEngine::run_phase`]), which is the only writer to
//! the ledger and commits every `batch_write_frequency` entities.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use super::{
    next_step, AbortReason, CircuitBreaker, Phase, PhaseSummary, ProbeOutcome, Prober,
    RateLimiter, RetryDecision, WorkItem,
};
use crate::config::Config;
use crate::ledger::{LedgerError, LedgerStore};
use crate::metrics;

/// Cooperative cancellation flag shared between the run driver and the engine.
///
/// Stopping prevents new entities from being dispatched and cancels pending
/// retries; attempts already in flight finish.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Engine tuning shared by all phases of a run.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub max_concurrency: usize,
    pub rate_limit_per_second: f64,
    pub delay_between_attempts: Duration,
    /// Commit after this many recorded entities.
    pub batch_write_frequency: usize,
    /// Consecutive failing attempts that abort a phase (0 = disabled).
    pub circuit_breaker_threshold: u32,
    /// Log a progress line every N finished entities (0 = never).
    pub progress_every: usize,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_concurrency: config.probe.max_concurrent_requests.max(1),
            rate_limit_per_second: config.probe.rate_limit_per_second,
            delay_between_attempts: Duration::from_millis(config.probe.delay_between_attempts_ms),
            batch_write_frequency: config.run.batch_write_frequency.max(1),
            circuit_breaker_threshold: config.probe.circuit_breaker_threshold,
            progress_every: config.monitoring.log_progress_every_n,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntityState {
    Succeeded,
    Exhausted,
    Interrupted,
}

#[derive(Debug)]
struct EntityResult {
    item: WorkItem,
    attempts: u32,
    last_outcome: Option<ProbeOutcome>,
    state: EntityState,
}

/// State shared by the workers of one phase.
struct WorkerContext {
    phase: Phase,
    prober: Arc<dyn Prober>,
    limiter: Arc<RateLimiter>,
    breaker: CircuitBreaker,
    queue: Mutex<VecDeque<WorkItem>>,
    /// Set when this phase must wind down (breaker trip or ledger failure).
    halt: AtomicBool,
    stop: StopHandle,
    probes_issued: AtomicU64,
    delay: Duration,
}

impl WorkerContext {
    fn halted(&self) -> bool {
        self.halt.load(Ordering::SeqCst) || self.stop.is_stopped()
    }

    async fn run(self: Arc<Self>, results: mpsc::Sender<EntityResult>) {
        loop {
            if self.halted() {
                break;
            }
            let next = self.queue.lock().await.pop_front();
            let Some(item) = next else {
                break;
            };

            let result = self.drive(item).await;
            if results.send(result).await.is_err() {
                break;
            }
        }
    }

    /// Run one entity's retry loop. Attempts are strictly sequential.
    async fn drive(&self, item: WorkItem) -> EntityResult {
        let phase = self.phase.as_str();
        let target = item.target();
        let mut attempts = 0u32;

        loop {
            let waited = self.limiter.acquire().await;
            metrics::RATE_LIMIT_WAIT
                .with_label_values(&[phase])
                .observe(waited.as_secs_f64());

            let started = Instant::now();
            let outcome = self.prober.probe(&target).await;
            metrics::PROBE_LATENCY
                .with_label_values(&[phase])
                .observe(started.elapsed().as_secs_f64());
            metrics::PROBE_ATTEMPTS
                .with_label_values(&[phase, outcome.class()])
                .inc();

            attempts += 1;
            self.probes_issued.fetch_add(1, Ordering::SeqCst);

            if self.breaker.record(&outcome) {
                error!(
                    phase,
                    threshold = self.breaker.threshold(),
                    last_outcome = %outcome,
                    "Circuit breaker tripped, aborting phase"
                );
                self.halt.store(true, Ordering::SeqCst);
            }

            let state = match next_step(&outcome, attempts, item.budget, self.delay) {
                RetryDecision::Succeeded => EntityState::Succeeded,
                RetryDecision::Exhausted => EntityState::Exhausted,
                RetryDecision::RetryAfter(delay) => {
                    if !self.halted() {
                        debug!(
                            phase,
                            target = %target,
                            attempt = attempts,
                            budget = item.budget,
                            outcome = %outcome,
                            "Retrying"
                        );
                        sleep(delay).await;
                    }
                    if self.halted() {
                        EntityState::Interrupted
                    } else {
                        continue;
                    }
                }
            };

            return EntityResult {
                item,
                attempts,
                last_outcome: Some(outcome),
                state,
            };
        }
    }
}

/// Periodic progress reporting for the collector.
struct Progress {
    phase: Phase,
    total: usize,
    every: usize,
    started: Instant,
    window_success: usize,
    window_total: usize,
}

impl Progress {
    fn new(phase: Phase, total: usize, every: usize) -> Self {
        Self {
            phase,
            total,
            every,
            started: Instant::now(),
            window_success: 0,
            window_total: 0,
        }
    }

    fn record(&mut self, completed: usize, success: bool) {
        self.window_total += 1;
        if success {
            self.window_success += 1;
        }
        if self.every == 0 || (completed % self.every != 0 && completed != self.total) {
            return;
        }

        let elapsed = self.started.elapsed().as_secs_f64().max(0.001);
        let rate = completed as f64 / elapsed;
        let remaining = self.total.saturating_sub(completed);
        let eta_secs = if rate > 0.0 {
            (remaining as f64 / rate) as u64
        } else {
            0
        };

        info!(
            phase = %self.phase,
            completed,
            total = self.total,
            percent = format!("{:.1}", completed as f64 / self.total as f64 * 100.0),
            rate = format!("{:.2}/s", rate),
            eta_secs,
            window_success = format!("{}/{}", self.window_success, self.window_total),
            "Phase progress"
        );

        self.window_success = 0;
        self.window_total = 0;
    }
}

/// Drives work-sets through the retry loop against a [`Prober`].
pub struct ProbeEngine {
    prober: Arc<dyn Prober>,
    limiter: Arc<RateLimiter>,
    settings: EngineSettings,
    stop: StopHandle,
}

impl ProbeEngine {
    pub fn new(prober: Arc<dyn Prober>, settings: EngineSettings, stop: StopHandle) -> Self {
        let limiter = Arc::new(RateLimiter::new(settings.rate_limit_per_second));
        Self {
            prober,
            limiter,
            settings,
            stop,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Probe every item, recording finished entities in `ledger`.
    ///
    /// All recorded results are committed before this returns, including
    /// when the phase is cut short by the circuit breaker or a stop request.
    /// A ledger error stops the phase and is returned.
    pub async fn run_phase(
        &self,
        phase: Phase,
        items: Vec<WorkItem>,
        ledger: &dyn LedgerStore,
    ) -> Result<PhaseSummary, LedgerError> {
        let mut summary = PhaseSummary::new(phase, &items);
        let total = items.len();
        metrics::WORKSET_SIZE
            .with_label_values(&[phase.as_str()])
            .set(total as i64);

        if total == 0 {
            info!(phase = %phase, "Nothing to probe");
            return Ok(summary);
        }

        let workers = self.settings.max_concurrency.max(1).min(total);
        info!(
            phase = %phase,
            total,
            new = summary.selection.new,
            failed_retry = summary.selection.failed_retry,
            forced = summary.selection.forced,
            stale = summary.selection.stale,
            workers,
            rate_limit = self.settings.rate_limit_per_second,
            "Starting phase"
        );

        let started = Instant::now();
        let ctx = Arc::new(WorkerContext {
            phase,
            prober: Arc::clone(&self.prober),
            limiter: Arc::clone(&self.limiter),
            breaker: CircuitBreaker::new(self.settings.circuit_breaker_threshold),
            queue: Mutex::new(VecDeque::from(items)),
            halt: AtomicBool::new(false),
            stop: self.stop.clone(),
            probes_issued: AtomicU64::new(0),
            delay: self.settings.delay_between_attempts,
        });

        let (tx, mut rx) = mpsc::channel(workers * 2);
        let handles: Vec<_> = (0..workers)
            .map(|_| tokio::spawn(Arc::clone(&ctx).run(tx.clone())))
            .collect();
        drop(tx);

        let mut progress = Progress::new(phase, total, self.settings.progress_every);
        let mut since_commit = 0usize;
        let mut ledger_error = None;

        while let Some(result) = rx.recv().await {
            let position = summary.completed() + 1;
            let label = result.item.label();
            let code = result
                .last_outcome
                .as_ref()
                .map(ProbeOutcome::code_label)
                .unwrap_or_else(|| "-".to_string());
            metrics::ATTEMPTS_PER_ENTITY
                .with_label_values(&[phase.as_str()])
                .observe(f64::from(result.attempts));

            if result.state == EntityState::Interrupted {
                summary.interrupted += 1;
                metrics::ENTITIES_COMPLETED
                    .with_label_values(&[phase.as_str(), "interrupted"])
                    .inc();
                warn!(
                    phase = %phase,
                    position,
                    total,
                    entity = %label,
                    code = %code,
                    attempts = result.attempts,
                    "Interrupted between attempts, not recorded"
                );
                progress.record(summary.completed(), false);
                continue;
            }

            let success = result.state == EntityState::Succeeded;
            let status = if success { "success" } else { "failed" };
            if success {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
            metrics::ENTITIES_COMPLETED
                .with_label_values(&[phase.as_str(), status])
                .inc();
            info!(
                phase = %phase,
                position,
                total,
                entity = %label,
                status,
                code = %code,
                attempts = result.attempts,
                budget = result.item.budget,
                "Probe finished"
            );
            progress.record(summary.completed(), success);

            let update = result.item.into_update(
                success,
                result.attempts,
                result.last_outcome.as_ref(),
                Utc::now(),
            );
            if let Err(e) = update.stage(ledger) {
                ledger_error = Some(e);
                break;
            }

            since_commit += 1;
            if since_commit >= self.settings.batch_write_frequency {
                match ledger.commit_batch() {
                    Ok(_) => {
                        summary.batches_committed += 1;
                        metrics::LEDGER_COMMITS.inc();
                        since_commit = 0;
                    }
                    Err(e) => {
                        ledger_error = Some(e);
                        break;
                    }
                }
            }
        }

        if ledger_error.is_some() {
            ctx.halt.store(true, Ordering::SeqCst);
        }
        drop(rx);
        for joined in join_all(handles).await {
            if let Err(e) = joined {
                error!(phase = %phase, error = %e, "Probe worker panicked");
            }
        }

        summary.not_dispatched = ctx.queue.lock().await.len();
        summary.probes_issued = ctx.probes_issued.load(Ordering::SeqCst);

        if let Some(e) = ledger_error {
            error!(phase = %phase, error = %e, "Ledger write failed, stopping phase");
            return Err(e);
        }

        let final_commit = ledger.commit_batch()?;
        if !final_commit.is_empty() {
            summary.batches_committed += 1;
            metrics::LEDGER_COMMITS.inc();
        }

        summary.elapsed_secs = started.elapsed().as_secs_f64();
        metrics::PHASE_DURATION
            .with_label_values(&[phase.as_str()])
            .observe(summary.elapsed_secs);

        if ctx.breaker.is_tripped() {
            summary.aborted = Some(AbortReason::CircuitBreaker {
                threshold: ctx.breaker.threshold(),
            });
            metrics::CIRCUIT_BREAKER_TRIPS
                .with_label_values(&[phase.as_str()])
                .inc();
            error!(
                phase = %phase,
                succeeded = summary.succeeded,
                failed = summary.failed,
                interrupted = summary.interrupted,
                not_dispatched = summary.not_dispatched,
                "Phase aborted by circuit breaker; progress so far is saved"
            );
        } else if self.stop.is_stopped() && (summary.interrupted > 0 || summary.not_dispatched > 0)
        {
            summary.aborted = Some(AbortReason::Stopped);
            warn!(
                phase = %phase,
                succeeded = summary.succeeded,
                failed = summary.failed,
                not_dispatched = summary.not_dispatched,
                "Phase stopped on request; progress so far is saved"
            );
        } else {
            info!(
                phase = %phase,
                succeeded = summary.succeeded,
                failed = summary.failed,
                probes = summary.probes_issued,
                batches = summary.batches_committed,
                elapsed_secs = format!("{:.1}", summary.elapsed_secs),
                throughput = format!("{:.2}/s", summary.throughput()),
                "Phase complete"
            );
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{ArtistRecord, CacheStatus, SqliteLedger};
    use crate::probe::{ProbeTarget, SelectionReason, WorkSubject};
    use crate::testing::{FailingLedger, MockProber};

    fn settings() -> EngineSettings {
        EngineSettings {
            max_concurrency: 4,
            rate_limit_per_second: 10_000.0,
            delay_between_attempts: Duration::ZERO,
            batch_write_frequency: 2,
            circuit_breaker_threshold: 0,
            progress_every: 0,
        }
    }

    fn artist_items(count: usize, budget: u32) -> Vec<WorkItem> {
        (1..=count)
            .map(|n| WorkItem {
                subject: WorkSubject::ArtistLookup(ArtistRecord::pending(
                    format!("a{}", n),
                    Some(format!("Artist {}", n)),
                )),
                reason: SelectionReason::New,
                budget,
            })
            .collect()
    }

    fn engine(prober: &Arc<MockProber>, settings: EngineSettings) -> ProbeEngine {
        ProbeEngine::new(prober.clone(), settings, StopHandle::new())
    }

    #[tokio::test]
    async fn test_success_stops_retrying() {
        let prober = Arc::new(MockProber::new());
        prober
            .script(
                ProbeTarget::artist("a1"),
                vec![ProbeOutcome::Status(503), ProbeOutcome::Status(200)],
            )
            .await;
        let ledger = SqliteLedger::in_memory().unwrap();

        let summary = engine(&prober, settings())
            .run_phase(Phase::Artist, artist_items(1, 5), &ledger)
            .await
            .unwrap();

        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.probes_issued, 2);
        let a1 = ledger.load().unwrap().artist("a1").cloned().unwrap();
        assert_eq!(a1.status, CacheStatus::Success);
        assert_eq!(a1.attempts, 2);
        assert_eq!(a1.last_status_code.as_deref(), Some("200"));
    }

    #[tokio::test]
    async fn test_exhausted_budget_records_failure() {
        let prober = Arc::new(MockProber::with_default(ProbeOutcome::Status(404)));
        let ledger = SqliteLedger::in_memory().unwrap();

        let summary = engine(&prober, settings())
            .run_phase(Phase::Artist, artist_items(2, 3), &ledger)
            .await
            .unwrap();

        assert_eq!(summary.failed, 2);
        assert_eq!(summary.probes_issued, 6);
        assert_eq!(summary.aborted, None);
        for artist in ledger.load().unwrap().artists {
            assert_eq!(artist.status, CacheStatus::Failed);
            assert_eq!(artist.attempts, 3);
        }
    }

    #[tokio::test]
    async fn test_commits_every_n_entities_and_at_phase_end() {
        let prober = Arc::new(MockProber::new());
        let ledger = SqliteLedger::in_memory().unwrap();

        let summary = engine(&prober, settings())
            .run_phase(Phase::Artist, artist_items(5, 1), &ledger)
            .await
            .unwrap();

        assert_eq!(summary.batches_committed, 3);
        assert_eq!(ledger.pending_writes().unwrap(), 0);
        assert_eq!(ledger.load().unwrap().artists.len(), 5);
    }

    #[tokio::test]
    async fn test_empty_workset_is_a_noop() {
        let prober = Arc::new(MockProber::new());
        let ledger = SqliteLedger::in_memory().unwrap();

        let summary = engine(&prober, settings())
            .run_phase(Phase::ReleaseGroup, Vec::new(), &ledger)
            .await
            .unwrap();

        assert_eq!(summary.selected, 0);
        assert_eq!(summary.batches_committed, 0);
        assert_eq!(prober.call_count().await, 0);
    }

    #[tokio::test]
    async fn test_breaker_trips_on_consecutive_timeouts() {
        let prober = Arc::new(MockProber::with_default(ProbeOutcome::Timeout));
        let ledger = SqliteLedger::in_memory().unwrap();
        let mut settings = settings();
        settings.max_concurrency = 1;
        settings.circuit_breaker_threshold = 3;

        let summary = engine(&prober, settings)
            .run_phase(Phase::Artist, artist_items(4, 2), &ledger)
            .await
            .unwrap();

        assert_eq!(summary.aborted, Some(AbortReason::CircuitBreaker { threshold: 3 }));
        assert_eq!(summary.probes_issued, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.interrupted, 1);
        assert_eq!(summary.not_dispatched, 2);

        let snapshot = ledger.load().unwrap();
        assert_eq!(snapshot.artists.len(), 1);
        assert_eq!(snapshot.artists[0].id, "a1");
    }

    #[tokio::test]
    async fn test_stop_before_phase_dispatches_nothing() {
        let prober = Arc::new(MockProber::new());
        let ledger = SqliteLedger::in_memory().unwrap();
        let engine = engine(&prober, settings());
        engine.stop_handle().stop();

        let summary = engine
            .run_phase(Phase::Artist, artist_items(3, 1), &ledger)
            .await
            .unwrap();

        assert_eq!(summary.aborted, Some(AbortReason::Stopped));
        assert_eq!(summary.not_dispatched, 3);
        assert_eq!(prober.call_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_failure_ends_phase_without_new_dispatches() {
        let prober = Arc::new(MockProber::new());
        prober.set_latency(Duration::from_secs(1)).await;
        let ledger = FailingLedger::in_memory().unwrap();
        ledger.fail_commits_after(2);
        let mut settings = settings();
        settings.max_concurrency = 1;
        settings.batch_write_frequency = 1;

        let result = engine(&prober, settings)
            .run_phase(Phase::Artist, artist_items(5, 1), &ledger)
            .await;

        assert!(matches!(result, Err(LedgerError::Io { .. })));
        assert_eq!(ledger.commit_attempts(), 3);
        let committed = ledger.load().unwrap();
        assert_eq!(committed.artists.len(), 2);
        assert!(committed.artist("a3").is_none());

        // The attempt in flight when the commit failed may finish, nothing after it starts.
        assert!(prober.call_count().await <= 4);
        assert_eq!(prober.calls_for(&ProbeTarget::artist("a5")).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_bounds_parallel_probes() {
        let prober = Arc::new(MockProber::new());
        prober.set_latency(Duration::from_secs(1)).await;
        let ledger = SqliteLedger::in_memory().unwrap();
        let mut settings = settings();
        settings.max_concurrency = 2;

        let started = Instant::now();
        let summary = engine(&prober, settings)
            .run_phase(Phase::Artist, artist_items(4, 1), &ledger)
            .await
            .unwrap();

        assert_eq!(summary.succeeded, 4);
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_holds_across_workers() {
        let prober = Arc::new(MockProber::new());
        let ledger = SqliteLedger::in_memory().unwrap();
        let mut settings = settings();
        settings.max_concurrency = 10;
        settings.rate_limit_per_second = 5.0;

        let started = Instant::now();
        engine(&prober, settings)
            .run_phase(Phase::Artist, artist_items(10, 1), &ledger)
            .await
            .unwrap();

        // First request is immediate, the other nine wait 200ms each.
        assert!(started.elapsed() >= Duration::from_millis(1750));
        assert_eq!(prober.call_count().await, 10);
    }
}
