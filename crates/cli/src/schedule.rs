//! Repeat runs on a fixed interval.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{error, info};
use warmer_core::config::ScheduleConfig;
use warmer_core::StopHandle;

/// Granularity at which a wait notices a stop request.
const STOP_POLL: Duration = Duration::from_millis(500);

/// Sleep for `duration`, returning early (with `false`) once `stop` is set.
async fn wait_or_stop(duration: Duration, stop: &StopHandle) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if stop.is_stopped() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        sleep(STOP_POLL.min(deadline - now)).await;
    }
}

/// Call `run` every `interval_secs` until `max_runs` is reached or `stop` is set.
///
/// A failed run is logged and the schedule continues. Returns the number of
/// runs started.
pub async fn run_scheduled<F, Fut>(schedule: &ScheduleConfig, stop: &StopHandle, mut run: F) -> u32
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let interval = Duration::from_secs(schedule.interval_secs.max(1));
    info!(
        interval_secs = interval.as_secs(),
        run_at_start = schedule.run_at_start,
        max_runs = schedule.max_runs,
        "Scheduler started"
    );

    if !schedule.run_at_start && !wait_or_stop(interval, stop).await {
        info!("Scheduler stopped before the first run");
        return 0;
    }

    let mut runs = 0u32;
    loop {
        runs += 1;
        info!(run = runs, "Scheduled run starting");
        let started = Instant::now();
        if let Err(e) = run(runs).await {
            error!(run = runs, "Scheduled run failed: {:#}", e);
        }

        if stop.is_stopped() {
            info!(runs, "Scheduler stopped");
            return runs;
        }
        if schedule.max_runs > 0 && runs >= schedule.max_runs {
            info!(runs, "Reached max_runs, scheduler finished");
            return runs;
        }

        let wait = interval.saturating_sub(started.elapsed());
        info!(next_run_in_secs = wait.as_secs(), "Waiting for next run");
        if !wait_or_stop(wait, stop).await {
            info!(runs, "Scheduler stopped");
            return runs;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn schedule(max_runs: u32, run_at_start: bool) -> ScheduleConfig {
        ScheduleConfig {
            interval_secs: 60,
            run_at_start,
            max_runs,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_after_max_runs() {
        let stop = StopHandle::new();
        let started = Instant::now();

        let runs = run_scheduled(&schedule(3, true), &stop, |_| async { Ok(()) }).await;

        assert_eq!(runs, 3);
        // Two waits between three runs.
        assert!(started.elapsed() >= Duration::from_secs(120));
        assert!(started.elapsed() < Duration::from_secs(180));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_run_does_not_stop_schedule() {
        let stop = StopHandle::new();
        let runs = run_scheduled(&schedule(2, true), &stop, |n| async move {
            if n == 1 {
                anyhow::bail!("inventory unreachable");
            }
            Ok(())
        })
        .await;
        assert_eq!(runs, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_run_ends_schedule() {
        let stop = StopHandle::new();
        let calls = Arc::new(AtomicU32::new(0));

        let runs = run_scheduled(&schedule(0, true), &stop, |_| {
            let stop = stop.clone();
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                stop.stop();
                Ok(())
            }
        })
        .await;

        assert_eq!(runs, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_start_waits_one_interval() {
        let stop = StopHandle::new();
        let started = Instant::now();

        let runs = run_scheduled(&schedule(1, false), &stop, |_| async { Ok(()) }).await;

        assert_eq!(runs, 1);
        assert!(started.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_stop_before_first_run() {
        let stop = StopHandle::new();
        stop.stop();
        let runs = run_scheduled(&schedule(0, false), &stop, |_| async { Ok(()) }).await;
        assert_eq!(runs, 0);
    }
}
