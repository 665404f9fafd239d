//! Prometheus metrics for the warming engine.
//!
//! This module provides metrics for:
//! - Probe attempts and latency against the warmed API
//! - Entity outcomes and phase durations
//! - Circuit breaker trips and ledger commits

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts};

// =============================================================================
// Probe Metrics
// =============================================================================

/// Probe attempts by phase and outcome class.
pub static PROBE_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("warmer_probe_attempts_total", "Total probe attempts"),
        &["phase", "outcome"], // "success", "http_error", "rate_limited", "timeout", "connection_error"
    )
    .unwrap()
});

/// Probe request latency in seconds.
pub static PROBE_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "warmer_probe_latency_seconds",
            "Latency of individual probe requests",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["phase"],
    )
    .unwrap()
});

/// Time spent waiting on the shared rate limiter.
pub static RATE_LIMIT_WAIT: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "warmer_rate_limit_wait_seconds",
            "Time a worker waited for a rate limiter slot",
        )
        .buckets(vec![0.0, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        &["phase"],
    )
    .unwrap()
});

// =============================================================================
// Phase Metrics
// =============================================================================

/// Entities finished by phase and result.
pub static ENTITIES_COMPLETED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "warmer_entities_completed_total",
            "Entities that finished their retry loop",
        ),
        &["phase", "result"], // "success", "failed", "interrupted"
    )
    .unwrap()
});

/// Attempts consumed per finished entity.
pub static ATTEMPTS_PER_ENTITY: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "warmer_attempts_per_entity",
            "Attempts consumed by each finished entity",
        )
        .buckets(vec![1.0, 2.0, 3.0, 5.0, 10.0, 15.0, 25.0]),
        &["phase"],
    )
    .unwrap()
});

/// Phase duration in seconds.
pub static PHASE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("warmer_phase_duration_seconds", "Duration of a warming phase")
            .buckets(vec![1.0, 10.0, 60.0, 300.0, 900.0, 1800.0, 3600.0, 7200.0]),
        &["phase"],
    )
    .unwrap()
});

/// Work-set size selected for the latest run of each phase.
pub static WORKSET_SIZE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("warmer_workset_size", "Entities selected for the latest phase run"),
        &["phase"],
    )
    .unwrap()
});

/// Circuit breaker trips by phase.
pub static CIRCUIT_BREAKER_TRIPS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "warmer_circuit_breaker_trips_total",
            "Phases aborted by the circuit breaker",
        ),
        &["phase"],
    )
    .unwrap()
});

// =============================================================================
// Ledger Metrics
// =============================================================================

/// Ledger batch commits.
pub static LEDGER_COMMITS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("warmer_ledger_commits_total", "Ledger batch commits").unwrap()
});

/// Completed runs by mode.
pub static RUNS_COMPLETED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("warmer_runs_completed_total", "Completed warming runs"),
        &["mode"], // "discovery", "normal"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Probes
        Box::new(PROBE_ATTEMPTS.clone()),
        Box::new(PROBE_LATENCY.clone()),
        Box::new(RATE_LIMIT_WAIT.clone()),
        // Phases
        Box::new(ENTITIES_COMPLETED.clone()),
        Box::new(ATTEMPTS_PER_ENTITY.clone()),
        Box::new(PHASE_DURATION.clone()),
        Box::new(WORKSET_SIZE.clone()),
        Box::new(CIRCUIT_BREAKER_TRIPS.clone()),
        // Ledger
        Box::new(LEDGER_COMMITS.clone()),
        Box::new(RUNS_COMPLETED.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_metrics_register() {
        let registry = prometheus::Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }
        PROBE_ATTEMPTS.with_label_values(&["artist", "success"]).inc();
        assert!(!registry.gather().is_empty());
    }
}
