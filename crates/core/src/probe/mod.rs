//! Probing the warmed API.
//!
//! A [`Prober`] turns a [`ProbeTarget`] into an observed [`ProbeOutcome`];
//! the [`ProbeEngine`] runs a phase's work-set through per-entity retry loops
//! with bounded concurrency, a shared rate limit and a circuit breaker.

mod circuit;
mod engine;
mod http;
mod rate_limiter;
mod retry;
mod summary;
mod types;
mod work;

pub use circuit::CircuitBreaker;
pub use engine::{EngineSettings, ProbeEngine, StopHandle};
pub use http::HttpProber;
pub use rate_limiter::{RateLimiter, TokenBucket};
pub use retry::{next_step, RetryDecision};
pub use summary::{AbortReason, PhaseSummary, SelectionCounts};
pub use types::{HealthReport, ProbeOutcome, ProbeTarget};
pub use work::{LedgerUpdate, Phase, SelectionReason, WorkItem, WorkSubject};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    /// The HTTP client could not be built.
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

/// Issues one request for a target and reports what came back.
///
/// Transport failures are outcomes, not errors: they feed the retry loop.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, target: &ProbeTarget) -> ProbeOutcome;
}
