use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use super::ProbeOutcome;

/// Phase-wide consecutive failure counter.
///
/// Shared by all workers of a phase. Once `threshold` failing attempts happen
/// in a row the breaker trips and stays tripped. A threshold of 0 disables it.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    consecutive: AtomicU32,
    tripped: AtomicBool,
}

impl CircuitBreaker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            consecutive: AtomicU32::new(0),
            tripped: AtomicBool::new(false),
        }
    }

    /// Record an attempt. Returns true only for the attempt that trips the breaker.
    pub fn record(&self, outcome: &ProbeOutcome) -> bool {
        if !outcome.counts_toward_breaker() {
            self.consecutive.store(0, Ordering::SeqCst);
            return false;
        }

        let streak = self.consecutive.fetch_add(1, Ordering::SeqCst) + 1;
        if self.threshold == 0 || streak < self.threshold {
            return false;
        }
        !self.tripped.swap(true, Ordering::SeqCst)
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive.load(Ordering::SeqCst)
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trips_at_threshold_once() {
        let breaker = CircuitBreaker::new(3);
        assert!(!breaker.record(&ProbeOutcome::Timeout));
        assert!(!breaker.record(&ProbeOutcome::Status(429)));
        assert!(breaker.record(&ProbeOutcome::ConnectionError("connect".into())));
        assert!(breaker.is_tripped());
        assert!(!breaker.record(&ProbeOutcome::Timeout));
        assert!(breaker.is_tripped());
    }

    #[test]
    fn test_responses_reset_streak() {
        let breaker = CircuitBreaker::new(3);
        breaker.record(&ProbeOutcome::Timeout);
        breaker.record(&ProbeOutcome::Timeout);
        breaker.record(&ProbeOutcome::Status(503));
        assert_eq!(breaker.consecutive_failures(), 0);
        breaker.record(&ProbeOutcome::Timeout);
        breaker.record(&ProbeOutcome::Timeout);
        assert!(!breaker.is_tripped());
    }

    #[test]
    fn test_zero_threshold_disables() {
        let breaker = CircuitBreaker::new(0);
        for _ in 0..1000 {
            assert!(!breaker.record(&ProbeOutcome::Timeout));
        }
        assert!(!breaker.is_tripped());
    }
}
