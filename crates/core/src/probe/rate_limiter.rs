//! Token bucket rate limiter shared by every probe worker.

use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};

/// Token bucket: tokens refill at a constant rate and each request spends one.
///
/// The bucket holds at most `capacity` tokens, so after an idle period only a
/// short burst goes out before requests settle at `refill_rate` per second.
#[derive(Debug)]
pub struct TokenBucket {
    /// Max tokens.
    capacity: f64,
    /// Current available tokens.
    tokens: f64,
    /// Tokens added per second.
    refill_rate: f64,
    /// Last refill time.
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a bucket for `requests_per_second` with room for `capacity` tokens.
    ///
    /// The bucket starts full.
    pub fn new(requests_per_second: f64, capacity: f64) -> Self {
        let capacity = capacity.max(1.0);
        Self {
            capacity,
            tokens: capacity,
            refill_rate: requests_per_second,
            last_refill: Instant::now(),
        }
    }

    /// Try to acquire a token.
    ///
    /// Returns `Err(wait_duration)` with the time until a token is available.
    pub fn try_acquire(&mut self) -> Result<(), Duration> {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let tokens_needed = 1.0 - self.tokens;
            // A zero or non-finite rate has no meaningful wait; poll once a second.
            Err(Duration::try_from_secs_f64(tokens_needed / self.refill_rate)
                .unwrap_or(Duration::from_secs(1)))
        }
    }

    pub fn tokens_available(&mut self) -> f64 {
        self.refill();
        self.tokens
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }
}

/// Async limiter gating every outbound probe across all workers.
///
/// Waiters are served in arrival order.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<TokenBucket>,
    requests_per_second: f64,
}

impl RateLimiter {
    /// Limiter allowing `requests_per_second` with a single-request burst.
    pub fn new(requests_per_second: f64) -> Self {
        Self {
            bucket: Mutex::new(TokenBucket::new(requests_per_second, 1.0)),
            requests_per_second,
        }
    }

    pub fn requests_per_second(&self) -> f64 {
        self.requests_per_second
    }

    /// Wait until a request may be sent. Returns how long the caller waited.
    pub async fn acquire(&self) -> Duration {
        let started = Instant::now();
        let mut bucket = self.bucket.lock().await;
        while let Err(wait) = bucket.try_acquire() {
            sleep(wait).await;
        }
        started.elapsed()
    }
}
