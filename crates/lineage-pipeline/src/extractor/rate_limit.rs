//! Token-bucket rate limiting for LLM calls, tracked independently for
//! requests/minute and tokens/minute (the two limits most chat-completion
//! providers enforce separately).

use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Bucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(per_minute: u32) -> Self {
        let capacity = per_minute as f64;
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec: capacity / 60.0,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// Returns how long the caller must wait before `amount` tokens are
    /// available, deducting them immediately once they are.
    fn wait_time(&mut self, amount: f64) -> Duration {
        self.refill();
        if self.tokens >= amount {
            self.tokens -= amount;
            return Duration::ZERO;
        }
        let deficit = amount - self.tokens;
        let wait = Duration::from_secs_f64(deficit / self.refill_per_sec);
        self.tokens = 0.0;
        wait
    }
}

/// Independently tracks a requests-per-minute and a tokens-per-minute
/// bucket; callers acquire both before issuing a completion call.
pub struct RateLimiter {
    requests: Mutex<Bucket>,
    tokens: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32, tokens_per_minute: u32) -> Self {
        Self {
            requests: Mutex::new(Bucket::new(requests_per_minute)),
            tokens: Mutex::new(Bucket::new(tokens_per_minute)),
        }
    }

    /// Blocks (async-sleeps) until both buckets can admit one request of
    /// `estimated_tokens` size.
    pub async fn acquire(&self, estimated_tokens: u32) {
        loop {
            let request_wait = self.requests.lock().expect("lock not poisoned").wait_time(1.0);
            let token_wait = self
                .tokens
                .lock()
                .expect("lock not poisoned")
                .wait_time(estimated_tokens as f64);
            let wait = request_wait.max(token_wait);
            if wait.is_zero() {
                return;
            }
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_admits_within_capacity() {
        let mut bucket = Bucket::new(60);
        assert_eq!(bucket.wait_time(10.0), Duration::ZERO);
    }

    #[test]
    fn test_bucket_requires_wait_when_exhausted() {
        let mut bucket = Bucket::new(60);
        bucket.wait_time(60.0);
        assert!(bucket.wait_time(1.0) > Duration::ZERO);
    }

    #[tokio::test]
    async fn test_rate_limiter_acquire_does_not_hang_within_budget() {
        let limiter = RateLimiter::new(600, 100_000);
        limiter.acquire(100).await;
    }
}
