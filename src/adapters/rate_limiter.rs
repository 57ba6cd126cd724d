//! Per-platform token-bucket rate limiter, same algorithm as
//! `empath-delivery::rate_limiter`, keyed by platform name. Used both by the
//! Work Queue's global send cap and the platform sync driver's ≥2s
//! inter-call spacing (§4.2, §4.10).

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::Mutex;

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(per_second: f64, burst: f64) -> Self {
        Self {
            tokens: burst,
            capacity: burst,
            refill_rate: per_second,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    fn try_consume(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

pub struct RateLimiter {
    per_second: f64,
    burst: f64,
    buckets: DashMap<String, Arc<Mutex<TokenBucket>>>,
}

impl RateLimiter {
    pub fn new(per_second: u32) -> Self {
        Self {
            per_second: per_second as f64,
            burst: (per_second * 2).max(1) as f64,
            buckets: DashMap::new(),
        }
    }

    fn bucket(&self, key: &str) -> Arc<Mutex<TokenBucket>> {
        self.buckets
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(TokenBucket::new(self.per_second, self.burst))))
            .clone()
    }

    /// Non-blocking: `true` if a token was available right now.
    pub fn try_acquire(&self, key: &str) -> bool {
        self.bucket(key).lock().try_consume()
    }

    /// Blocking wait for a token, used by the sync driver's inter-call
    /// spacing where a short delay is acceptable.
    pub async fn acquire(&self, key: &str) {
        loop {
            if self.try_acquire(key) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_allows_up_to_capacity_immediately() {
        let limiter = RateLimiter::new(1);
        assert!(limiter.try_acquire("k"));
        assert!(limiter.try_acquire("k"));
    }

    #[test]
    fn exhausted_bucket_rejects() {
        let limiter = RateLimiter::new(1);
        for _ in 0..10 {
            limiter.try_acquire("k");
        }
        assert!(!limiter.try_acquire("k"));
    }

    #[test]
    fn independent_per_key() {
        let limiter = RateLimiter::new(1);
        for _ in 0..10 {
            limiter.try_acquire("a");
        }
        assert!(limiter.try_acquire("b"));
    }
}
