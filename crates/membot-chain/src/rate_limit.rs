//! Token-bucket rate limiting.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Classic token bucket: `capacity` tokens, refilled at `rate` per second.
///
/// Starts full. Time is passed in so callers (and tests) control the clock.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    rate: f64,
    capacity: f64,
    tokens: f64,
    updated: Instant,
}

impl TokenBucket {
    pub fn new(rate_per_sec: f64, capacity: f64, now: Instant) -> Self {
        let capacity = capacity.max(1.0);
        Self {
            rate: rate_per_sec.max(0.0),
            capacity,
            tokens: capacity,
            updated: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.updated).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.updated = now;
    }

    /// Take one token if available.
    pub fn try_take(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// How long until one token is available (zero if one is available now).
    pub fn wait_time(&mut self, now: Instant) -> Duration {
        self.refill(now);
        if self.tokens >= 1.0 || self.rate <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64((1.0 - self.tokens) / self.rate)
    }

    pub fn available(&self) -> f64 {
        self.tokens
    }
}

/// Shared async token bucket; `acquire` waits for a token.
#[derive(Debug)]
pub struct AsyncTokenBucket {
    inner: Mutex<TokenBucket>,
}

impl AsyncTokenBucket {
    /// Rate floors at 0.1/s so a misconfigured limit cannot stall forever.
    pub fn new(rate_per_sec: f64, burst: f64) -> Self {
        Self {
            inner: Mutex::new(TokenBucket::new(rate_per_sec.max(0.1), burst, Instant::now())),
        }
    }

    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.inner.lock().await;
                let now = Instant::now();
                if bucket.try_take(now) {
                    return;
                }
                bucket.wait_time(now)
            };
            tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_full_then_empties() {
        let t0 = Instant::now();
        let mut bucket = TokenBucket::new(1.0, 2.0, t0);
        assert!(bucket.try_take(t0));
        assert!(bucket.try_take(t0));
        assert!(!bucket.try_take(t0));
    }

    #[test]
    fn test_refills_by_rate() {
        let t0 = Instant::now();
        let mut bucket = TokenBucket::new(0.5, 1.0, t0);
        assert!(bucket.try_take(t0));
        assert!(!bucket.try_take(t0 + Duration::from_secs(1)));
        assert!(bucket.try_take(t0 + Duration::from_secs(2)));
    }

    #[test]
    fn test_capacity_caps_refill() {
        let t0 = Instant::now();
        let mut bucket = TokenBucket::new(10.0, 2.0, t0);
        bucket.try_take(t0);
        bucket.try_take(t0);
        let later = t0 + Duration::from_secs(60);
        assert!(bucket.try_take(later));
        assert!(bucket.try_take(later));
        assert!(!bucket.try_take(later));
    }

    #[test]
    fn test_wait_time() {
        let t0 = Instant::now();
        let mut bucket = TokenBucket::new(4.0, 1.0, t0);
        assert_eq!(bucket.wait_time(t0), Duration::ZERO);
        bucket.try_take(t0);
        let wait = bucket.wait_time(t0);
        assert!((wait.as_secs_f64() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_zero_capacity_is_one() {
        let t0 = Instant::now();
        let mut bucket = TokenBucket::new(1.0, 0.0, t0);
        assert!(bucket.try_take(t0));
        assert!(!bucket.try_take(t0));
    }

    #[tokio::test]
    async fn test_async_acquire_burst_is_immediate() {
        let bucket = AsyncTokenBucket::new(100.0, 3.0);
        let start = Instant::now();
        for _ in 0..3 {
            bucket.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
