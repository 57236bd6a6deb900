//! Adaptive token-bucket rate limiting in front of the Canvas gateway: a
//! plain token bucket for steady-state pacing, wrapped by an adaptive layer
//! that halves the rate on a `429` and recovers by 10% per clean 60-second
//! window.

use std::collections::VecDeque;
use std::time::Duration;
use std::time::Instant;

use tokio::sync::Mutex;

struct TokenBucket {
    requests_per_second: f64,
    burst_size: f64,
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(requests_per_second: f64, burst_size: f64) -> Self {
        TokenBucket {
            requests_per_second,
            burst_size,
            tokens: burst_size,
            last_update: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let elapsed = self.last_update.elapsed().as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.requests_per_second).min(self.burst_size);
        self.last_update = Instant::now();
    }

    async fn acquire(&mut self) {
        self.refill();
        if self.tokens < 1.0 {
            let wait = (1.0 - self.tokens) / self.requests_per_second;
            tokio::time::sleep(Duration::from_secs_f64(wait.max(0.0))).await;
            self.refill();
        }
        self.tokens -= 1.0;
    }
}

const MIN_RATE: f64 = 1.0;
const MAX_RATE: f64 = 20.0;
const DEFAULT_RATE: f64 = 10.0;
const DEFAULT_BURST: f64 = 20.0;
const RECOVERY_WINDOW: Duration = Duration::from_secs(60);
const RECENT_429_CAPACITY: usize = 10;

/// Wraps a `TokenBucket` whose rate adapts to observed `429` responses.
pub struct AdaptiveRateLimiter {
    bucket: Mutex<TokenBucket>,
    current_rate: Mutex<f64>,
    recent_429s: Mutex<VecDeque<Instant>>,
}

impl Default for AdaptiveRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl AdaptiveRateLimiter {
    pub fn new() -> Self {
        AdaptiveRateLimiter {
            bucket: Mutex::new(TokenBucket::new(DEFAULT_RATE, DEFAULT_BURST)),
            current_rate: Mutex::new(DEFAULT_RATE),
            recent_429s: Mutex::new(VecDeque::with_capacity(RECENT_429_CAPACITY)),
        }
    }

    pub async fn acquire(&self) {
        self.bucket.lock().await.acquire().await;
    }

    /// Halves the current rate (floored at `MIN_RATE`) and rebuilds the
    /// underlying bucket if the rate actually changed.
    pub async fn record_429(&self) {
        let mut recent = self.recent_429s.lock().await;
        if recent.len() == RECENT_429_CAPACITY {
            recent.pop_front();
        }
        recent.push_back(Instant::now());
        drop(recent);

        let mut rate = self.current_rate.lock().await;
        let new_rate = (*rate / 2.0).max(MIN_RATE);
        if (new_rate - *rate).abs() > f64::EPSILON {
            *rate = new_rate;
            tracing::warn!(new_rate, "rate limited by Canvas; halving request rate");
            *self.bucket.lock().await = TokenBucket::new(new_rate, DEFAULT_BURST);
        }
    }

    /// Evicts `recent_429s` older than the recovery window; if none remain,
    /// grows the rate by 10% (capped at `MAX_RATE`).
    pub async fn record_success(&self) {
        let mut recent = self.recent_429s.lock().await;
        let cutoff = Instant::now() - RECOVERY_WINDOW;
        while recent.front().is_some_and(|t| *t < cutoff) {
            recent.pop_front();
        }
        let clean = recent.is_empty();
        drop(recent);

        if clean {
            let mut rate = self.current_rate.lock().await;
            let new_rate = (*rate * 1.1).min(MAX_RATE);
            if (new_rate - *rate).abs() > f64::EPSILON {
                *rate = new_rate;
                *self.bucket.lock().await = TokenBucket::new(new_rate, DEFAULT_BURST);
            }
        }
    }

    pub async fn current_rate(&self) -> f64 {
        *self.current_rate.lock().await
    }
}
