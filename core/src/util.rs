use std::time::Duration;

use rand::Rng;

/// Backoff delay for the `attempt`-th retry (1-indexed) of a Canvas request
/// that received a `429` with no usable `Retry-After` header: `2s * 2^(attempt-1)`,
/// jittered by +/-20% to avoid synchronized retries across concurrent callers.
pub fn backoff(attempt: u64) -> Duration {
    let base_delay_ms = 2_000u64 * (1u64 << attempt.saturating_sub(1).min(10));
    let jitter = rand::rng().random_range(0.8..1.2);
    let delay_ms = (base_delay_ms as f64 * jitter) as u64;
    Duration::from_millis(delay_ms)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn backoff_grows_with_attempt_number() {
        let first = backoff(1).as_millis();
        let second = backoff(2).as_millis();
        // jitter can overlap ranges slightly, so compare against the
        // un-jittered floor of the next attempt instead of a strict pairwise
        // comparison.
        assert!(first <= 2_000 * 12 / 10);
        assert!(second >= 4_000 * 8 / 10);
    }

    #[test]
    fn backoff_never_panics_on_large_attempt() {
        let _ = backoff(1000);
    }
}
