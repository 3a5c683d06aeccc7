use crate::profiles::ProfileTable;
use parking_lot::Mutex;
use sq_domain::error::{Error, Result};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Timeout applied to keys without a profile entry.
pub const DEFAULT_THROTTLE_TIMEOUT: Duration = Duration::from_secs(30);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Token bucket
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug)]
struct Bucket {
    /// Capacity and refill rate, both `max_requests_per_second`.
    capacity: f64,
    tokens: f64,
    last_refill: Instant,
    timeout: Duration,
}

impl Bucket {
    fn new(max_requests_per_second: u32, timeout: Duration) -> Self {
        let capacity = f64::from(max_requests_per_second);
        Self {
            capacity,
            tokens: capacity,
            last_refill: Instant::now(),
            timeout,
        }
    }

    /// Continuous refill at `capacity` tokens per second.
    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.capacity).min(self.capacity);
        self.last_refill = now;
    }

    /// Take one token, or report how long until one is available.
    fn try_take(&mut self, now: Instant) -> std::result::Result<(), Duration> {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(deficit / self.capacity))
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Throttle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Token-bucket limiter keyed by `"provider/model"`.
///
/// `max_requests_per_second = 0` means unlimited: no bucket exists for
/// the key and [`Throttle::wait_for_token`] returns immediately.
/// Unknown keys receive no throttle and the default 30 s timeout.
pub struct Throttle {
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl Throttle {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Seed buckets for every profiled model with a non-zero rate.
    pub fn from_profiles(profiles: &ProfileTable) -> Self {
        let throttle = Self::new();
        {
            let mut buckets = throttle.buckets.lock();
            for (key, profile) in profiles.iter() {
                if profile.max_requests_per_second > 0 {
                    buckets.insert(
                        key.to_string(),
                        Bucket::new(
                            profile.max_requests_per_second,
                            Duration::from_millis(profile.request_timeout_ms),
                        ),
                    );
                }
            }
        }
        throttle
    }

    /// The per-key request timeout (default 30 s for unknown keys).
    pub fn timeout_for(&self, key: &str) -> Duration {
        self.buckets
            .lock()
            .get(key)
            .map_or(DEFAULT_THROTTLE_TIMEOUT, |b| b.timeout)
    }

    /// Replace a key's bucket atomically. `max_requests = 0` removes it
    /// (unlimited).
    pub fn update_rate_limit(&self, key: &str, max_requests: u32, timeout_ms: u64) {
        let mut buckets = self.buckets.lock();
        if max_requests == 0 {
            buckets.remove(key);
        } else {
            buckets.insert(
                key.to_string(),
                Bucket::new(max_requests, Duration::from_millis(timeout_ms)),
            );
        }
    }

    /// Acquire one token for `key`, suspending until one refills or the
    /// caller is cancelled. Returns the time spent waiting.
    ///
    /// The lock is never held across an await point.
    pub async fn wait_for_token(
        &self,
        cancel: &CancellationToken,
        key: &str,
    ) -> Result<Duration> {
        let started = Instant::now();
        loop {
            let wait = {
                let mut buckets = self.buckets.lock();
                match buckets.get_mut(key) {
                    None => return Ok(started.elapsed()),
                    Some(bucket) => match bucket.try_take(Instant::now()) {
                        Ok(()) => return Ok(started.elapsed()),
                        Err(wait) => wait,
                    },
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(Error::Cancelled(format!("throttle wait for '{key}'")));
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unlimited_key_never_waits() {
        let throttle = Throttle::new();
        let cancel = CancellationToken::new();
        for _ in 0..100 {
            throttle.wait_for_token(&cancel, "any/model").await.unwrap();
        }
    }

    #[tokio::test]
    async fn burst_up_to_capacity_is_immediate() {
        let throttle = Throttle::new();
        throttle.update_rate_limit("p/m", 5, 1000);
        let cancel = CancellationToken::new();
        for _ in 0..5 {
            let waited = throttle.wait_for_token(&cancel, "p/m").await.unwrap();
            assert!(waited < Duration::from_millis(50), "waited {waited:?}");
        }
    }

    #[tokio::test]
    async fn over_capacity_call_suspends_at_steady_state() {
        let throttle = Throttle::new();
        throttle.update_rate_limit("p/m", 4, 1000);
        let cancel = CancellationToken::new();

        for _ in 0..4 {
            throttle.wait_for_token(&cancel, "p/m").await.unwrap();
        }
        // Bucket is empty; the next token refills at 1/4 s.
        let waited = throttle.wait_for_token(&cancel, "p/m").await.unwrap();
        assert!(
            waited >= Duration::from_millis(240),
            "expected ≥ ~250ms wait, got {waited:?}"
        );
    }

    #[tokio::test]
    async fn cancellation_interrupts_wait() {
        let throttle = std::sync::Arc::new(Throttle::new());
        throttle.update_rate_limit("p/m", 1, 1000);
        let cancel = CancellationToken::new();
        throttle.wait_for_token(&cancel, "p/m").await.unwrap();

        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel_clone.cancel();
        });

        let err = throttle.wait_for_token(&cancel, "p/m").await.unwrap_err();
        assert!(matches!(err, Error::Cancelled(_)));
    }

    #[tokio::test]
    async fn setting_rate_zero_removes_bucket() {
        let throttle = Throttle::new();
        throttle.update_rate_limit("p/m", 1, 1000);
        let cancel = CancellationToken::new();
        throttle.wait_for_token(&cancel, "p/m").await.unwrap();

        throttle.update_rate_limit("p/m", 0, 1000);
        // Now unlimited: repeated acquisitions return immediately.
        for _ in 0..10 {
            let waited = throttle.wait_for_token(&cancel, "p/m").await.unwrap();
            assert!(waited < Duration::from_millis(50));
        }
    }

    #[test]
    fn timeout_defaults_for_unknown_keys() {
        let throttle = Throttle::new();
        assert_eq!(throttle.timeout_for("ghost/model"), DEFAULT_THROTTLE_TIMEOUT);
        throttle.update_rate_limit("p/m", 2, 12_000);
        assert_eq!(throttle.timeout_for("p/m"), Duration::from_millis(12_000));
    }
}
