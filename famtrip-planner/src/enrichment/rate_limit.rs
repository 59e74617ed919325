//! Per-service token buckets with a bounded wait
//!
//! Quotas are process-wide: one limiter per external service, shared by every
//! trip, because the providers enforce limits per API key.

use governor::clock::{Clock as _, DefaultClock};
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Token bucket for one external service
pub struct ServiceLimiter {
    service: &'static str,
    limiter: DirectLimiter,
    clock: DefaultClock,
    /// Longest a caller may wait for a token
    max_wait: Duration,
}

impl ServiceLimiter {
    pub fn new(service: &'static str, quota: Quota, max_wait: Duration) -> Self {
        Self {
            service,
            limiter: RateLimiter::direct(quota),
            clock: DefaultClock::default(),
            max_wait,
        }
    }

    /// `rate` tokens per second, holding at most `burst`
    pub fn per_second(
        service: &'static str,
        rate: NonZeroU32,
        burst: NonZeroU32,
        max_wait: Duration,
    ) -> Self {
        Self::new(service, Quota::per_second(rate).allow_burst(burst), max_wait)
    }

    /// `rate` tokens per minute
    pub fn per_minute(service: &'static str, rate: NonZeroU32, max_wait: Duration) -> Self {
        Self::new(service, Quota::per_minute(rate), max_wait)
    }

    /// Take a token, waiting at most `max_wait` for one to free up
    ///
    /// Returns false when no token is available in time; the caller should
    /// degrade instead of queueing.
    pub async fn acquire(&self) -> bool {
        let wait = match self.limiter.check() {
            Ok(()) => return true,
            Err(not_until) => not_until.wait_time_from(self.clock.now()),
        };

        if wait > self.max_wait {
            tracing::debug!(
                service = self.service,
                wait_ms = wait.as_millis() as u64,
                "Rate limit token too far out, degrading"
            );
            return false;
        }

        tracing::debug!(service = self.service, wait_ms = wait.as_millis() as u64, "Rate limiting: waiting");
        match tokio::time::timeout(self.max_wait, self.limiter.until_ready()).await {
            Ok(()) => true,
            Err(_) => {
                tracing::debug!(service = self.service, "Rate limit wait expired");
                false
            }
        }
    }

    pub fn service(&self) -> &'static str {
        self.service
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn nz(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    #[tokio::test]
    async fn test_burst_is_granted_immediately() {
        let limiter = ServiceLimiter::per_second("test", nz(1), nz(3), Duration::from_millis(10));
        assert!(limiter.acquire().await);
        assert!(limiter.acquire().await);
        assert!(limiter.acquire().await);
    }

    #[tokio::test]
    async fn test_exhausted_bucket_degrades_without_long_wait() {
        let limiter = ServiceLimiter::per_minute("test", nz(1), Duration::from_millis(50));
        assert!(limiter.acquire().await);

        let start = Instant::now();
        assert!(!limiter.acquire().await);
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_short_wait_is_honoured() {
        // 20 tokens/second refills one token every 50ms
        let limiter = ServiceLimiter::per_second("test", nz(20), nz(1), Duration::from_millis(500));
        assert!(limiter.acquire().await);
        assert!(limiter.acquire().await);
    }
}
