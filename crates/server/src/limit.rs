//! Per-identity token-bucket rate limiting.
//!
//! Identity is the caller's API-key hash when a valid key is presented,
//! otherwise the client IP. Buckets hold `burst` tokens and refill at
//! `rpm / 60` per second; state is in-memory only and resets on restart,
//! which the contract permits.

use std::time::Instant;

use dashmap::DashMap;

/// Outcome of a limiter check, carrying everything the response headers
/// need.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit_rpm: u32,
    pub remaining: u32,
    pub retry_after_secs: u64,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

pub struct RateLimiter {
    buckets: DashMap<String, Bucket>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
        }
    }

    /// Take one token for `identity` from a bucket shaped (rpm, burst).
    pub fn check(&self, identity: &str, rpm: u32, burst: u32) -> RateDecision {
        let now = Instant::now();
        let rate_per_sec = f64::from(rpm) / 60.0;
        let capacity = f64::from(burst);

        let mut bucket = self.buckets.entry(identity.to_string()).or_insert(Bucket {
            tokens: capacity,
            last_refill: now,
        });
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * rate_per_sec).min(capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            RateDecision {
                allowed: true,
                limit_rpm: rpm,
                remaining: bucket.tokens.floor() as u32,
                retry_after_secs: 0,
            }
        } else {
            let deficit = 1.0 - bucket.tokens;
            RateDecision {
                allowed: false,
                limit_rpm: rpm,
                remaining: 0,
                retry_after_secs: (deficit / rate_per_sec).ceil() as u64,
            }
        }
    }

    /// Identities currently tracked; surfaced on the health endpoint.
    pub fn tracked_identities(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_then_throttle() {
        let limiter = RateLimiter::new();
        for i in 0..10 {
            let d = limiter.check("anon:10.0.0.1", 30, 10);
            assert!(d.allowed, "request {i} within burst should pass");
            assert_eq!(d.limit_rpm, 30);
        }
        let denied = limiter.check("anon:10.0.0.1", 30, 10);
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert!(denied.retry_after_secs >= 1);
    }

    #[test]
    fn identities_are_isolated() {
        let limiter = RateLimiter::new();
        for _ in 0..10 {
            assert!(limiter.check("anon:10.0.0.1", 30, 10).allowed);
        }
        assert!(!limiter.check("anon:10.0.0.1", 30, 10).allowed);
        assert!(limiter.check("anon:10.0.0.2", 30, 10).allowed);
        assert_eq!(limiter.tracked_identities(), 2);
    }

    #[test]
    fn keyed_budget_is_larger() {
        let limiter = RateLimiter::new();
        let mut allowed = 0;
        for _ in 0..25 {
            if limiter.check("key:abc", 120, 20).allowed {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 20);
    }

    #[test]
    fn remaining_counts_down() {
        let limiter = RateLimiter::new();
        let first = limiter.check("id", 30, 10);
        let second = limiter.check("id", 30, 10);
        assert!(first.remaining > second.remaining);
    }
}
