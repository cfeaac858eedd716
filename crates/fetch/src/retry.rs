//! Bounded exponential backoff for transient upstream failures.
//!
//! Delays double per attempt from `base_delay` up to `max_delay`, with 0-50%
//! jitter so synchronized workers do not hammer a recovering upstream in
//! lockstep. Jitter never feeds canonical output paths.

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            jitter: true,
        }
    }
}

/// Delay before retry number `attempt` (0-based).
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let base = policy.base_delay.as_millis() as u64;
    let exponential = base.saturating_mul(2u64.saturating_pow(attempt));
    let capped = exponential.min(policy.max_delay.as_millis() as u64);
    if policy.jitter {
        Duration::from_millis(capped + fastrand::u64(0..=capped / 2))
    } else {
        Duration::from_millis(capped)
    }
}

/// Only idempotent methods are replayable and retryable.
pub fn is_idempotent(method: &str) -> bool {
    matches!(
        method.to_ascii_uppercase().as_str(),
        "GET" | "HEAD" | "OPTIONS"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            jitter: false,
            ..Default::default()
        };
        assert_eq!(backoff_delay(&policy, 0), Duration::from_millis(200));
        assert_eq!(backoff_delay(&policy, 1), Duration::from_millis(400));
        assert_eq!(backoff_delay(&policy, 2), Duration::from_millis(800));
        assert_eq!(backoff_delay(&policy, 20), Duration::from_secs(10));
    }

    #[test]
    fn jitter_stays_within_half_delay() {
        let policy = RetryPolicy::default();
        for attempt in 0..5 {
            let base = backoff_delay(
                &RetryPolicy {
                    jitter: false,
                    ..policy
                },
                attempt,
            );
            let jittered = backoff_delay(&policy, attempt);
            assert!(jittered >= base);
            assert!(jittered <= base + base / 2);
        }
    }

    #[test]
    fn idempotent_methods_only() {
        assert!(is_idempotent("GET"));
        assert!(is_idempotent("head"));
        assert!(!is_idempotent("POST"));
        assert!(!is_idempotent("DELETE"));
    }
}
