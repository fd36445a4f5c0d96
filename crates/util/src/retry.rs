//! Bounded, fixed-interval retries for remote operations.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

/// Default attempts for network interface updates.
const NIC_UPDATE_ATTEMPTS: u32 = 20;

/// Default pause between network interface update attempts.
const NIC_UPDATE_INTERVAL: Duration = Duration::from_secs(10);

/// Default attempts for forwarding rule target updates.
const FORWARDING_RULE_ATTEMPTS: u32 = 20;

/// Forwarding rule propagation is slower than NIC updates.
const FORWARDING_RULE_INTERVAL: Duration = Duration::from_secs(30);

/// How often and how far apart an operation is retried.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts (including the first one). Zero behaves as one.
    pub max_attempts: u32,

    /// Pause between attempts.
    pub interval: Duration,

    /// Adds up to half an interval of random delay to each pause.
    pub jitter: bool,
}

impl RetryPolicy {
    /// Creates a fixed-interval policy without jitter.
    #[must_use]
    pub const fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            jitter: false,
        }
    }

    /// Enables randomized extra delay between attempts.
    #[must_use]
    pub const fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    /// Policy used for alias IP updates on network interfaces.
    #[must_use]
    pub const fn nic_update() -> Self {
        Self::new(NIC_UPDATE_ATTEMPTS, NIC_UPDATE_INTERVAL)
    }

    /// Policy used for forwarding rule target updates.
    #[must_use]
    pub const fn forwarding_rule() -> Self {
        Self::new(FORWARDING_RULE_ATTEMPTS, FORWARDING_RULE_INTERVAL)
    }

    fn pause(&self) -> Duration {
        if !self.jitter || self.interval.is_zero() {
            return self.interval;
        }

        let max_extra = u64::try_from(self.interval.as_millis() / 2).unwrap_or(u64::MAX);
        let extra = rand::thread_rng().gen_range(0..=max_extra);

        self.interval + Duration::from_millis(extra)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::nic_update()
    }
}

/// Runs `op` until it succeeds or the policy's attempts are used up.
///
/// The last error is returned after exhaustion. Every failed attempt is logged
/// with `label` so operators can follow slow propagation in the logs.
///
/// # Errors
///
/// Returns the error of the final attempt when all attempts fail.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, label: &str, op: F) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    retry_when(policy, label, op, |_| true).await
}

/// Like [`retry`], but gives up at once on errors `retryable` rejects.
///
/// # Errors
///
/// Returns the first error `retryable` rejects, or the error of the final
/// attempt when all attempts fail.
pub async fn retry_when<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
    retryable: P,
) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{label} succeeded after {attempt} attempts");
                }
                return Ok(value);
            }
            Err(e) if !retryable(&e) => {
                warn!("{label} failed permanently: {e}");
                return Err(e);
            }
            Err(e) if attempt >= attempts => {
                warn!("{label} failed after {attempt} attempts: {e}");
                return Err(e);
            }
            Err(e) => {
                warn!("{label} attempt {attempt}/{attempts} failed: {e}");
                attempt += 1;
                tokio::time::sleep(policy.pause()).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<u32, String> = retry(&fast(5), "flaky", || {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 { Err(format!("not ready {n}")) } else { Ok(n) }
            }
        })
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_returns_last_error_when_exhausted() {
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), String> = retry(&fast(4), "always failing", || {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err(format!("attempt {n}"))
            }
        })
        .await;

        assert_eq!(result, Err("attempt 4".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));

        let _: Result<(), &str> = retry(&fast(0), "once", || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("nope")
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), String> = retry_when(
            &fast(5),
            "rejected",
            || {
                let calls = calls.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    if n == 1 {
                        Err("busy".to_string())
                    } else {
                        Err("invalid".to_string())
                    }
                }
            },
            |e| e == "busy",
        )
        .await;

        assert_eq!(result, Err("invalid".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100)).with_jitter();

        for _ in 0..50 {
            let pause = policy.pause();
            assert!(pause >= Duration::from_millis(100));
            assert!(pause <= Duration::from_millis(150));
        }
    }

    #[test]
    fn test_forwarding_rule_waits_longer_than_nic() {
        assert!(RetryPolicy::forwarding_rule().interval > RetryPolicy::nic_update().interval);
    }
}
