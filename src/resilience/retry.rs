//! Retry with exponential backoff and jitter
//!
//! Wraps any fallible async operation. The delay grows as
//! `base * exponential_base^attempt`, capped at `max_delay`, and is
//! randomized by up to 50% so concurrent tasks do not retry in lockstep.
//! Exhausting all attempts returns the last error unchanged.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::config::RetryConfig;
use crate::error::Result;

/// Retry policy; pure configuration applied as a wrapper
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay: Duration::from_secs(60),
            exponential_base: 2.0,
            jitter: true,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            exponential_base: config.exponential_base,
            jitter: config.jitter,
        }
    }

    /// Backoff delay before retrying after the given zero-based attempt
    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.exponential_base.powi(attempt as i32);
        let raw = self.base_delay.as_secs_f64() * exp;
        let capped = raw.min(self.max_delay.as_secs_f64());

        let jittered = if self.jitter {
            capped * (0.5 + rand::thread_rng().gen::<f64>() * 0.5)
        } else {
            capped
        };

        Duration::from_secs_f64(jittered)
    }

    /// Run `op`, retrying transient failures up to `max_attempts` total
    /// invocations.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_err = None;

        for attempt in 0..self.max_attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if attempt + 1 == self.max_attempts {
                        last_err = Some(e);
                        break;
                    }

                    let delay = self.delay_for(attempt);
                    warn!(
                        "attempt {} failed: {}. Retrying in {:.2}s...",
                        attempt + 1,
                        e,
                        delay.as_secs_f64()
                    );
                    last_err = Some(e);
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(last_err.expect("at least one attempt was made"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            exponential_base: 2.0,
            jitter: false,
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_k_failures() {
        let policy = fast_policy(5);
        let calls = AtomicU32::new(0);

        let result = policy
            .run(|| async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(Error::Rpc("transient".into()))
                } else {
                    Ok(n)
                }
            })
            .await;

        // Failed twice then succeeded: invoked exactly k+1 = 3 times
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let policy = fast_policy(3);
        let calls = AtomicU32::new(0);

        let result: Result<()> = policy
            .run(|| async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::Rpc(format!("failure {}", n)))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(Error::Rpc(msg)) => assert_eq!(msg, "failure 2"),
            other => panic!("expected last Rpc error, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_first_try_success_invokes_once() {
        let policy = fast_policy(3);
        let calls = AtomicU32::new(0);

        let result = policy
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Error>("ok")
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delay_growth_and_cap() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            exponential_base: 2.0,
            jitter: false,
        };

        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        // Capped at max_delay
        assert_eq!(policy.delay_for(3), Duration::from_millis(500));
        assert_eq!(policy.delay_for(8), Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_stays_within_half_to_full_delay() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
            exponential_base: 2.0,
            jitter: true,
        };

        for _ in 0..50 {
            let d = policy.delay_for(1);
            assert!(d >= Duration::from_millis(100), "jitter below 50%: {:?}", d);
            assert!(d <= Duration::from_millis(200), "jitter above 100%: {:?}", d);
        }
    }
}
