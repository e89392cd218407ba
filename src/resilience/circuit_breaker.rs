//! Circuit breaker for failing external dependencies
//!
//! Wraps fallible calls to an RPC endpoint class or external API. After
//! `failure_threshold` consecutive failures the breaker opens and calls fail
//! fast with `Error::CircuitOpen` until `open_timeout` elapses; then exactly
//! one trial call is allowed through (half-open), deciding the next state.

use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls pass through; failures increment the counter
    Closed,
    /// Calls fail fast until the open timeout elapses
    Open,
    /// One trial call in flight decides Closed or Open
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    trial_in_flight: bool,
}

/// Circuit breaker guarding a single dependency
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    open_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: u32, open_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold,
            open_timeout,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                last_failure: None,
                trial_in_flight: false,
            }),
        }
    }

    /// Execute `op` under breaker protection.
    ///
    /// When open, returns `Error::CircuitOpen` without invoking `op`.
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.before_call().await?;

        match op().await {
            Ok(value) => {
                self.on_success().await;
                Ok(value)
            }
            Err(e) => {
                self.on_failure().await;
                Err(e)
            }
        }
    }

    /// Current state, refreshing the open-timeout transition
    pub async fn state(&self) -> BreakerState {
        let inner = self.inner.lock().await;
        if inner.state == BreakerState::Open && self.open_elapsed(&inner) {
            BreakerState::HalfOpen
        } else {
            inner.state
        }
    }

    fn open_elapsed(&self, inner: &BreakerInner) -> bool {
        inner
            .last_failure
            .map(|t| t.elapsed() >= self.open_timeout)
            .unwrap_or(true)
    }

    async fn before_call(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => {
                if self.open_elapsed(&inner) {
                    debug!("circuit '{}' half-open, allowing trial call", self.name);
                    inner.state = BreakerState::HalfOpen;
                    inner.trial_in_flight = true;
                    Ok(())
                } else {
                    Err(Error::CircuitOpen)
                }
            }
            BreakerState::HalfOpen => {
                // Only one trial call may probe the dependency at a time
                if inner.trial_in_flight {
                    Err(Error::CircuitOpen)
                } else {
                    inner.trial_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    async fn on_success(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state == BreakerState::HalfOpen {
            debug!("circuit '{}' closed after successful trial", self.name);
        }
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.trial_in_flight = false;
    }

    async fn on_failure(&self) {
        let mut inner = self.inner.lock().await;
        inner.consecutive_failures += 1;
        inner.last_failure = Some(Instant::now());
        inner.trial_in_flight = false;

        match inner.state {
            BreakerState::HalfOpen => {
                warn!("circuit '{}' re-opened: trial call failed", self.name);
                inner.state = BreakerState::Open;
            }
            BreakerState::Closed if inner.consecutive_failures >= self.failure_threshold => {
                warn!(
                    "circuit '{}' opened after {} consecutive failures",
                    self.name, inner.consecutive_failures
                );
                inner.state = BreakerState::Open;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn breaker(threshold: u32, timeout_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new("test", threshold, Duration::from_millis(timeout_ms))
    }

    async fn failing_call(breaker: &CircuitBreaker, calls: &AtomicU32) -> Result<()> {
        breaker
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::Rpc("boom".into()))
            })
            .await
    }

    #[tokio::test]
    async fn test_opens_after_threshold_consecutive_failures() {
        let breaker = breaker(3, 60000);
        let calls = AtomicU32::new(0);

        for _ in 0..3 {
            let _ = failing_call(&breaker, &calls).await;
        }
        assert_eq!(breaker.state().await, BreakerState::Open);

        // Next call fails fast without invoking the wrapped function
        let result = failing_call(&breaker, &calls).await;
        assert!(matches!(result, Err(Error::CircuitOpen)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let breaker = breaker(3, 60000);
        let calls = AtomicU32::new(0);

        let _ = failing_call(&breaker, &calls).await;
        let _ = failing_call(&breaker, &calls).await;
        breaker.call(|| async { Ok::<_, Error>(()) }).await.unwrap();
        let _ = failing_call(&breaker, &calls).await;
        let _ = failing_call(&breaker, &calls).await;

        // Never reached three *consecutive* failures
        assert_eq!(breaker.state().await, BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_trial_success_closes() {
        let breaker = breaker(1, 50);
        let calls = AtomicU32::new(0);

        let _ = failing_call(&breaker, &calls).await;
        assert_eq!(breaker.state().await, BreakerState::Open);

        tokio::time::sleep(Duration::from_millis(60)).await;

        // Trial call allowed and succeeds
        breaker.call(|| async { Ok::<_, Error>(42) }).await.unwrap();
        assert_eq!(breaker.state().await, BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_trial_failure_reopens() {
        let breaker = breaker(1, 50);
        let calls = AtomicU32::new(0);

        let _ = failing_call(&breaker, &calls).await;
        tokio::time::sleep(Duration::from_millis(60)).await;

        let _ = failing_call(&breaker, &calls).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // Re-opened: immediate call fails fast
        let result = failing_call(&breaker, &calls).await;
        assert!(matches!(result, Err(Error::CircuitOpen)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
