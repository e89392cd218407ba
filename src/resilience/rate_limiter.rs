//! Sliding-window rate limiter for RPC endpoints
//!
//! Never drops calls, only delays them. Safe for any number of concurrent
//! tasks: the timestamp deque is mutex-protected and waits happen outside
//! the lock.

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Rate limiter bounding admissions to `max_calls` per trailing `window`
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            max_calls,
            window,
            calls: Mutex::new(VecDeque::with_capacity(max_calls)),
        }
    }

    /// Convenience constructor for the common calls-per-second case
    pub fn per_second(max_calls: usize) -> Self {
        Self::new(max_calls, Duration::from_secs(1))
    }

    /// Block the calling task until an admission slot is free.
    ///
    /// Expired timestamps are pruned before admission, so at most
    /// `max_calls` acquisitions can be granted inside any window-length
    /// interval regardless of caller count.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut calls = self.calls.lock().await;
                let now = Instant::now();

                while let Some(front) = calls.front() {
                    if now.duration_since(*front) >= self.window {
                        calls.pop_front();
                    } else {
                        break;
                    }
                }

                if calls.len() < self.max_calls {
                    calls.push_back(now);
                    return;
                }

                // Oldest stamp determines when a slot opens up
                self.window - now.duration_since(*calls.front().expect("non-empty"))
            };

            if !wait.is_zero() {
                debug!("rate limit reached, waiting {:?}", wait);
                tokio::time::sleep(wait).await;
            } else {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }

    /// Number of admissions currently inside the window
    pub async fn in_flight(&self) -> usize {
        let mut calls = self.calls.lock().await;
        let now = Instant::now();
        while let Some(front) = calls.front() {
            if now.duration_since(*front) >= self.window {
                calls.pop_front();
            } else {
                break;
            }
        }
        calls.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_admits_up_to_max_without_waiting() {
        let limiter = RateLimiter::new(3, Duration::from_secs(1));

        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(100));
        assert_eq!(limiter.in_flight().await, 3);
    }

    #[tokio::test]
    async fn test_fourth_call_waits_for_window() {
        let limiter = RateLimiter::new(3, Duration::from_millis(200));

        for _ in 0..3 {
            limiter.acquire().await;
        }

        let start = Instant::now();
        limiter.acquire().await;
        // Had to wait roughly one window for the oldest stamp to expire
        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_concurrent_callers_respect_window_bound() {
        let limiter = Arc::new(RateLimiter::new(5, Duration::from_millis(250)));
        let granted = Arc::new(tokio::sync::Mutex::new(Vec::<Instant>::new()));

        let mut handles = Vec::new();
        for _ in 0..15 {
            let limiter = limiter.clone();
            let granted = granted.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                granted.lock().await.push(Instant::now());
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // No window-length interval may contain more than max_calls grants
        let grants = granted.lock().await;
        for (i, t) in grants.iter().enumerate() {
            let in_window = grants
                .iter()
                .filter(|other| {
                    **other >= *t && other.duration_since(*t) < Duration::from_millis(250)
                })
                .count();
            assert!(
                in_window <= 5,
                "grant {} saw {} admissions inside one window",
                i,
                in_window
            );
        }
    }
}
