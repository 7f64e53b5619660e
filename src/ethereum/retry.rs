//! Outbound request throttling and retry.
//!
//! [`RateLimiter`] caps how many requests may start inside a rolling window and is
//! shared (behind an `Arc`) by every explorer request in the process.
//! [`RetryPolicy`] re-runs a failing operation with exponential backoff and
//! surfaces the last error once its budget is spent.

use std::collections::VecDeque;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1), 2.0)
    }
}

impl RetryPolicy {
    /// `max_retries` counts retries after the first attempt.
    pub fn new(max_retries: u32, base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_retries,
            base_delay,
            backoff_factor,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Delay to wait after the failed attempt with 0-based index `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_factor.powi(attempt as i32);
        Duration::try_from_secs_f64(self.base_delay.as_secs_f64() * factor)
            .unwrap_or(self.base_delay)
    }

    /// Runs `op` until it succeeds or the retry budget is exhausted.
    pub async fn run<T, E, F, Fut>(&self, op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.run_if(op, |_| true).await
    }

    /// Like [`RetryPolicy::run`], but errors for which `retryable` returns false
    /// are returned immediately.
    pub async fn run_if<T, E, F, Fut, P>(&self, mut op: F, retryable: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= self.max_retries || !retryable(&e) => {
                    debug!("Giving up after {} attempt(s): {}", attempt + 1, e);
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "Attempt {}/{} failed, retrying in {:?}: {}",
                        attempt + 1,
                        self.max_attempts(),
                        delay,
                        e
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Rolling-window limiter: at most `max_requests` acquisitions per `period`.
///
/// Callers wait for a slot instead of being rejected. The lock is held while
/// waiting so slots are handed out in arrival order.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    period: Duration,
    issued: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, period: Duration) -> Self {
        let max_requests = max_requests.max(1) as usize;
        Self {
            max_requests,
            period,
            issued: Mutex::new(VecDeque::with_capacity(max_requests)),
        }
    }

    pub fn per_second(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(1))
    }

    pub async fn acquire(&self) {
        let mut issued = self.issued.lock().await;

        let now = Instant::now();
        while issued
            .front()
            .is_some_and(|started| now.duration_since(*started) >= self.period)
        {
            issued.pop_front();
        }

        if issued.len() >= self.max_requests {
            if let Some(oldest) = issued.pop_front() {
                sleep_until(oldest + self.period).await;
            }
        }

        issued.push_back(Instant::now());
    }
}
