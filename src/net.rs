//! Bounded retry with linear backoff for transient network failures.
//!
//! Only errors that report `is_transient()` are retried; application errors
//! (4xx, rate limits, malformed bodies) are returned on the first attempt.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};

pub const USER_AGENT: &str = concat!("efemerides-bot/", env!("CARGO_PKG_VERSION"));

pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for reqwest::Error {
    fn is_transient(&self) -> bool {
        self.is_timeout() || self.is_connect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never below 1.
    pub attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
        }
    }

    /// Single attempt, no waiting. Handy for tests.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Linear: attempt 1 waits 1×backoff, attempt 2 waits 2×backoff, ...
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

/// Run `op` until it succeeds, fails non-transiently, or attempts run out.
pub async fn with_retries<T, E, F, Fut>(policy: RetryPolicy, what: &str, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt < policy.attempts => {
                let wait = policy.delay_after(attempt);
                tracing::warn!(
                    target: "net",
                    what,
                    attempt,
                    wait_ms = wait.as_millis() as u64,
                    error = %e,
                    "transient failure, retrying"
                );
                tokio::time::sleep(wait).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Shared HTTP client with the configured per-request timeout.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .timeout(timeout)
        .build()
        .context("building HTTP client")
}
