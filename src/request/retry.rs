use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};

/// Whether to try again, and after how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub should_retry: bool,
    pub delay: Duration,
}

impl RetryDecision {
    const STOP: RetryDecision = RetryDecision { should_retry: false, delay: Duration::ZERO };
}

/// Status-driven retry classification with capped exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Retries after the first attempt; total attempts never exceed `max_retries + 1`.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { base_delay: Duration::from_secs(1), max_delay: Duration::from_secs(10), max_retries: 3 }
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &crate::config::PortalConfig) -> Self {
        Self { base_delay: cfg.retry_base_delay(), max_delay: cfg.retry_max_delay(), max_retries: cfg.max_retries }
    }

    /// `min(base * 2^attempt, max)`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Classify a failure. `status` is `None` (or 0) when no HTTP response arrived.
    pub fn decide(&self, status: Option<u16>, attempt: u32) -> RetryDecision {
        let status = status.filter(|s| *s != 0);
        let retryable = match status {
            Some(408) | Some(429) => true,
            Some(s) if (400..500).contains(&s) => false,
            Some(501) | Some(505) => false,
            _ => true,
        };
        if !retryable || attempt >= self.max_retries {
            return RetryDecision::STOP;
        }
        RetryDecision { should_retry: true, delay: self.backoff(attempt) }
    }

    /// Classify an error. Only transport failures are ever retried.
    pub fn decide_for(&self, err: &AppError, attempt: u32) -> RetryDecision {
        match err {
            AppError::Transport { status, .. } => self.decide(*status, attempt),
            _ => RetryDecision::STOP,
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the attempt budget
    /// is spent. The last error is returned unchanged.
    pub async fn run<T, F, Fut>(&self, backoff: &dyn Backoff, mut op: F) -> AppResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op(attempt).await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    let d = self.decide_for(&e, attempt);
                    if !d.should_retry {
                        debug!(target: "hrportal::request", "giving up after attempt {}: {}", attempt, e);
                        return Err(e);
                    }
                    info!(target: "hrportal::request", "attempt {} failed ({}); retrying in {:?}", attempt, e, d.delay);
                    backoff.wait(d.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Waits between attempts.
#[async_trait]
pub trait Backoff: Send + Sync {
    async fn wait(&self, delay: Duration);
}

/// Real sleep on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioBackoff;

#[async_trait]
impl Backoff for TokioBackoff {
    async fn wait(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}
