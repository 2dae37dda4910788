//! Failure classification and retry with backoff.
//!
//! [`RetryPolicy::run`] re-invokes an attempt while it fails with a transient
//! error, sleeping between attempts:
//!
//! | Failure                               | Class     | Delay before retry `n` (0-based)      |
//! |---------------------------------------|-----------|---------------------------------------|
//! | 429                                   | transient | `Retry-After` or `rate_limit_delay`   |
//! | 500, 502, 503, 504, timeout, network  | transient | `base_delay * 2^n`, capped            |
//! | 401                                   | auth      | not retried                           |
//! | any other status, rejected envelope   | permanent | not retried                           |
//!
//! Sleeping goes through the [`Sleeper`] trait so tests can record delays
//! instead of waiting for them.

use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use manjaka_core::{ApiError, StatusCode};
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::metrics;

/// How a failure should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Worth retrying after a delay.
    Transient,
    /// The session was rejected; handled by session teardown, never retried.
    Authentication,
    /// Retrying cannot help.
    Permanent,
}

/// Waits between attempts.
#[async_trait]
pub trait Sleeper: Debug + Send + Sync {
    /// Suspends the caller for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by [`tokio::time::sleep`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Retry schedule applied to every outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    rate_limit_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Creates a policy from configuration.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.base_delay,
            rate_limit_delay: config.rate_limit_delay,
            max_delay: config.max_delay,
        }
    }

    /// A policy that never retries.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Number of retries after the first attempt.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Classifies a failure.
    pub fn classify(&self, error: &ApiError) -> FailureClass {
        match error {
            ApiError::Unauthorized { .. } => FailureClass::Authentication,
            ApiError::Timeout(_) | ApiError::Transport(_) => FailureClass::Transient,
            ApiError::Status { status, .. } if is_transient_status(*status) => {
                FailureClass::Transient
            }
            _ => FailureClass::Permanent,
        }
    }

    /// Delay before retry number `retry` (0-based) after `error`.
    pub fn delay(&self, retry: u32, error: &ApiError) -> Duration {
        if error.status() == Some(StatusCode::TOO_MANY_REQUESTS) {
            return error.retry_after().unwrap_or(self.rate_limit_delay);
        }
        let factor = 2u32.saturating_pow(retry);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Runs `attempt` until it succeeds, fails non-transiently, or retries run out.
    ///
    /// `attempt` receives the 0-based attempt number.
    pub async fn run<T, F, Fut>(&self, sleeper: &dyn Sleeper, mut attempt: F) -> Result<T, ApiError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut retry = 0;
        loop {
            let error = match attempt(retry).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            let class = self.classify(&error);
            if class != FailureClass::Transient {
                debug!(?class, %error, "not retrying");
                return Err(error);
            }
            if retry >= self.max_retries {
                warn!(attempts = retry + 1, %error, "retries exhausted");
                return Err(error);
            }

            let delay = self.delay(retry, &error);
            warn!(
                retry = retry + 1,
                max_retries = self.max_retries,
                delay_ms = delay.as_millis() as u64,
                %error,
                "transient failure, retrying"
            );
            metrics::record_retry(error.status().map(|status| status.as_u16()));
            sleeper.sleep(delay).await;
            retry += 1;
        }
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}
