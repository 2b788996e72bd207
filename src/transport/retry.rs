//! PL-011: Bounded retry with exponential backoff.
//!
//! Retries transient transport failures and a fixed set of response
//! statuses. When retries run out on a retryable status the last response
//! is returned as-is; only transport-level exhaustion becomes an error.

use super::{HttpRequest, HttpResponse, Transport, TransportError};
use crate::core::types::HttpSettings;
use std::time::Duration;
use tracing::debug;

/// Statuses that are worth another attempt.
pub const RETRY_STATUSES: [u16; 7] = [429, 500, 502, 503, 504, 598, 599];

/// Retry schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Seconds; delay before retry n is factor * 2^(n-1)
    pub backoff_factor: f64,
    pub backoff_max: Duration,
    pub retry_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff_factor: 0.3,
            backoff_max: Duration::from_secs(120),
            retry_statuses: RETRY_STATUSES.to_vec(),
        }
    }
}

impl From<&HttpSettings> for RetryPolicy {
    fn from(settings: &HttpSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            backoff_factor: settings.backoff_factor,
            ..Self::default()
        }
    }
}

impl RetryPolicy {
    /// Delay before the `retry`-th retry (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        if retry == 0 || self.backoff_factor <= 0.0 {
            return Duration::ZERO;
        }
        let exp = 2f64.powi(retry.saturating_sub(1).min(62) as i32);
        let secs = (self.backoff_factor * exp).min(self.backoff_max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retry_statuses.contains(&status)
    }
}

/// A transport that retries its inner transport per `RetryPolicy`.
pub struct RetryingClient<T> {
    inner: T,
    policy: RetryPolicy,
    sleep: fn(Duration),
}

impl<T: Transport> RetryingClient<T> {
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            sleep: std::thread::sleep,
        }
    }

    /// Replace the sleeper (tests pass a no-op).
    pub fn with_sleeper(mut self, sleep: fn(Duration)) -> Self {
        self.sleep = sleep;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

impl<T: Transport> Transport for RetryingClient<T> {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut retry = 0;
        loop {
            let outcome = self.inner.send(request);
            let retries_left = retry < self.policy.max_retries;
            match outcome {
                Ok(resp) if retries_left && self.policy.is_retryable_status(resp.status) => {
                    debug!(
                        method = %request.method,
                        url = %request.url,
                        status = resp.status,
                        retry = retry + 1,
                        "retrying after status"
                    );
                }
                Err(ref e) if retries_left && e.is_transient() => {
                    debug!(
                        method = %request.method,
                        url = %request.url,
                        error = %e,
                        retry = retry + 1,
                        "retrying after transport error"
                    );
                }
                other => return other,
            }
            retry += 1;
            (self.sleep)(self.policy.backoff(retry));
        }
    }
}
