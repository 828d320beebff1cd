//! Automatic retry of transient failures.
//!
//! One [`RetryPolicy`] belongs to each client and is applied the same way
//! to `http` and `https` hosts. A call is retried when the server answers
//! with a status from the force-list, or when the connection could not be
//! established at all. Read timeouts are never retried.

use std::time::Duration;

use depot_core::backoff::{backoff_delay, DEFAULT_BACKOFF_FACTOR, DEFAULT_MAX_BACKOFF};
use reqwest::{RequestBuilder, Response, StatusCode};

/// Retry configuration shared by every call a client makes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub total: u32,
    /// Multiplier for the exponential backoff between retries.
    pub backoff_factor: Duration,
    /// Ceiling for a single backoff sleep.
    pub max_backoff: Duration,
    /// Response statuses that trigger a retry.
    pub status_forcelist: Vec<u16>,
    /// Also retry force-listed statuses on `submit`, at the risk of
    /// duplicate submissions when the server failed after persisting.
    pub retry_non_idempotent: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            total: 3,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            max_backoff: DEFAULT_MAX_BACKOFF,
            status_forcelist: vec![500, 400],
            retry_non_idempotent: false,
        }
    }
}

/// Whether repeating a call can change server state more than once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallKind {
    Idempotent,
    NonIdempotent,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            total: 0,
            ..Default::default()
        }
    }

    /// Sleep before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        backoff_delay(self.backoff_factor, retry, self.max_backoff)
    }

    pub(crate) fn retries_status(&self, status: StatusCode, kind: CallKind) -> bool {
        let listed = self.status_forcelist.contains(&status.as_u16());
        listed && (kind == CallKind::Idempotent || self.retry_non_idempotent)
    }
}

/// Send a request, rebuilding and resending it per `policy`.
///
/// When retries run out on a force-listed status the last response is
/// returned as-is so the caller applies its normal status handling.
pub(crate) async fn send_with_retry<F>(
    policy: &RetryPolicy,
    kind: CallKind,
    mut build: F,
) -> Result<Response, reqwest::Error>
where
    F: FnMut() -> RequestBuilder,
{
    let mut retry = 0u32;

    loop {
        let exhausted = retry >= policy.total;

        match build().send().await {
            Ok(response) => {
                let status = response.status();
                if exhausted || !policy.retries_status(status, kind) {
                    return Ok(response);
                }
                retry += 1;
                let delay = policy.delay_for(retry);
                tracing::warn!(
                    status = status.as_u16(),
                    retry,
                    ?delay,
                    "Dispatch server returned retryable status",
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if exhausted || !e.is_connect() {
                    return Err(e);
                }
                retry += 1;
                let delay = policy.delay_for(retry);
                tracing::warn!(
                    error = %e,
                    retry,
                    ?delay,
                    "Connection to dispatch server failed",
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
