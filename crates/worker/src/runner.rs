//! The long-poll loop: request a job, run it, complete it.
//!
//! Jobs whose command fails are not completed; the server redispatches
//! them once their handle timeout expires.

use std::time::Duration;

use depot_client::{DispatchClient, DispatchError};
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::handler::{self, JobOutcome};

/// Request at most one job and process it.
///
/// Returns `Ok(None)` when the long-poll expired without a job.
pub async fn process_once(
    client: &DispatchClient,
    config: &WorkerConfig,
) -> Result<Option<JobOutcome>, DispatchError> {
    let job = match client
        .request_job(&config.app_id, config.request_timeout, config.job_timeout_secs)
        .await?
    {
        Some(job) => job,
        None => return Ok(None),
    };

    let timeout = Duration::from_secs(config.job_timeout_secs);
    let outcome = handler::run_job(&config.command, &job, timeout).await;

    if outcome.success {
        client.complete_job(&config.app_id, job.job_id()).await?;
    } else {
        tracing::warn!(
            job_id = job.job_id(),
            message = %outcome.message,
            "Leaving job for redispatch",
        );
    }

    Ok(Some(outcome))
}

/// Process jobs until `cancel` is triggered.
///
/// Server and transport errors are logged and followed by
/// [`WorkerConfig::idle_delay`] before the next attempt.
pub async fn run(client: &DispatchClient, config: &WorkerConfig, cancel: &CancellationToken) {
    tracing::info!(app_id = %config.app_id, "Worker loop started");

    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = process_once(client, config) => result,
        };

        match result {
            Ok(Some(outcome)) => {
                tracing::debug!(
                    job_id = %outcome.job_id,
                    success = outcome.success,
                    duration_ms = outcome.duration_ms,
                    "Job processed",
                );
            }
            Ok(None) => {
                tracing::debug!(app_id = %config.app_id, "No job available");
                if config.request_timeout < 0 {
                    // No server-side hold: pause instead of spinning.
                    if sleep_or_cancel(config.idle_delay, cancel).await {
                        break;
                    }
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Dispatch call failed");
                if sleep_or_cancel(config.idle_delay, cancel).await {
                    break;
                }
            }
        }
    }

    tracing::info!(app_id = %config.app_id, "Worker loop stopped");
}

/// Sleep for `delay`; returns `true` if cancelled first.
async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}
