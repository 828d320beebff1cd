//! Runs the configured command for one dispatched job.
//!
//! The job is written to the command's stdin as JSON (`jobId`, `data`,
//! `startDateTime`) and its id is exported as `DEPOT_JOB_ID`. Exit
//! status 0 means the job is done.

use std::process::Stdio;
use std::time::{Duration, Instant};

use depot_core::job::Job;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::JobCommand;

/// Result of running the command for one job.
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub job_id: String,
    pub success: bool,
    pub message: String,
    pub duration_ms: u64,
}

/// Run `command` for `job`, killing it if it outlives `timeout`.
pub async fn run_job(command: &JobCommand, job: &Job, timeout: Duration) -> JobOutcome {
    let start = Instant::now();
    let job_id = job.job_id().to_string();

    tracing::info!(job_id = %job_id, program = %command.program, "Running job command");

    let result = tokio::time::timeout(timeout, execute(command, job)).await;
    let elapsed_ms = start.elapsed().as_millis() as u64;

    let (success, message) = match result {
        Ok(Ok(output)) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if output.status.success() {
                tracing::info!(job_id = %job_id, elapsed_ms, "Job command succeeded");
                (true, "Job command succeeded".to_string())
            } else {
                tracing::error!(job_id = %job_id, elapsed_ms, stderr = %stderr.trim(), "Job command failed");
                (
                    false,
                    format!(
                        "Job command failed (exit {}): {}",
                        output.status.code().unwrap_or(-1),
                        stderr.trim(),
                    ),
                )
            }
        }
        Ok(Err(e)) => {
            tracing::error!(job_id = %job_id, error = %e, "Job command could not run");
            (false, format!("Failed to execute {}: {e}", command.program))
        }
        Err(_) => {
            tracing::error!(job_id = %job_id, "Job command timed out");
            (
                false,
                format!("Job command timed out after {}s", timeout.as_secs()),
            )
        }
    };

    JobOutcome {
        job_id,
        success,
        message,
        duration_ms: elapsed_ms,
    }
}

async fn execute(command: &JobCommand, job: &Job) -> std::io::Result<std::process::Output> {
    let payload = serde_json::to_vec(job)?;

    let mut child = Command::new(&command.program)
        .args(&command.args)
        .env("DEPOT_JOB_ID", job.job_id())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        // A command that ignores stdin may exit before reading it.
        if let Err(e) = stdin.write_all(&payload).await {
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(e);
            }
        }
    }

    child.wait_with_output().await
}
