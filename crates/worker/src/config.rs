//! Worker settings loaded from environment variables.

use std::time::Duration;

use depot_core::timeout::DEFAULT_JOB_TIMEOUT_SECS;
use depot_core::validation::validate_app_id;

/// Default server-side long-poll hold for each `request` call.
const DEFAULT_REQUEST_TIMEOUT_SECS: i64 = 30;

/// Default pause after a failed call before asking again.
const DEFAULT_IDLE_DELAY_SECS: u64 = 5;

#[derive(Debug, thiserror::Error)]
pub enum WorkerConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{key} is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Program (plus arguments) run once per dispatched job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl JobCommand {
    /// Split a whitespace-separated command line. No shell quoting is
    /// interpreted.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Application whose queue this worker drains.
    pub app_id: String,
    pub command: JobCommand,
    /// Seconds the server may hold each `request` open (`-1` for none).
    pub request_timeout: i64,
    /// Handle timeout announced to the server; also bounds each command run.
    pub job_timeout_secs: u64,
    /// Pause after a server error before the next `request`.
    pub idle_delay: Duration,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                | Required | Default |
    /// |------------------------|----------|---------|
    /// | `APP_ID`               | yes      | --      |
    /// | `JOB_COMMAND`          | yes      | --      |
    /// | `REQUEST_TIMEOUT_SECS` | no       | `30`    |
    /// | `JOB_TIMEOUT_SECS`     | no       | `120`   |
    /// | `IDLE_DELAY_SECS`      | no       | `5`     |
    pub fn from_env() -> Result<Self, WorkerConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, WorkerConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let app_id = lookup("APP_ID").ok_or(WorkerConfigError::Missing("APP_ID"))?;
        validate_app_id(&app_id).map_err(|e| WorkerConfigError::Invalid {
            key: "APP_ID",
            reason: e.to_string(),
        })?;

        let command = lookup("JOB_COMMAND")
            .as_deref()
            .and_then(JobCommand::parse)
            .ok_or(WorkerConfigError::Missing("JOB_COMMAND"))?;

        let request_timeout = match lookup("REQUEST_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: i64 = parse(&raw, "REQUEST_TIMEOUT_SECS")?;
                // Reject values the client would refuse on every call.
                depot_core::timeout::http_timeout(secs).map_err(|e| {
                    WorkerConfigError::Invalid {
                        key: "REQUEST_TIMEOUT_SECS",
                        reason: e.to_string(),
                    }
                })?;
                secs
            }
            None => DEFAULT_REQUEST_TIMEOUT_SECS,
        };

        let job_timeout_secs = match lookup("JOB_TIMEOUT_SECS") {
            Some(raw) => parse(&raw, "JOB_TIMEOUT_SECS")?,
            None => DEFAULT_JOB_TIMEOUT_SECS,
        };

        let idle_delay_secs: u64 = match lookup("IDLE_DELAY_SECS") {
            Some(raw) => parse(&raw, "IDLE_DELAY_SECS")?,
            None => DEFAULT_IDLE_DELAY_SECS,
        };

        Ok(Self {
            app_id,
            command,
            request_timeout,
            job_timeout_secs,
            idle_delay: Duration::from_secs(idle_delay_secs),
        })
    }
}

fn parse<T>(raw: &str, key: &'static str) -> Result<T, WorkerConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| WorkerConfigError::Invalid {
        key,
        reason: format!("`{raw}`: {e}"),
    })
}
