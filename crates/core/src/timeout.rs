//! Timeout composition for dispatch-server calls.
//!
//! A `request` call may be held open by the server for up to
//! `request_timeout` seconds while it waits for a job to arrive. The
//! client's own socket timeout must therefore always outlast that hold
//! window, otherwise the client gives up before the server can answer
//! with an empty result.

use std::time::Duration;

use crate::error::CoreError;

/// Default port of the dispatch server.
pub const DEFAULT_PORT: u16 = 6883;

/// Base timeout for every call except the health check.
pub const BASE_CONNECTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for the health check, which must fail fast.
pub const STATUS_CHECK_TIMEOUT: Duration = Duration::from_secs(3);

/// Sentinel `request_timeout` meaning "no server-side hold, use the base
/// connection timeout only".
pub const USE_DEFAULT_REQUEST_TIMEOUT: i64 = -1;

/// Seconds the server waits for completion before redispatching a job.
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 120;

/// Compute the HTTP timeout for a `request` call.
///
/// * `-1` → [`BASE_CONNECTION_TIMEOUT`].
/// * `n > 0` → `n` seconds plus [`BASE_CONNECTION_TIMEOUT`].
/// * anything else → [`CoreError::InvalidArgument`].
pub fn http_timeout(request_timeout: i64) -> Result<Duration, CoreError> {
    if request_timeout == USE_DEFAULT_REQUEST_TIMEOUT {
        return Ok(BASE_CONNECTION_TIMEOUT);
    }
    if request_timeout <= 0 {
        return Err(CoreError::InvalidArgument(format!(
            "request timeout not valid: {request_timeout} (expected -1 or a positive number of seconds)"
        )));
    }

    let hold = Duration::from_secs(request_timeout as u64);
    let timeout = hold.checked_add(BASE_CONNECTION_TIMEOUT).ok_or_else(|| {
        CoreError::InvalidArgument(format!("request timeout too large: {request_timeout}"))
    })?;

    // The socket must outlive the server's hold window.
    if timeout <= hold {
        return Err(CoreError::InvalidArgument(format!(
            "http timeout {}s does not exceed request timeout {request_timeout}s",
            timeout.as_secs()
        )));
    }

    Ok(timeout)
}
