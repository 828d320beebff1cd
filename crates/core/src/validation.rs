//! Argument checks applied before any request leaves the client.

use crate::error::CoreError;

/// Reject empty or whitespace-only application identifiers.
pub fn validate_app_id(app_id: &str) -> Result<(), CoreError> {
    non_blank("app_id", app_id)
}

/// Reject empty or whitespace-only job identifiers.
pub fn validate_job_id(job_id: &str) -> Result<(), CoreError> {
    non_blank("job_id", job_id)
}

fn non_blank(field: &str, value: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        return Err(CoreError::InvalidArgument(format!(
            "{field} must not be empty"
        )));
    }
    Ok(())
}
