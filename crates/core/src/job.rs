//! The [`Job`] value object and its construction from `request` responses.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

/// Wire field carrying the server-assigned job identifier.
pub const FIELD_JOB_ID: &str = "jobId";
/// Wire field carrying the job payload.
pub const FIELD_DATA: &str = "data";
/// Wire field carrying the start of the handle-timeout window.
pub const FIELD_START_DATETIME: &str = "startDateTime";

/// Naive layouts accepted for `startDateTime`, read as UTC.
const NAIVE_TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// One unit of work handed out by the dispatch server.
///
/// Only produced by a successful `request` call and never mutated
/// afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    #[serde(rename = "jobId", deserialize_with = "non_empty_job_id")]
    job_id: String,
    data: Value,
    #[serde(rename = "startDateTime", default)]
    start_datetime: Option<DateTime<Utc>>,
}

impl Job {
    /// Server-assigned identifier, unique per job. Never empty.
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Opaque work description.
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// When the server started the job's handle-timeout window, if it said.
    pub fn start_datetime(&self) -> Option<DateTime<Utc>> {
        self.start_datetime
    }

    /// Split the job into `(job_id, data, start_datetime)`.
    pub fn into_parts(self) -> (String, Value, Option<DateTime<Utc>>) {
        (self.job_id, self.data, self.start_datetime)
    }

    /// Build a job from the JSON body of a successful `request` call.
    ///
    /// Returns `Ok(None)` when the body carries no job identifier, which
    /// is how the server reports an empty queue once the long-poll expires.
    /// A `startDateTime` in an unrecognised format is logged and dropped;
    /// the job itself is still returned.
    pub fn from_response(body: Value) -> Result<Option<Self>, CoreError> {
        let mut obj = match body {
            Value::Object(obj) => obj,
            other => {
                return Err(CoreError::UnexpectedResponse(format!(
                    "expected a JSON object from request, got {other}"
                )))
            }
        };

        let job_id = match take_job_id(&mut obj)? {
            Some(id) => id,
            None => return Ok(None),
        };

        let data = obj.remove(FIELD_DATA).ok_or_else(|| {
            CoreError::UnexpectedResponse(format!("job {job_id} is missing the `{FIELD_DATA}` field"))
        })?;

        let start_datetime = obj
            .get(FIELD_START_DATETIME)
            .and_then(|value| parse_start_datetime(&job_id, value));

        Ok(Some(Self {
            job_id,
            data,
            start_datetime,
        }))
    }
}

fn non_empty_job_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let id = String::deserialize(deserializer)?;
    if id.is_empty() {
        return Err(serde::de::Error::custom("jobId must not be empty"));
    }
    Ok(id)
}

/// Extract the job id; absent, `null` and `""` all mean "no job".
fn take_job_id(obj: &mut Map<String, Value>) -> Result<Option<String>, CoreError> {
    match obj.remove(FIELD_JOB_ID) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(id)) if id.is_empty() => Ok(None),
        Some(Value::String(id)) => Ok(Some(id)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(CoreError::UnexpectedResponse(format!(
            "`{FIELD_JOB_ID}` must be a string, got {other}"
        ))),
    }
}

fn parse_start_datetime(job_id: &str, value: &Value) -> Option<DateTime<Utc>> {
    let parsed = match value {
        Value::Null => return None,
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
            .and_then(DateTime::from_timestamp_millis),
        _ => None,
    };

    if parsed.is_none() {
        tracing::warn!(
            job_id,
            start_datetime = %value,
            "Ignoring unrecognised `{FIELD_START_DATETIME}`",
        );
    }
    parsed
}

/// RFC 3339 first, then naive ISO-8601 layouts taken as UTC.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}
