//! The [`DispatchClient`] and its five server operations.
//!
//! | Operation        | Endpoint              | Timeout                 |
//! |------------------|-----------------------|-------------------------|
//! | `check_status`   | `GET /job/`           | 3s                      |
//! | `request_job`    | `POST /job/request`   | 60s or `request + 60`s  |
//! | `submit_job`     | `POST /job/submit`    | 60s                     |
//! | `complete_job`   | `POST /job/complete`  | 60s                     |
//! | `is_empty`       | `POST /job/isempty`   | 60s                     |

use std::time::Duration;

use depot_core::job::Job;
use depot_core::timeout::{http_timeout, BASE_CONNECTION_TIMEOUT, STATUS_CHECK_TIMEOUT};
use depot_core::validation::{validate_app_id, validate_job_id};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use tracing::Instrument;

use crate::config::ClientConfig;
use crate::error::DispatchError;
use crate::retry::{send_with_retry, CallKind};

const STATUS_PATH: &str = "/job/";
const REQUEST_PATH: &str = "/job/request";
const SUBMIT_PATH: &str = "/job/submit";
const COMPLETE_PATH: &str = "/job/complete";
const IS_EMPTY_PATH: &str = "/job/isempty";

/// Client for one dispatch server.
///
/// Holds a pooled [`reqwest::Client`] plus the [`ClientConfig`] it was
/// built from. The client is `Send + Sync`; wrap it in an `Arc` to share
/// it between tasks. Calling [`close`](Self::close) consumes it.
#[derive(Debug)]
pub struct DispatchClient {
    http: reqwest::Client,
    config: ClientConfig,
    base_url: String,
    span: tracing::Span,
}

impl DispatchClient {
    /// Create a client logging under a `dispatch_client` span.
    pub fn new(config: ClientConfig) -> Result<Self, DispatchError> {
        let span = tracing::info_span!(
            "dispatch_client",
            host = %config.host,
            port = config.port,
        );
        Self::with_span(config, span)
    }

    /// Create a client whose operations are all recorded under `span`.
    pub fn with_span(config: ClientConfig, span: tracing::Span) -> Result<Self, DispatchError> {
        let base_url = config.base_url()?;

        let mut builder =
            reqwest::Client::builder().danger_accept_invalid_certs(!config.ssl_verify);
        if !config.keep_alive {
            builder = builder.pool_max_idle_per_host(0);
        }
        let http = builder.build()?;

        span.in_scope(|| {
            if !config.ssl_verify {
                tracing::warn!("TLS certificate verification is disabled");
            }
            tracing::debug!(
                base_url = %base_url,
                authenticated = config.access_key.is_some(),
                keep_alive = config.keep_alive,
                "Dispatch client created",
            );
        });

        Ok(Self {
            http,
            config,
            base_url,
            span,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// `<scheme>://<host>:<port>` every endpoint is resolved against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check whether the dispatch server is up.
    ///
    /// Returns `Ok(true)` only for an HTTP 200. Every other status,
    /// including one still returned after retries ran out, yields
    /// `Ok(false)`. Connection failures are returned as
    /// [`DispatchError::Transport`] rather than folded into `false`.
    pub async fn check_status(&self) -> Result<bool, DispatchError> {
        async {
            tracing::debug!("Checking status");
            let url = self.url(STATUS_PATH);
            let response = send_with_retry(&self.config.retry, CallKind::Idempotent, || {
                self.authed(self.http.get(&url), STATUS_CHECK_TIMEOUT)
            })
            .await?;

            let status = response.status();
            tracing::debug!(status = status.as_u16(), "Status check");
            Ok(status == StatusCode::OK)
        }
        .instrument(self.span.clone())
        .await
    }

    /// Ask for the next job of `app_id`.
    ///
    /// * `request_timeout` - `-1` for no server-side wait, or a positive
    ///   number of seconds the server may hold the call open waiting for
    ///   a job. Any other value is rejected before the call is made.
    /// * `job_timeout` - seconds the server allows before it considers the
    ///   dispatched job abandoned.
    ///
    /// Returns `Ok(None)` when no job is available.
    pub async fn request_job(
        &self,
        app_id: &str,
        request_timeout: i64,
        job_timeout: u64,
    ) -> Result<Option<Job>, DispatchError> {
        async {
            validate_app_id(app_id)?;
            let timeout = http_timeout(request_timeout)?;

            tracing::debug!(app_id, request_timeout, job_timeout, "Requesting job");

            let body = json!({
                "jobHandleTimeoutSeconds": job_timeout,
                "appId": app_id,
                "timeout": request_timeout,
            });
            let response = self
                .post_json(REQUEST_PATH, &body, timeout, CallKind::Idempotent)
                .await?;
            let value = Self::read_ok_json(response).await?;
            tracing::debug!(app_id, response = %value, "Request returned");

            let job = Job::from_response(value)?;
            match &job {
                Some(job) => tracing::info!(app_id, job_id = job.job_id(), "Job received"),
                None => tracing::debug!(app_id, "No job available"),
            }
            Ok(job)
        }
        .instrument(self.span.clone())
        .await
    }

    /// Submit a new job for `app_id`.
    ///
    /// `previous_jobs` lists job ids that must complete before the server
    /// dispatches this one. Any non-2xx answer is an error.
    ///
    /// Force-listed statuses are only retried when
    /// [`RetryPolicy::retry_non_idempotent`](crate::RetryPolicy::retry_non_idempotent)
    /// is set, since a retried submit may create the job twice.
    pub async fn submit_job(
        &self,
        app_id: &str,
        data: &Value,
        previous_jobs: Option<&[String]>,
    ) -> Result<(), DispatchError> {
        async {
            validate_app_id(app_id)?;
            tracing::debug!(
                app_id,
                previous_jobs = previous_jobs.map_or(0, |p| p.len()),
                "Submitting new job",
            );

            let body = json!({
                "appId": app_id,
                "data": data,
                "previousJobs": previous_jobs,
            });
            let response = self
                .post_json(SUBMIT_PATH, &body, BASE_CONNECTION_TIMEOUT, CallKind::NonIdempotent)
                .await?;
            Self::ensure_success(response).await?;

            tracing::info!(app_id, "Job submitted");
            Ok(())
        }
        .instrument(self.span.clone())
        .await
    }

    /// Mark `job_id` of `app_id` as finished. Any non-2xx answer is an error.
    pub async fn complete_job(&self, app_id: &str, job_id: &str) -> Result<(), DispatchError> {
        async {
            validate_app_id(app_id)?;
            validate_job_id(job_id)?;
            tracing::debug!(app_id, job_id, "Completing job");

            let body = json!({
                "appId": app_id,
                "jobId": job_id,
            });
            let response = self
                .post_json(COMPLETE_PATH, &body, BASE_CONNECTION_TIMEOUT, CallKind::Idempotent)
                .await?;
            Self::ensure_success(response).await?;

            tracing::info!(app_id, job_id, "Job completed");
            Ok(())
        }
        .instrument(self.span.clone())
        .await
    }

    /// Check whether `app_id` has no pending jobs.
    ///
    /// A 200 answer without a boolean `empty` field is reported as
    /// [`DispatchError::UnexpectedResponse`].
    pub async fn is_empty(&self, app_id: &str) -> Result<bool, DispatchError> {
        async {
            validate_app_id(app_id)?;
            tracing::debug!(app_id, "Checking if queue is empty");

            let body = json!({ "appId": app_id });
            let response = self
                .post_json(IS_EMPTY_PATH, &body, BASE_CONNECTION_TIMEOUT, CallKind::Idempotent)
                .await?;
            let value = Self::read_ok_json(response).await?;
            tracing::debug!(app_id, response = %value, "Is empty returned");

            match value.get("empty") {
                Some(Value::Bool(empty)) => Ok(*empty),
                _ => Err(DispatchError::UnexpectedResponse(format!(
                    "unknown return object from isempty: {value}"
                ))),
            }
        }
        .instrument(self.span.clone())
        .await
    }

    /// Release the connection pool. The client cannot be used afterwards.
    pub fn close(self) {
        self.span.in_scope(|| tracing::debug!("Closing dispatch client"));
        drop(self.http);
    }

    // ---- private helpers ----

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attach credentials (when configured) and the per-call timeout.
    fn authed(&self, builder: RequestBuilder, timeout: Duration) -> RequestBuilder {
        let builder = builder.timeout(timeout);
        match &self.config.access_key {
            Some(access_key) => builder.basic_auth(access_key, self.config.secret_key.as_ref()),
            None => builder,
        }
    }

    async fn post_json(
        &self,
        path: &str,
        body: &Value,
        timeout: Duration,
        kind: CallKind,
    ) -> Result<Response, DispatchError> {
        let url = self.url(path);
        let response = send_with_retry(&self.config.retry, kind, || {
            self.authed(self.http.post(&url), timeout).json(body)
        })
        .await?;
        Ok(response)
    }

    /// Require exactly HTTP 200 and decode the body as JSON.
    async fn read_ok_json(response: Response) -> Result<Value, DispatchError> {
        let status = response.status();
        if status != StatusCode::OK {
            let reason = reason_phrase(&response);
            tracing::warn!(status = status.as_u16(), reason = %reason, "Request against server unsuccessful");
            return Err(DispatchError::Request {
                status: status.as_u16(),
                reason,
            });
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            DispatchError::UnexpectedResponse(format!("response body is not valid JSON ({e}): {text}"))
        })
    }

    /// Require a 2xx status, discarding the body.
    async fn ensure_success(response: Response) -> Result<(), DispatchError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(DispatchError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// The server's own reason phrase, or the canonical one for the status.
///
/// hyper only records a phrase that differs from the canonical text.
fn reason_phrase(response: &Response) -> String {
    response
        .extensions()
        .get::<hyper::ext::ReasonPhrase>()
        .map(|phrase| String::from_utf8_lossy(phrase.as_bytes()).into_owned())
        .or_else(|| response.status().canonical_reason().map(str::to_string))
        .unwrap_or_else(|| "unknown status".to_string())
}
