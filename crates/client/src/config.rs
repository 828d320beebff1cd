//! Connection settings for a [`DispatchClient`](crate::DispatchClient).

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use depot_core::timeout::DEFAULT_PORT;
use reqwest::Url;

use crate::error::DispatchError;
use crate::retry::RetryPolicy;

/// Settings fixed for the lifetime of one client.
///
/// Build with [`ClientConfig::new`] and the `with_*` setters, or load
/// from the environment with [`ClientConfig::from_env`].
#[derive(Clone)]
pub struct ClientConfig {
    /// Scheme and host of the dispatch server, e.g. `https://10.0.0.1`.
    pub host: String,
    /// Server port (default: `6883`).
    pub port: u16,
    /// Basic-auth user. Credentials are only sent when this is set.
    pub access_key: Option<String>,
    /// Basic-auth password.
    pub secret_key: Option<String>,
    /// Verify the server's TLS certificate (default: `true`). When off,
    /// TLS is still negotiated.
    pub ssl_verify: bool,
    /// Keep idle connections pooled between calls (default: `false`).
    pub keep_alive: bool,
    pub retry: RetryPolicy,
}

impl ClientConfig {
    /// Defaults for everything except the host.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            access_key: None,
            secret_key: None,
            ssl_verify: true,
            keep_alive: false,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set basic-auth credentials. The secret may be omitted.
    pub fn with_credentials(
        mut self,
        access_key: impl Into<String>,
        secret_key: Option<String>,
    ) -> Self {
        self.access_key = Some(access_key.into());
        self.secret_key = secret_key;
        self
    }

    pub fn with_ssl_verify(mut self, ssl_verify: bool) -> Self {
        self.ssl_verify = ssl_verify;
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// | Env Var                    | Default |
    /// |----------------------------|---------|
    /// | `DEPOT_HOST`               | --      |
    /// | `DEPOT_PORT`               | `6883`  |
    /// | `DEPOT_ACCESS_KEY`         | unset   |
    /// | `DEPOT_SECRET_KEY`         | unset   |
    /// | `DEPOT_SSL_VERIFY`         | `true`  |
    /// | `DEPOT_KEEP_ALIVE`         | `false` |
    /// | `DEPOT_RETRY_TOTAL`        | `3`     |
    /// | `DEPOT_RETRY_BACKOFF_SECS` | `3`     |
    pub fn from_env() -> Result<Self, DispatchError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, DispatchError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("DEPOT_HOST")
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| DispatchError::Config("DEPOT_HOST must be set".into()))?;

        let mut config = Self::new(host);

        if let Some(port) = parse_var(&lookup, "DEPOT_PORT")? {
            config.port = port;
        }
        config.access_key = lookup("DEPOT_ACCESS_KEY").filter(|k| !k.is_empty());
        config.secret_key = lookup("DEPOT_SECRET_KEY").filter(|k| !k.is_empty());
        if let Some(verify) = parse_bool_var(&lookup, "DEPOT_SSL_VERIFY")? {
            config.ssl_verify = verify;
        }
        if let Some(keep_alive) = parse_bool_var(&lookup, "DEPOT_KEEP_ALIVE")? {
            config.keep_alive = keep_alive;
        }
        if let Some(total) = parse_var(&lookup, "DEPOT_RETRY_TOTAL")? {
            config.retry.total = total;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "DEPOT_RETRY_BACKOFF_SECS")? {
            config.retry.backoff_factor = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// `<scheme>://<host>:<port>`, validated.
    ///
    /// The host must be an `http` or `https` URL without its own port,
    /// path or query.
    pub fn base_url(&self) -> Result<String, DispatchError> {
        let host = self.host.trim().trim_end_matches('/');
        let url = Url::parse(host).map_err(|e| {
            DispatchError::InvalidArgument(format!("host `{}` is not a valid URL: {e}", self.host))
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(DispatchError::InvalidArgument(format!(
                "host `{}` must use http or https",
                self.host
            )));
        }
        if url.host_str().is_none()
            || url.port().is_some()
            || url.path() != "/"
            || url.query().is_some()
        {
            return Err(DispatchError::InvalidArgument(format!(
                "host `{}` must be scheme and host only; set the port separately",
                self.host
            )));
        }

        Ok(format!("{host}:{}", self.port))
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("ssl_verify", &self.ssl_verify)
            .field("keep_alive", &self.keep_alive)
            .field("retry", &self.retry)
            .finish()
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, DispatchError>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| DispatchError::Config(format!("{key} is invalid ({raw}): {e}"))),
    }
}

fn parse_bool_var<F>(lookup: &F, key: &str) -> Result<Option<bool>, DispatchError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(DispatchError::Config(format!(
                "{key} must be a boolean, got `{raw}`"
            ))),
        },
    }
}
