//! HTTP client for the depot job-dispatch server.
//!
//! [`DispatchClient`] requests, submits and completes jobs for a named
//! application and queries queue emptiness and server health. Retries,
//! timeouts and basic-auth credentials are configured once through
//! [`ClientConfig`] and applied to every call.

pub mod client;
pub mod config;
pub mod error;
pub mod retry;

pub use client::DispatchClient;
pub use config::ClientConfig;
pub use depot_core::job::Job;
pub use error::DispatchError;
pub use retry::RetryPolicy;
