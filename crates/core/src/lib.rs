//! Protocol-level building blocks for the depot dispatch client.
//!
//! Everything here is pure: the [`job::Job`] value object and its
//! construction from server responses, timeout composition for the
//! long-poll `request` call, retry backoff arithmetic, and input
//! validation. Network code lives in `depot-client`.

pub mod backoff;
pub mod error;
pub mod job;
pub mod timeout;
pub mod validation;
