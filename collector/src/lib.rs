//! # Agent Metrics Collector
//!
//! Polls the Buildkite agent metrics API and maps the response into a
//! backend-agnostic [`MetricsResult`].
//!
//! ## Architecture
//!
//! - **`client`**: [`MetricsClient`] issues the poll(s) for one token, either against the
//!   organization-wide `/metrics` resource or one `/metrics/queue?name=` request per queue
//! - **`model`**: the canonical counter set ([`MetricName`]) and the per-poll [`MetricsResult`]
//! - **`response`**: wire types of the metrics API
//! - **`error`**: [`CollectError`], including the distinguished [`CollectError::Unauthorized`]
//!
//! The `reqwest::Client` built by [`build_http_client`] owns the connection pool and is meant to
//! be shared by every [`MetricsClient`] of a batch.

#[macro_use]
extern crate tracing;

pub mod client;
pub mod error;
pub mod model;
mod response;

pub use client::{
    build_http_client,
    MetricsClient,
    DEFAULT_ENDPOINT,
    POLL_DURATION_HEADER,
};
pub use error::CollectError;
pub use model::{
    busy_agent_percentage,
    Counts,
    MetricName,
    MetricsResult,
};
