//! Destinations for collected Buildkite metrics.

#[macro_use]
extern crate tracing;

mod error;
mod prometheus_sink;
mod statsd;
mod stdout;

use agent_metrics_collector::MetricsResult;
use futures::future::BoxFuture;

pub use error::SinkError;
pub use prometheus_sink::{
    camel_to_underscore,
    gather_text,
    metrics_router,
    serve_metrics,
    PrometheusSink,
};
pub use statsd::{
    StatsdSink,
    DEFAULT_STATSD_PREFIX,
};
pub use stdout::StdoutSink;

/// Receives one [`MetricsResult`] per token per poll.
pub trait MetricsSink: Send {
    fn name(&self) -> &'static str;

    fn collect<'a>(&'a mut self, result: &'a MetricsResult) -> BoxFuture<'a, Result<(), SinkError>>;

    /// Sinks that buffer or hold connections expose a [`Closer`], called once after every batch.
    fn closer(&mut self) -> Option<&mut dyn Closer> {
        None
    }
}

pub trait Closer: Send {
    fn close(&mut self) -> BoxFuture<'_, Result<(), SinkError>>;
}
