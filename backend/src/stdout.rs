use crate::{
    MetricsSink,
    SinkError,
};
use agent_metrics_collector::MetricsResult;
use futures::future::BoxFuture;
use std::io::Write;

/// Writes every result as one line of JSON. Useful for local debugging.
pub struct StdoutSink<W = std::io::Stdout> {
    out: W,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self { out: std::io::stdout() }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write + Send> StdoutSink<W> {
    pub fn with_writer(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> MetricsSink for StdoutSink<W> {
    fn name(&self) -> &'static str {
        "stdout"
    }

    fn collect<'a>(&'a mut self, result: &'a MetricsResult) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            serde_json::to_writer(&mut self.out, result)?;
            self.out.write_all(b"\n")?;
            self.out.flush()?;
            Ok(())
        })
    }
}
