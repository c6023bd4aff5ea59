#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("prometheus: {0}")]
    Prometheus(#[from] prometheus::Error),
    #[error("statsd: {0}")]
    Statsd(#[from] cadence::MetricError),
    #[error("failed to encode metrics: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
