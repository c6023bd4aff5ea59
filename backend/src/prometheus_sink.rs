use crate::{
    MetricsSink,
    SinkError,
};
use agent_metrics_collector::{
    MetricName,
    MetricsResult,
};
use axum::{
    extract::State,
    http::{
        header::CONTENT_TYPE,
        StatusCode,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::future::BoxFuture;
use prometheus::{
    Encoder,
    GaugeVec,
    Opts,
    Registry,
    TextEncoder,
};
use std::collections::{
    BTreeSet,
    HashMap,
};
use tokio::net::TcpListener;

/// `BusyAgentPercentage` -> `busy_agent_percentage`. Runs of capitals stay one word.
pub fn camel_to_underscore(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            if prev.is_ascii_lowercase() || prev.is_ascii_digit() || (prev.is_ascii_uppercase() && next_is_lower) {
                out.push('_');
            }
        }
        out.push(c.to_ascii_lowercase());
    }
    out
}

/// Keeps one gauge vector per metric name in a private registry.
///
/// Label sets of queues that disappeared since the previous result of the same cluster are
/// removed so deleted queues do not linger in the exposition.
pub struct PrometheusSink {
    registry: Registry,
    totals: HashMap<MetricName, GaugeVec>,
    queues: HashMap<MetricName, GaugeVec>,
    // cluster -> queues seen in the previous result
    previous_queues: HashMap<String, BTreeSet<String>>,
}

impl PrometheusSink {
    pub fn new() -> Self {
        Self::with_registry(Registry::new())
    }

    pub fn with_registry(registry: Registry) -> Self {
        Self {
            registry,
            totals: HashMap::new(),
            queues: HashMap::new(),
            previous_queues: HashMap::new(),
        }
    }

    /// Handle to the registry, for serving it.
    pub fn registry(&self) -> Registry {
        self.registry.clone()
    }

    fn total_gauge(&mut self, name: MetricName) -> Result<&GaugeVec, SinkError> {
        if !self.totals.contains_key(&name) {
            let gauge = GaugeVec::new(
                Opts::new(
                    format!("buildkite_total_{}", camel_to_underscore(name.as_ref())),
                    format!("Buildkite Total: {name}"),
                ),
                &["cluster"],
            )?;
            self.registry.register(Box::new(gauge.clone()))?;
            self.totals.insert(name, gauge);
        }
        Ok(&self.totals[&name])
    }

    fn queue_gauge(&mut self, name: MetricName) -> Result<&GaugeVec, SinkError> {
        if !self.queues.contains_key(&name) {
            let gauge = GaugeVec::new(
                Opts::new(
                    format!("buildkite_queues_{}", camel_to_underscore(name.as_ref())),
                    format!("Buildkite Queues: {name}"),
                ),
                &["queue", "cluster"],
            )?;
            self.registry.register(Box::new(gauge.clone()))?;
            self.queues.insert(name, gauge);
        }
        Ok(&self.queues[&name])
    }

    fn record(&mut self, result: &MetricsResult) -> Result<(), SinkError> {
        let cluster = result.cluster.as_str();

        for (&name, &value) in &result.totals {
            self.total_gauge(name)?
                .with_label_values(&[cluster])
                .set(value as f64);
        }

        let current: BTreeSet<String> = result.queues.keys().cloned().collect();
        for (queue, counts) in &result.queues {
            for (&name, &value) in counts {
                self.queue_gauge(name)?
                    .with_label_values(&[queue.as_str(), cluster])
                    .set(value as f64);
            }
        }

        let previous = self.previous_queues.insert(cluster.to_string(), current.clone());
        for stale in previous.unwrap_or_default().difference(&current) {
            debug!(queue = %stale, cluster, "removing gauges of vanished queue");
            for gauge in self.queues.values() {
                // Not every gauge necessarily carries this label set.
                let _ = gauge.remove_label_values(&[stale.as_str(), cluster]);
            }
        }

        Ok(())
    }
}

impl Default for PrometheusSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for PrometheusSink {
    fn name(&self) -> &'static str {
        "prometheus"
    }

    fn collect<'a>(&'a mut self, result: &'a MetricsResult) -> BoxFuture<'a, Result<(), SinkError>> {
        let outcome = self.record(result);
        Box::pin(async move { outcome })
    }
}

/// Renders the registry in the text exposition format.
pub fn gather_text(registry: &Registry) -> Result<String, SinkError> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

pub fn metrics_router(path: &str, registry: Registry) -> Router {
    Router::new().route(path, get(metrics_handler)).with_state(registry)
}

async fn metrics_handler(State(registry): State<Registry>) -> impl IntoResponse {
    match gather_text(&registry) {
        Ok(body) => (
            StatusCode::OK,
            [(CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(err) => {
            error!("failed to encode prometheus metrics: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

/// Serves the registry at `path` until the listener fails.
pub async fn serve_metrics(listener: TcpListener, path: &str, registry: Registry) -> std::io::Result<()> {
    info!("serving prometheus metrics on {}{path}", listener.local_addr()?);
    axum::serve(listener, metrics_router(path, registry).into_make_service()).await
}
