use crate::{
    Closer,
    MetricsSink,
    SinkError,
};
use agent_metrics_collector::MetricsResult;
use cadence::{
    prelude::*,
    BufferedUdpMetricSink,
    MetricSink,
    StatsdClient,
};
use futures::future::BoxFuture;
use std::{
    net::{
        ToSocketAddrs,
        UdpSocket,
    },
    panic::RefUnwindSafe,
};

pub const DEFAULT_STATSD_PREFIX: &str = "buildkite.";

/// Pushes gauges to a StatsD agent.
///
/// With tags enabled (DogStatsD) cluster and queue become `cluster:` and `queue:` tags; otherwise
/// they are embedded into the metric name. Gauges are buffered by the client and flushed after
/// every result.
pub struct StatsdSink {
    client: StatsdClient,
    tags: bool,
}

impl StatsdSink {
    pub fn connect(host: impl ToSocketAddrs, tags: bool, prefix: &str) -> Result<Self, SinkError> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_nonblocking(true)?;
        let sink = BufferedUdpMetricSink::from(host, socket)?;
        Ok(Self::with_sink(sink, tags, prefix))
    }

    /// A sink writing through any cadence metric sink.
    pub fn with_sink<S>(sink: S, tags: bool, prefix: &str) -> Self
    where
        S: MetricSink + Send + Sync + RefUnwindSafe + 'static,
    {
        info!(prefix = %prefix, tags, "using statsd metrics prefix");
        // the client adds the separating dot itself
        let client = StatsdClient::from_sink(prefix.trim_end_matches('.'), sink);
        Self { client, tags }
    }

    fn gauge(&self, name: &str, value: u64, tags: &[(&str, &str)]) -> Result<(), SinkError> {
        if tags.is_empty() {
            self.client.gauge(name, value)?;
            return Ok(());
        }
        let mut gauge = self.client.gauge_with_tags(name, value);
        for &(key, tag) in tags {
            gauge = gauge.with_tag(key, tag);
        }
        gauge.try_send()?;
        Ok(())
    }

    fn send_with_tags(&self, result: &MetricsResult) -> Result<(), SinkError> {
        let mut common = Vec::new();
        let mut scope = "";
        if !result.cluster.is_empty() {
            common.push(("cluster", result.cluster.as_str()));
            scope = "clusters.";
        }

        for (name, value) in &result.totals {
            self.gauge(&format!("{scope}{name}"), *value, &common)?;
        }

        for (queue, counts) in &result.queues {
            let mut tags = common.clone();
            tags.push(("queue", queue.as_str()));
            for (name, value) in counts {
                self.gauge(&format!("{scope}queues.{name}"), *value, &tags)?;
            }
        }
        Ok(())
    }

    fn send_without_tags(&self, result: &MetricsResult) -> Result<(), SinkError> {
        let cluster = &result.cluster;
        let scope = if cluster.is_empty() {
            String::new()
        } else {
            format!("clusters.{cluster}.")
        };

        for (name, value) in &result.totals {
            self.gauge(&format!("{scope}{name}"), *value, &[])?;
        }

        for (queue, counts) in &result.queues {
            for (name, value) in counts {
                self.gauge(&format!("{scope}queues.{queue}.{name}"), *value, &[])?;
            }
        }
        Ok(())
    }

    fn flush(&self) -> Result<(), SinkError> {
        self.client.flush()?;
        trace!("flushed statsd buffer");
        Ok(())
    }
}

impl MetricsSink for StatsdSink {
    fn name(&self) -> &'static str {
        "statsd"
    }

    fn collect<'a>(&'a mut self, result: &'a MetricsResult) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            if self.tags {
                self.send_with_tags(result)?;
            } else {
                self.send_without_tags(result)?;
            }
            self.flush()
        })
    }

    fn closer(&mut self) -> Option<&mut dyn Closer> {
        Some(self)
    }
}

impl Closer for StatsdSink {
    fn close(&mut self) -> BoxFuture<'_, Result<(), SinkError>> {
        Box::pin(async move { self.flush() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_metrics_collector::MetricName;
    use pretty_assertions::assert_eq;
    use std::{
        io,
        sync::{
            atomic::{
                AtomicUsize,
                Ordering,
            },
            Arc,
            Mutex,
        },
    };

    async fn receiver() -> (tokio::net::UdpSocket, String) {
        let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap().to_string();
        (socket, addr)
    }

    async fn receive(socket: &tokio::net::UdpSocket, expected: usize) -> Vec<String> {
        let mut lines = Vec::new();
        let mut buf = vec![0; 65_536];
        while lines.len() < expected {
            let len = socket.recv(&mut buf).await.unwrap();
            lines.extend(
                String::from_utf8_lossy(&buf[..len])
                    .lines()
                    .filter(|line| !line.is_empty())
                    .map(str::to_string),
            );
        }
        lines.sort();
        lines
    }

    fn result(cluster: &str) -> MetricsResult {
        let mut result = MetricsResult {
            org: "acme".to_string(),
            cluster: cluster.to_string(),
            ..Default::default()
        };
        result.totals.insert(MetricName::IdleAgentCount, 3);
        result.queue_mut("default").insert(MetricName::BusyAgentCount, 2);
        result
    }

    /// Records every gauge and fails the emit with the given position.
    #[derive(Clone, Default)]
    struct FlakySink {
        lines: Arc<Mutex<Vec<String>>>,
        emits: Arc<AtomicUsize>,
        fail_at: Option<usize>,
    }

    impl MetricSink for FlakySink {
        fn emit(&self, metric: &str) -> io::Result<usize> {
            let position = self.emits.fetch_add(1, Ordering::SeqCst);
            if self.fail_at == Some(position) {
                return Err(io::Error::other("send failed"));
            }
            self.lines.lock().unwrap().push(metric.to_string());
            Ok(metric.len())
        }
    }

    #[tokio::test]
    async fn tags_carry_cluster_and_queue() {
        let (socket, addr) = receiver().await;
        let mut sink = StatsdSink::connect(addr, true, DEFAULT_STATSD_PREFIX).unwrap();

        sink.collect(&result("blue")).await.unwrap();

        assert_eq!(
            receive(&socket, 2).await,
            vec![
                "buildkite.clusters.IdleAgentCount:3|g|#cluster:blue",
                "buildkite.clusters.queues.BusyAgentCount:2|g|#cluster:blue,queue:default",
            ]
        );
    }

    #[tokio::test]
    async fn tags_without_cluster() {
        let (socket, addr) = receiver().await;
        let mut sink = StatsdSink::connect(addr, true, DEFAULT_STATSD_PREFIX).unwrap();

        sink.collect(&result("")).await.unwrap();

        assert_eq!(
            receive(&socket, 2).await,
            vec![
                "buildkite.IdleAgentCount:3|g",
                "buildkite.queues.BusyAgentCount:2|g|#queue:default",
            ]
        );
    }

    #[tokio::test]
    async fn names_embed_cluster_and_queue_without_tags() {
        let (socket, addr) = receiver().await;
        let mut sink = StatsdSink::connect(addr, false, "ci.").unwrap();

        sink.collect(&result("blue")).await.unwrap();

        assert_eq!(
            receive(&socket, 2).await,
            vec![
                "ci.clusters.blue.IdleAgentCount:3|g",
                "ci.clusters.blue.queues.default.BusyAgentCount:2|g",
            ]
        );
    }

    #[tokio::test]
    async fn failed_send_is_not_repeated_by_the_next_result() {
        let flaky = FlakySink {
            fail_at: Some(1),
            ..Default::default()
        };
        let mut sink = StatsdSink::with_sink(flaky.clone(), false, "ci.");

        let err = sink.collect(&result("blue")).await.unwrap_err();
        assert!(matches!(err, SinkError::Statsd(_)), "{err}");

        sink.collect(&result("green")).await.unwrap();
        sink.closer().unwrap().close().await.unwrap();

        assert_eq!(
            *flaky.lines.lock().unwrap(),
            vec![
                "ci.clusters.blue.IdleAgentCount:3|g",
                "ci.clusters.green.IdleAgentCount:3|g",
                "ci.clusters.green.queues.default.BusyAgentCount:2|g",
            ]
        );
    }

    #[tokio::test]
    async fn exposes_a_closer() {
        let (_socket, addr) = receiver().await;
        let mut sink = StatsdSink::connect(addr, false, "").unwrap();

        let closer = sink.closer().unwrap();
        closer.close().await.unwrap();
    }
}
