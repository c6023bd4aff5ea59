use agent_metrics_backend::{
    MetricsSink,
    SinkError,
};
use agent_metrics_collector::{
    CollectError,
    MetricsClient,
    MetricsResult,
};
use agent_metrics_token::{
    Token,
    TokenError,
    TokenSource,
};
use serde::Serialize;
use std::time::{
    Duration,
    Instant,
};
use url::Url;

/// How a batch treats a failing token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// The first error aborts the batch.
    #[default]
    Strict,
    /// Errors are recorded per token; the batch fails only if no token succeeded.
    Tolerant,
}

/// A failure of one token in a tolerant batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenErrorDetail {
    /// 1-based position of the token in the token source.
    pub token_index: usize,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub cluster: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Largest poll duration advised by a result that reached the sink.
    pub poll_duration: Duration,
    pub tokens_processed: usize,
    pub successful_tokens: usize,
    pub metrics_collected: usize,
    pub token_errors: Vec<TokenErrorDetail>,
}

#[derive(thiserror::Error, Debug)]
pub enum DispatchError {
    #[error("failed to resolve agent token: {0}")]
    Token(#[from] TokenError),
    #[error("failed to collect metrics for token {token_index}: {source}")]
    Collect {
        token_index: usize,
        source: CollectError,
    },
    #[error("failed to send metrics for token {token_index} to {sink}: {source}")]
    Sink {
        token_index: usize,
        sink: &'static str,
        source: SinkError,
    },
    #[error("failed to close {sink}: {source}")]
    Close { sink: &'static str, source: SinkError },
    #[error("All {} tokens failed to collect metrics", .0.tokens_processed)]
    AllTokensFailed(BatchReport),
}

impl DispatchError {
    /// The API rejected a token. Polling again with it is pointless.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, DispatchError::Collect { source, .. } if source.is_unauthorized())
    }
}

/// Runs one batch: every token is polled in order and each result handed to the sink.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    http: reqwest::Client,
    endpoint: Url,
    queues: Vec<String>,
    user_agent: String,
    debug_http: bool,
    dry_run: bool,
    policy: FailurePolicy,
}

impl Dispatcher {
    /// `http` is shared by the clients of every token.
    pub fn new(http: reqwest::Client, endpoint: Url) -> Self {
        Self {
            http,
            endpoint,
            queues: Vec::new(),
            user_agent: crate::user_agent("buildkite-agent-metrics-cli", None),
            debug_http: false,
            dry_run: false,
            policy: FailurePolicy::Strict,
        }
    }

    pub fn with_queues(mut self, queues: Vec<String>) -> Self {
        self.queues = queues;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn with_debug_http(mut self, debug_http: bool) -> Self {
        self.debug_http = debug_http;
        self
    }

    /// Collect without forwarding anything to the sink.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    fn client(&self, token: &Token) -> MetricsClient {
        MetricsClient::new(self.http.clone(), self.endpoint.clone(), token.expose())
            .with_user_agent(self.user_agent.clone())
            .with_queues(self.queues.iter().cloned())
            .with_debug_http(self.debug_http)
    }

    /// Polls every token of `tokens` and forwards the results to `sink`.
    ///
    /// The sink's closer, if any, is called exactly once, also when the batch failed.
    pub async fn dispatch(
        &self,
        tokens: &TokenSource,
        sink: &mut dyn MetricsSink,
    ) -> Result<BatchReport, DispatchError> {
        let started = Instant::now();
        let mut report = BatchReport {
            tokens_processed: tokens.len(),
            ..Default::default()
        };

        let outcome = self.run_batch(tokens, sink, &mut report).await;
        let closed = close_sink(sink).await;

        outcome?;
        if let Err(err) = closed {
            match self.policy {
                FailurePolicy::Strict => return Err(err),
                FailurePolicy::Tolerant => warn!("{err}"),
            }
        }

        if self.policy == FailurePolicy::Tolerant && report.successful_tokens == 0 && report.tokens_processed > 0 {
            error!(errors = report.token_errors.len(), "every token failed");
            return Err(DispatchError::AllTokensFailed(report));
        }

        info!(
            tokens = report.tokens_processed,
            successful = report.successful_tokens,
            metrics = report.metrics_collected,
            poll_duration = ?report.poll_duration,
            "Finished in {:?}",
            started.elapsed()
        );
        Ok(report)
    }

    async fn run_batch(
        &self,
        tokens: &TokenSource,
        sink: &mut dyn MetricsSink,
        report: &mut BatchReport,
    ) -> Result<(), DispatchError> {
        let resolved: Vec<(usize, Token)> = match self.policy {
            FailurePolicy::Strict => tokens.resolve_all().await?.into_iter().enumerate().collect(),
            FailurePolicy::Tolerant => {
                let mut resolved = Vec::new();
                for (index, outcome) in tokens.resolve_each().await.into_iter().enumerate() {
                    match outcome {
                        Ok(token) => resolved.push((index, token)),
                        Err(err) => report.token_errors.push(TokenErrorDetail {
                            token_index: index + 1,
                            cluster: String::new(),
                            error: format!("Failed to resolve token: {err}"),
                        }),
                    }
                }
                resolved
            }
        };

        for (index, token) in resolved {
            let token_index = index + 1;
            debug!(token_index, "collecting metrics");

            let result = match self.client(&token).collect().await {
                Ok(result) => result,
                Err(source) => {
                    if self.policy == FailurePolicy::Strict {
                        return Err(DispatchError::Collect { token_index, source });
                    }
                    error!(token_index, "failed to collect metrics: {source}");
                    report.token_errors.push(TokenErrorDetail {
                        token_index,
                        cluster: String::new(),
                        error: format!("Failed to collect metrics: {source}"),
                    });
                    continue;
                }
            };

            if let Err(source) = self.forward(sink, &result).await {
                let err = DispatchError::Sink {
                    token_index,
                    sink: sink.name(),
                    source,
                };
                if self.policy == FailurePolicy::Strict {
                    return Err(err);
                }
                error!(token_index, cluster = %result.cluster, "{err}");
                report.token_errors.push(TokenErrorDetail {
                    token_index,
                    cluster: result.cluster.clone(),
                    error: err.to_string(),
                });
                continue;
            }

            report.poll_duration = report.poll_duration.max(result.poll_duration);
            report.successful_tokens += 1;
            report.metrics_collected += result.metric_count();
        }

        Ok(())
    }

    async fn forward(&self, sink: &mut dyn MetricsSink, result: &MetricsResult) -> Result<(), SinkError> {
        if self.dry_run {
            debug!(org = %result.org, cluster = %result.cluster, "dry run, not sending metrics");
            return Ok(());
        }
        sink.collect(result).await
    }
}

async fn close_sink(sink: &mut dyn MetricsSink) -> Result<(), DispatchError> {
    let name = sink.name();
    match sink.closer() {
        Some(closer) => {
            debug!(sink = name, "closing metrics sink");
            closer
                .close()
                .await
                .map_err(|source| DispatchError::Close { sink: name, source })
        }
        None => Ok(()),
    }
}
