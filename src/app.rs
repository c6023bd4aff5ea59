use crate::{
    dispatch::Dispatcher,
    scheduler,
    user_agent,
};
use agent_metrics_backend::{
    serve_metrics,
    MetricsSink,
    PrometheusSink,
    StatsdSink,
    StdoutSink,
};
use agent_metrics_collector::build_http_client;
use agent_metrics_config::{
    BackendKind,
    Config,
};
use agent_metrics_token::{
    Stores,
    TokenSource,
};
use color_eyre::Result;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub const CLI_ENTRY_POINT: &str = "buildkite-agent-metrics-cli";

pub struct App {
    config: Config,
    dispatcher: Dispatcher,
    tokens: TokenSource,
    sink: Box<dyn MetricsSink>,
}

impl App {
    pub async fn new(config: Config) -> Result<Self> {
        let stores = token_stores(&config).await;
        let tokens = TokenSource::from_settings(&config.token_settings(), &stores)?;
        let dispatcher = dispatcher(&config, CLI_ENTRY_POINT)?;
        let sink = build_sink(&config).await?;

        Ok(Self {
            config,
            dispatcher,
            tokens,
            sink,
        })
    }

    /// Polls once, or until `cancel` fires when an interval is configured.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        info!(
            tokens = self.tokens.len(),
            backend = %self.config.backend,
            dry_run = self.config.dry_run,
            "starting agent metrics"
        );

        match self.config.interval {
            None => {
                self.dispatcher.dispatch(&self.tokens, self.sink.as_mut()).await?;
            }
            Some(interval) => {
                scheduler::run_loop(interval, &self.dispatcher, &self.tokens, self.sink.as_mut(), cancel).await?;
            }
        }
        Ok(())
    }
}

/// A dispatcher for `config`, identifying itself as `entry_point`.
pub fn dispatcher(config: &Config, entry_point: &str) -> Result<Dispatcher> {
    let http = build_http_client(config.timeout, config.max_idle_conns)?;
    Ok(Dispatcher::new(http, config.endpoint.clone())
        .with_queues(config.queues.clone())
        .with_user_agent(user_agent(entry_point, config.interval))
        .with_debug_http(config.debug_http)
        .with_dry_run(config.dry_run))
}

/// Creates the configured sink. The Prometheus sink starts serving its registry right away.
pub async fn build_sink(config: &Config) -> Result<Box<dyn MetricsSink>> {
    let sink: Box<dyn MetricsSink> = match config.backend {
        BackendKind::Stdout => Box::new(StdoutSink::new()),
        BackendKind::Statsd => {
            let statsd = &config.statsd;
            Box::new(StatsdSink::connect(statsd.host.as_str(), statsd.tags, &statsd.prefix)?)
        }
        BackendKind::Prometheus => {
            let sink = PrometheusSink::new();
            let listener = TcpListener::bind(config.prometheus.addr).await?;
            let registry = sink.registry();
            let path = config.prometheus.path.clone();
            tokio::spawn(async move {
                if let Err(err) = serve_metrics(listener, &path, registry).await {
                    error!("prometheus server failed: {err}");
                }
            });
            Box::new(sink)
        }
    };
    Ok(sink)
}

/// Parameter store and Secrets Manager clients, only created when a credential needs them.
#[cfg(feature = "aws")]
pub async fn token_stores(config: &Config) -> Stores {
    let settings = config.token_settings();
    if settings.ssm_key.is_none() && settings.secret_ids.is_empty() {
        return Stores::default();
    }
    let sdk = agent_metrics_token::aws::load_config(config.aws_region.clone()).await;
    agent_metrics_token::aws::stores(&sdk)
}

#[cfg(not(feature = "aws"))]
pub async fn token_stores(config: &Config) -> Stores {
    let settings = config.token_settings();
    if settings.ssm_key.is_some() || !settings.secret_ids.is_empty() {
        warn!("built without the `aws` feature, parameter store and Secrets Manager tokens cannot be resolved");
    }
    Stores::default()
}
