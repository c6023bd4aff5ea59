use crate::BackendKind;
use clap::{
    builder::FalseyValueParser,
    ArgAction,
    Parser,
};
use std::path::PathBuf;

/// Polls Buildkite agent, job and queue metrics and ships them to a monitoring backend.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file, instead of `config.yaml` in the config directory.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Buildkite agent registration tokens. Several cluster tokens poll several clusters.
    #[arg(long = "token", env = "BUILDKITE_AGENT_TOKEN", value_delimiter = ',', hide_env_values = true)]
    pub tokens: Vec<String>,

    /// Environment variable holding the agent token, read again on every poll.
    #[arg(long, env = "BUILDKITE_AGENT_TOKEN_ENV_VAR", value_name = "VAR")]
    pub token_env_var: Option<String>,

    /// Parameter store key holding the agent token.
    #[arg(long, env = "BUILDKITE_AGENT_TOKEN_SSM_KEY")]
    pub ssm_key: Option<String>,

    /// Secrets Manager secret ids holding agent tokens.
    #[arg(long = "secret-id", env = "BUILDKITE_AGENT_SECRETS_MANAGER_SECRET_ID", value_delimiter = ',')]
    pub secret_ids: Vec<String>,

    /// Key of the token inside a JSON secret.
    #[arg(long, env = "BUILDKITE_AGENT_SECRETS_MANAGER_JSON_KEY")]
    pub secret_json_key: Option<String>,

    /// AWS region of the parameter store and Secrets Manager.
    #[arg(long, env = "AWS_REGION")]
    pub aws_region: Option<String>,

    /// Buildkite Agent API endpoint.
    #[arg(long, env = "BUILDKITE_AGENT_ENDPOINT", value_name = "URL")]
    pub endpoint: Option<String>,

    /// Only poll these queues.
    #[arg(long = "queue", env = "BUILDKITE_QUEUE", value_delimiter = ',')]
    pub queues: Vec<String>,

    /// Per request timeout, e.g. `15s` or plain seconds.
    #[arg(long, env = "BUILDKITE_AGENT_METRICS_TIMEOUT")]
    pub timeout: Option<String>,

    /// Maximum idle keep-alive connections. 0 means no limit, -1 disables reuse.
    #[arg(long, env = "BUILDKITE_AGENT_METRICS_MAX_IDLE_CONNS", allow_negative_numbers = true)]
    pub max_idle_conns: Option<i64>,

    /// Update metrics every interval, rather than once.
    #[arg(long, value_name = "DURATION")]
    pub interval: Option<String>,

    /// Only print errors.
    #[arg(long, env = "BUILDKITE_QUIET", action = ArgAction::SetTrue, value_parser = FalseyValueParser::new())]
    pub quiet: bool,

    /// Show debug output.
    #[arg(long, env = "BUILDKITE_DEBUG", action = ArgAction::SetTrue, value_parser = FalseyValueParser::new())]
    pub debug: bool,

    /// Show full HTTP traces.
    #[arg(
        long,
        env = "BUILDKITE_AGENT_METRICS_DEBUG_HTTP",
        action = ArgAction::SetTrue,
        value_parser = FalseyValueParser::new()
    )]
    pub debug_http: bool,

    /// Collect metrics but do not send them to the backend.
    #[arg(long, action = ArgAction::SetTrue)]
    pub dry_run: bool,

    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    /// StatsD server.
    #[arg(long, value_name = "HOST:PORT")]
    pub statsd_host: Option<String>,

    /// Whether the StatsD server supports tags like Datadog.
    #[arg(long, action = ArgAction::SetTrue)]
    pub statsd_tags: bool,

    #[arg(long)]
    pub statsd_metrics_prefix: Option<String>,

    /// Prometheus metrics bind address.
    #[arg(long, value_name = "ADDR")]
    pub prometheus_addr: Option<String>,

    /// Prometheus metrics path.
    #[arg(long)]
    pub prometheus_path: Option<String>,
}

mod config_ext {
    use super::*;
    use config::{
        Map,
        Source,
        Value,
    };
    use std::collections::HashMap;

    fn trimmed(list: &[String]) -> Vec<String> {
        list.iter()
            .map(|item| item.trim())
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()
    }

    impl Source for Args {
        fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
            Box::new((*self).clone())
        }

        fn collect(&self) -> Result<Map<String, Value>, config::ConfigError> {
            let mut cache = HashMap::<String, Value>::new();

            let tokens = trimmed(&self.tokens);
            if !tokens.is_empty() {
                cache.insert("tokens".to_string(), tokens.into());
            }
            if let Some(var) = &self.token_env_var {
                cache.insert("token_env_var".to_string(), var.clone().into());
            }
            if let Some(ssm_key) = &self.ssm_key {
                cache.insert("ssm_key".to_string(), ssm_key.clone().into());
            }
            let secret_ids = trimmed(&self.secret_ids);
            if !secret_ids.is_empty() {
                cache.insert("secret_ids".to_string(), secret_ids.into());
            }
            if let Some(json_key) = &self.secret_json_key {
                cache.insert("secret_json_key".to_string(), json_key.clone().into());
            }
            if let Some(region) = &self.aws_region {
                cache.insert("aws_region".to_string(), region.clone().into());
            }
            if let Some(endpoint) = &self.endpoint {
                cache.insert("endpoint".to_string(), endpoint.clone().into());
            }
            let queues = trimmed(&self.queues);
            if !queues.is_empty() {
                cache.insert("queues".to_string(), queues.into());
            }
            if let Some(timeout) = &self.timeout {
                cache.insert("timeout".to_string(), timeout.clone().into());
            }
            if let Some(max_idle_conns) = self.max_idle_conns {
                cache.insert("max_idle_conns".to_string(), max_idle_conns.into());
            }
            if let Some(interval) = &self.interval {
                cache.insert("interval".to_string(), interval.clone().into());
            }
            for (key, set) in [
                ("quiet", self.quiet),
                ("debug", self.debug),
                ("debug_http", self.debug_http),
                ("dry_run", self.dry_run),
                ("statsd.tags", self.statsd_tags),
            ] {
                if set {
                    cache.insert(key.to_string(), true.into());
                }
            }
            if let Some(backend) = self.backend {
                cache.insert("backend".to_string(), backend.to_string().into());
            }
            if let Some(host) = &self.statsd_host {
                cache.insert("statsd.host".to_string(), host.clone().into());
            }
            if let Some(prefix) = &self.statsd_metrics_prefix {
                cache.insert("statsd.prefix".to_string(), prefix.clone().into());
            }
            if let Some(addr) = &self.prometheus_addr {
                // `:8080` binds every interface.
                let addr = if addr.starts_with(':') {
                    format!("0.0.0.0{addr}")
                } else {
                    addr.clone()
                };
                cache.insert("prometheus.addr".to_string(), addr.into());
            }
            if let Some(path) = &self.prometheus_path {
                cache.insert("prometheus.path".to_string(), path.clone().into());
            }

            Ok(cache)
        }
    }
}
