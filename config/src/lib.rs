//! Layered configuration: embedded defaults, then `config.yaml`, then flags and environment.

#[macro_use]
extern crate tracing;

mod app_config;
mod args;
mod backend;

pub use agent_metrics_token::TokenSettings;
pub use app_config::get_config_dir;
pub use args::Args;
pub use backend::{
    BackendKind,
    PrometheusConfig,
    StatsdConfig,
};
use config::ConfigError;
use serde::{
    Deserialize,
    Deserializer,
};
use std::{
    fmt,
    time::Duration,
};
use url::Url;

const DEFAULT_CONFIG: &str = include_str!("default-config.yaml");

#[derive(Clone, Deserialize)]
pub struct Config {
    pub endpoint: Url,
    #[serde(default)]
    pub tokens: Vec<String>,
    #[serde(default)]
    pub token_env_var: Option<String>,
    #[serde(default)]
    pub ssm_key: Option<String>,
    #[serde(default)]
    pub secret_ids: Vec<String>,
    #[serde(default)]
    pub secret_json_key: Option<String>,
    #[serde(default)]
    pub aws_region: Option<String>,
    #[serde(default)]
    pub queues: Vec<String>,
    #[serde(deserialize_with = "de_duration")]
    pub timeout: Duration,
    pub max_idle_conns: i64,
    /// Absent means poll once and exit.
    #[serde(default, deserialize_with = "de_opt_duration")]
    pub interval: Option<Duration>,
    #[serde(default)]
    pub quiet: bool,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub debug_http: bool,
    #[serde(default)]
    pub dry_run: bool,
    pub backend: BackendKind,
    pub statsd: StatsdConfig,
    pub prometheus: PrometheusConfig,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("endpoint", &self.endpoint.as_str())
            .field("tokens", &format_args!("[{} redacted]", self.tokens.len()))
            .field("token_env_var", &self.token_env_var)
            .field("ssm_key", &self.ssm_key)
            .field("secret_ids", &self.secret_ids)
            .field("secret_json_key", &self.secret_json_key)
            .field("aws_region", &self.aws_region)
            .field("queues", &self.queues)
            .field("timeout", &self.timeout)
            .field("max_idle_conns", &self.max_idle_conns)
            .field("interval", &self.interval)
            .field("quiet", &self.quiet)
            .field("debug", &self.debug)
            .field("debug_http", &self.debug_http)
            .field("dry_run", &self.dry_run)
            .field("backend", &self.backend)
            .field("statsd", &self.statsd)
            .field("prometheus", &self.prometheus)
            .finish()
    }
}

impl Config {
    pub fn new(args: Args) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Yaml));

        builder = match &args.config {
            Some(path) => builder.add_source(
                config::File::from(path.as_path())
                    .format(config::FileFormat::Yaml)
                    .required(true),
            ),
            None => builder.add_source(
                config::File::from(get_config_dir().join("config.yaml"))
                    .format(config::FileFormat::Yaml)
                    .required(false),
            ),
        };

        builder = builder.add_source(args);

        let cfg: Self = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        debug!(config = ?cfg, "loaded configuration");

        Ok(cfg)
    }

    /// Checks values no single field can check on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout.is_zero() {
            return Err(ConfigError::Message("timeout must be greater than zero".to_string()));
        }
        if self.max_idle_conns < -1 {
            return Err(ConfigError::Message(format!(
                "max_idle_conns must be -1 or greater, got {}",
                self.max_idle_conns
            )));
        }
        if self.interval.is_some_and(|interval| interval.is_zero()) {
            return Err(ConfigError::Message("interval must be greater than zero".to_string()));
        }
        match self.backend {
            BackendKind::Statsd if self.statsd.host.trim().is_empty() => {
                Err(ConfigError::Message("the statsd backend needs a host".to_string()))
            }
            BackendKind::Prometheus if !self.prometheus.path.starts_with('/') => Err(ConfigError::Message(format!(
                "prometheus path must start with '/', got '{}'",
                self.prometheus.path
            ))),
            _ => Ok(()),
        }
    }

    pub fn token_settings(&self) -> TokenSettings {
        TokenSettings {
            tokens: self.tokens.clone(),
            token_env_var: self.token_env_var.clone().filter(|var| !var.is_empty()),
            ssm_key: self.ssm_key.clone().filter(|key| !key.is_empty()),
            secret_ids: self.secret_ids.clone(),
            secret_json_key: self.secret_json_key.clone().filter(|key| !key.is_empty()),
        }
    }
}

/// Durations are either humantime strings (`15s`, `1m30s`) or plain seconds.
fn parse_duration(text: &str) -> Result<Duration, String> {
    let text = text.trim();
    if let Ok(secs) = text.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(text).map_err(|err| format!("invalid duration '{text}': {err}"))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Seconds(u64),
    Text(String),
}

impl RawDuration {
    fn into_duration(self) -> Result<Duration, String> {
        match self {
            RawDuration::Seconds(secs) => Ok(Duration::from_secs(secs)),
            RawDuration::Text(text) => parse_duration(&text),
        }
    }
}

fn de_duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    RawDuration::deserialize(deserializer)?
        .into_duration()
        .map_err(serde::de::Error::custom)
}

fn de_opt_duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
    match Option::<RawDuration>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawDuration::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(raw) => raw.into_duration().map(Some).map_err(serde::de::Error::custom),
    }
}
