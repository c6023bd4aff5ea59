use serde::Deserialize;
use std::net::SocketAddr;
use strum::{
    Display,
    EnumString,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Stdout,
    Prometheus,
    Statsd,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatsdConfig {
    pub host: String,
    /// DogStatsD style tags instead of names with embedded cluster and queue.
    #[serde(default)]
    pub tags: bool,
    #[serde(default)]
    pub prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PrometheusConfig {
    pub addr: SocketAddr,
    pub path: String,
}
