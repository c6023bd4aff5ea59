use color_eyre::Result;
use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
    Layer,
};

pub fn init_errors() -> Result<()> {
    color_eyre::install()
}

/// `RUST_LOG` wins. Otherwise `debug` beats `quiet`, and `debug_http` adds request traces.
pub fn log_filter(quiet: bool, debug: bool, debug_http: bool) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let level = if debug {
        "debug"
    } else if quiet {
        "error"
    } else {
        "info"
    };
    let mut directives = level.to_string();
    if debug_http {
        directives.push_str(",agent_metrics_collector=trace");
    }
    EnvFilter::new(directives)
}

pub fn init_logging(filter: EnvFilter) -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_filter(filter))
        .with(tracing_error::ErrorLayer::default())
        .try_init()?;
    Ok(())
}
