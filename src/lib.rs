#[macro_use]
extern crate tracing;

mod app;
pub mod dispatch;
mod logging;
pub mod scheduler;

pub use agent_metrics_config::{
    Args,
    Config,
};
pub use app::{
    build_sink,
    dispatcher,
    token_stores,
    App,
    CLI_ENTRY_POINT,
};
pub use dispatch::{
    BatchReport,
    DispatchError,
    Dispatcher,
    FailurePolicy,
    TokenErrorDetail,
};
pub use logging::{
    init_errors,
    init_logging,
    log_filter,
};
pub use scheduler::{
    Invocation,
    SchedulerState,
};
use std::time::Duration;

/// `User-Agent` sent to the metrics API, e.g. `buildkite-agent-metrics/0.1.0 buildkite-agent-metrics-cli interval=30s`.
pub fn user_agent(entry_point: &str, interval: Option<Duration>) -> String {
    let mut agent = format!("buildkite-agent-metrics/{} {entry_point}", env!("CARGO_PKG_VERSION"));
    if let Some(interval) = interval {
        agent.push_str(&format!(" interval={}", humantime::format_duration(interval)));
    }
    agent
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn user_agent_names_the_entry_point_and_interval() {
        let version = env!("CARGO_PKG_VERSION");
        assert_eq!(
            user_agent(CLI_ENTRY_POINT, None),
            format!("buildkite-agent-metrics/{version} buildkite-agent-metrics-cli")
        );
        assert_eq!(
            user_agent(CLI_ENTRY_POINT, Some(Duration::from_secs(30))),
            format!("buildkite-agent-metrics/{version} buildkite-agent-metrics-cli interval=30s")
        );
    }
}
