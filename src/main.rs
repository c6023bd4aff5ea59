use agent_metrics::{
    init_errors,
    init_logging,
    log_filter,
    App,
    Args,
    Config,
    DispatchError,
};
use clap::Parser;
use color_eyre::Result;
use tokio_util::sync::CancellationToken;

/// Exit code for a token the API rejected.
const EXIT_UNAUTHORIZED: i32 = 4;

#[tokio::main]
async fn main() -> Result<()> {
    init_errors()?;
    let config = Config::new(Args::parse())?;
    init_logging(log_filter(config.quiet, config.debug, config.debug_http))?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received ctrl-c, shutting down");
            on_signal.cancel();
        }
    });

    match App::new(config).await?.run(cancel).await {
        Err(err)
            if err
                .downcast_ref::<DispatchError>()
                .is_some_and(DispatchError::is_unauthorized) =>
        {
            tracing::error!("{err}");
            std::process::exit(EXIT_UNAUTHORIZED);
        }
        outcome => outcome,
    }
}
