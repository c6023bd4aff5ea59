use agent_metrics::{
    build_sink,
    dispatcher,
    init_errors,
    init_logging,
    log_filter,
    token_stores,
    Config,
};
use agent_metrics_http::router::{
    create_router,
    AppState,
    CLOUD_FUNCTION_ENTRY_POINT,
};
use agent_metrics_token::TokenSource;
use clap::Parser;
use color_eyre::Result;
use std::net::SocketAddr;
use tokio::net::TcpListener;

#[derive(Parser, Debug)]
#[command(author, version, about = "Serves agent metrics polling over HTTP", long_about = None)]
struct Args {
    /// IP address to listen on.
    #[arg(long, env = "AGENT_METRICS_HTTP_ADDRESS", default_value = "127.0.0.1:8081")]
    http_listen_address: SocketAddr,

    #[command(flatten)]
    metrics: agent_metrics::Args,
}

async fn start_server(args: Args) -> Result<()> {
    let config = Config::new(args.metrics)?;
    init_logging(log_filter(config.quiet, config.debug, config.debug_http))?;

    let stores = token_stores(&config).await;
    let tokens = TokenSource::from_settings(&config.token_settings(), &stores)?;
    let dispatcher = dispatcher(&config, CLOUD_FUNCTION_ENTRY_POINT)?;
    let sink = build_sink(&config).await?;
    let app = create_router(AppState::new(dispatcher, tokens, sink));

    tracing::info!("listening on {}", args.http_listen_address);

    let listener = TcpListener::bind(args.http_listen_address).await?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("received ctrl-c, shutting down");
            }
        })
        .await?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_errors()?;
    start_server(Args::parse()).await
}
