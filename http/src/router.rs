use crate::{
    error::AppError,
    response::PollResponse,
};
use agent_metrics::{
    scheduler::{
        invoke,
        Invocation,
        SchedulerState,
    },
    Dispatcher,
    FailurePolicy,
};
use agent_metrics_backend::MetricsSink;
use agent_metrics_token::TokenSource;
use axum::{
    extract::State,
    routing::{
        get,
        post,
    },
    Json,
    Router,
};
use std::sync::Arc;
use tokio::sync::Mutex;

pub const CLOUD_FUNCTION_ENTRY_POINT: &str = "gcp-cloud-function";

struct Poller {
    scheduler: SchedulerState,
    sink: Box<dyn MetricsSink>,
}

#[derive(Clone)]
pub struct AppState {
    dispatcher: Arc<Dispatcher>,
    tokens: Arc<TokenSource>,
    poller: Arc<Mutex<Poller>>,
}

impl AppState {
    /// Batches triggered over HTTP always tolerate failing tokens.
    pub fn new(dispatcher: Dispatcher, tokens: TokenSource, sink: Box<dyn MetricsSink>) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher.with_policy(FailurePolicy::Tolerant)),
            tokens: Arc::new(tokens),
            poller: Arc::new(Mutex::new(Poller {
                scheduler: SchedulerState::default(),
                sink,
            })),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/", post(poll))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

/// Concurrent triggers queue up on the poller, so batches never overlap.
async fn poll(State(state): State<AppState>) -> Result<Json<PollResponse>, AppError> {
    let mut poller = state.poller.lock().await;
    let Poller { scheduler, sink } = &mut *poller;

    info!(tokens = state.tokens.len(), "Starting Buildkite metrics collection");
    let response = match invoke(scheduler, &state.dispatcher, &state.tokens, sink.as_mut()).await? {
        Invocation::Skipped { remaining } => PollResponse::skipped(remaining),
        Invocation::Ran(report) => {
            let response = PollResponse::completed(&report);
            if let Some(message) = &response.message {
                info!("{message}");
            }
            response
        }
    };

    Ok(Json(response))
}
