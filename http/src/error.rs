use crate::response::PollResponse;
use agent_metrics::DispatchError;
use axum::{
    http::StatusCode,
    response::{
        IntoResponse,
        Response,
    },
    Json,
};

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = match self {
            AppError::Dispatch(DispatchError::AllTokensFailed(report)) => {
                let error = format!("All {} tokens failed to collect metrics", report.tokens_processed);
                PollResponse::failed(error).with_report(&report)
            }
            AppError::Dispatch(err) => PollResponse::failed(err.to_string()),
        };
        error!(error = body.error.as_deref().unwrap_or_default(), "polling failed");

        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}
