use agent_metrics::{
    BatchReport,
    TokenErrorDetail,
};
use serde::Serialize;
use std::time::Duration;

/// JSON body of every `POST /` answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "is_zero")]
    pub metrics_collected: usize,
    #[serde(skip_serializing_if = "is_zero")]
    pub tokens_processed: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub token_errors: Vec<TokenErrorDetail>,
}

fn is_zero(count: &usize) -> bool {
    *count == 0
}

impl PollResponse {
    pub fn skipped(remaining: Duration) -> Self {
        Self {
            success: true,
            message: Some(format!("Skipping polling, next poll time is in {remaining:?}")),
            ..Default::default()
        }
    }

    pub fn completed(report: &BatchReport) -> Self {
        let message = if report.token_errors.is_empty() {
            format!(
                "Successfully processed all {} tokens and collected {} total metrics",
                report.tokens_processed, report.metrics_collected
            )
        } else {
            format!(
                "Successfully processed {} of {} tokens, collected {} total metrics. {} token(s) had errors.",
                report.successful_tokens,
                report.tokens_processed,
                report.metrics_collected,
                report.token_errors.len()
            )
        };

        Self {
            success: true,
            message: Some(message),
            ..Default::default()
        }
        .with_report(report)
    }

    pub fn failed(error: String) -> Self {
        Self {
            success: false,
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn with_report(mut self, report: &BatchReport) -> Self {
        self.metrics_collected = report.metrics_collected;
        self.tokens_processed = report.tokens_processed;
        self.token_errors = report.token_errors.clone();
        self
    }
}
