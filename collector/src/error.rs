use reqwest::StatusCode;

#[derive(thiserror::Error, Debug)]
pub enum CollectError {
    /// The API rejected the token. Retrying with the same token will not help.
    #[error("http 401 response received: unauthorized")]
    Unauthorized,
    /// Non-200 response carrying a JSON `message`.
    #[error("{message}")]
    Api { status: StatusCode, message: String },
    #[error("Request failed with {status} ({})", .status.as_u16())]
    Status { status: StatusCode },
    #[error("No organization slug was found in the metrics response")]
    MissingOrganization,
    #[error("Failed to decode metrics response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

impl CollectError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, CollectError::Unauthorized)
    }

    /// HTTP status of the failed response, if the failure came from one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            CollectError::Unauthorized => Some(StatusCode::UNAUTHORIZED),
            CollectError::Api { status, .. } | CollectError::Status { status } => Some(*status),
            CollectError::Transport(err) => err.status(),
            CollectError::MissingOrganization | CollectError::Decode(_) => None,
        }
    }
}
