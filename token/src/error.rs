/// Error returned by a parameter or secret store client.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

#[derive(thiserror::Error, Debug)]
pub enum TokenError {
    /// The provider lacks the configuration it needs. A chain moves on to the next provider.
    #[error("provider not usable")]
    NotUsable,
    #[error("one of [{}] must be provided", .0.join(", "))]
    Unconfigured(Vec<String>),
    #[error("[{}] are mutually exclusive, only one may be set", .0.join(", "))]
    Misconfigured(Vec<String>),
    #[error("no providers in the chain [{}] were able to resolve a token", .0.join(", "))]
    NoUsableProvider(Vec<String>),
    #[error("failed to retrieve token ({key}) from {provider}: {source}")]
    Retrieval {
        provider: &'static str,
        key: String,
        source: StoreError,
    },
    #[error("failed to parse secret '{secret_id}': {reason}")]
    InvalidSecret { secret_id: String, reason: String },
    #[error("{0} is configured but no client for it was supplied")]
    StoreUnavailable(&'static str),
}

impl TokenError {
    pub fn is_not_usable(&self) -> bool {
        matches!(self, TokenError::NotUsable)
    }
}
