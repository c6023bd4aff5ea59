use crate::{
    BoxFuture,
    Token,
    TokenError,
};

pub const TOKEN_ENV_VAR: &str = "BUILDKITE_AGENT_TOKEN";

/// Something that can obtain a Buildkite agent token.
pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns [`TokenError::NotUsable`] when the provider has nothing configured.
    fn get(&self) -> BoxFuture<'_, Result<Token, TokenError>>;
}

/// A token given inline, e.g. on the command line. Missing or empty is not usable.
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    token: Option<Token>,
}

impl StaticProvider {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.map(Token::new),
        }
    }
}

impl Provider for StaticProvider {
    fn name(&self) -> &'static str {
        "StaticProvider"
    }

    fn get(&self) -> BoxFuture<'_, Result<Token, TokenError>> {
        let token = self.token.clone().filter(|token| !token.is_empty());
        Box::pin(async move { token.ok_or(TokenError::NotUsable) })
    }
}

/// Always returns its token, even an empty one.
#[derive(Debug, Clone)]
pub struct InMemoryProvider {
    token: Token,
}

impl InMemoryProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Token::new(token),
        }
    }
}

impl Provider for InMemoryProvider {
    fn name(&self) -> &'static str {
        "InMemoryProvider"
    }

    fn get(&self) -> BoxFuture<'_, Result<Token, TokenError>> {
        let token = self.token.clone();
        Box::pin(async move { Ok(token) })
    }
}

/// Reads the token from an environment variable at resolution time.
#[derive(Debug, Clone)]
pub struct EnvVarProvider {
    var: String,
}

impl EnvVarProvider {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvVarProvider {
    fn default() -> Self {
        Self::new(TOKEN_ENV_VAR)
    }
}

impl Provider for EnvVarProvider {
    fn name(&self) -> &'static str {
        "EnvVarProvider"
    }

    fn get(&self) -> BoxFuture<'_, Result<Token, TokenError>> {
        let token = std::env::var(&self.var).ok().filter(|token| !token.is_empty());
        Box::pin(async move { token.map(Token::new).ok_or(TokenError::NotUsable) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_provider_returns_its_token() {
        let token = StaticProvider::new(Some("super secret".to_string())).get().await.unwrap();
        assert_eq!(token.expose(), "super secret");
    }

    #[tokio::test]
    async fn static_provider_without_token_is_not_usable() {
        assert!(StaticProvider::new(None).get().await.unwrap_err().is_not_usable());
        assert!(StaticProvider::new(Some(String::new())).get().await.unwrap_err().is_not_usable());
    }

    #[tokio::test]
    async fn in_memory_provider_returns_its_token() {
        let token = InMemoryProvider::new("some-token").get().await.unwrap();
        assert_eq!(token.expose(), "some-token");
    }

    #[tokio::test]
    async fn env_var_provider_reads_the_variable() {
        let var = "AGENT_METRICS_TEST_ENV_VAR_PROVIDER_SET";
        std::env::set_var(var, "some-token");
        let token = EnvVarProvider::new(var).get().await.unwrap();
        assert_eq!(token.expose(), "some-token");
    }

    #[tokio::test]
    async fn env_var_provider_without_variable_is_not_usable() {
        let err = EnvVarProvider::new("AGENT_METRICS_TEST_ENV_VAR_PROVIDER_UNSET")
            .get()
            .await
            .unwrap_err();
        assert!(err.is_not_usable());
    }
}
