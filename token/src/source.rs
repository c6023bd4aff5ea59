use crate::{
    check_mutually_exclusive,
    EnvVarProvider,
    InMemoryProvider,
    ParameterStore,
    ParameterStoreProvider,
    ProviderChain,
    SecretStore,
    SecretStoreProvider,
    Token,
    TokenError,
    TOKEN_ENV_VAR,
};
use std::sync::Arc;

pub const SSM_KEY_ENV_VAR: &str = "BUILDKITE_AGENT_TOKEN_SSM_KEY";
pub const SECRETS_MANAGER_SECRET_ID_ENV_VAR: &str = "BUILDKITE_AGENT_SECRETS_MANAGER_SECRET_ID";
pub const SECRETS_MANAGER_JSON_KEY_ENV_VAR: &str = "BUILDKITE_AGENT_SECRETS_MANAGER_JSON_KEY";
pub const TOKEN_ENV_VAR_NAME_ENV_VAR: &str = "BUILDKITE_AGENT_TOKEN_ENV_VAR";

/// Where the agent tokens come from. Exactly one of `tokens`, `token_env_var`, `ssm_key` and
/// `secret_ids` may be set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenSettings {
    pub tokens: Vec<String>,
    /// Environment variable read for the token each time it is resolved.
    pub token_env_var: Option<String>,
    pub ssm_key: Option<String>,
    pub secret_ids: Vec<String>,
    pub secret_json_key: Option<String>,
}

/// Store clients used by store-backed providers.
#[derive(Clone, Default)]
pub struct Stores {
    pub parameters: Option<Arc<dyn ParameterStore>>,
    pub secrets: Option<Arc<dyn SecretStore>>,
}

/// One provider chain per logical credential.
#[derive(Debug, Clone, Default)]
pub struct TokenSource {
    chains: Vec<ProviderChain>,
}

impl TokenSource {
    pub fn new(chains: Vec<ProviderChain>) -> Self {
        Self { chains }
    }

    pub fn from_settings(settings: &TokenSettings, stores: &Stores) -> Result<Self, TokenError> {
        check_mutually_exclusive(&[
            (TOKEN_ENV_VAR, !settings.tokens.is_empty()),
            (
                TOKEN_ENV_VAR_NAME_ENV_VAR,
                settings.token_env_var.as_deref().is_some_and(|var| !var.is_empty()),
            ),
            (SSM_KEY_ENV_VAR, settings.ssm_key.as_deref().is_some_and(|key| !key.is_empty())),
            (SECRETS_MANAGER_SECRET_ID_ENV_VAR, !settings.secret_ids.is_empty()),
        ])?;

        let mut chains = Vec::new();

        for token in &settings.tokens {
            chains.push(ProviderChain::single(InMemoryProvider::new(token.clone())));
        }

        if let Some(var) = settings.token_env_var.as_deref().filter(|var| !var.is_empty()) {
            chains.push(ProviderChain::single(EnvVarProvider::new(var)));
        }

        if let Some(key) = &settings.ssm_key {
            chains.push(ProviderChain::single(ParameterStoreProvider::new(
                stores.parameters.clone(),
                Some(key.clone()),
            )));
        }

        match &settings.secret_json_key {
            Some(json_key) if !settings.secret_ids.is_empty() => {
                // The JSON key addresses a single secret, so the list is taken as one id.
                let secret_id = settings.secret_ids.join(",");
                chains.push(ProviderChain::single(
                    SecretStoreProvider::new(stores.secrets.clone(), Some(secret_id))
                        .with_json_key(Some(json_key.clone())),
                ));
            }
            _ => {
                for secret_id in &settings.secret_ids {
                    chains.push(ProviderChain::single(SecretStoreProvider::new(
                        stores.secrets.clone(),
                        Some(secret_id.clone()),
                    )));
                }
            }
        }

        Ok(Self { chains })
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Resolves every credential in order.
    ///
    /// The returned list has one entry per credential, in the same order.
    pub async fn resolve_each(&self) -> Vec<Result<Token, TokenError>> {
        let mut resolved = Vec::with_capacity(self.chains.len());
        for (index, chain) in self.chains.iter().enumerate() {
            let result = chain.resolve().await;
            if let Err(err) = &result {
                warn!(token_index = index, error = %err, "failed to resolve token");
            }
            resolved.push(result);
        }
        resolved
    }

    /// Resolves every credential, aborting on the first error.
    pub async fn resolve_all(&self) -> Result<Vec<Token>, TokenError> {
        let mut tokens = Vec::with_capacity(self.chains.len());
        for chain in &self.chains {
            tokens.push(chain.resolve().await?);
        }
        Ok(tokens)
    }
}
