use crate::{
    BoxFuture,
    Provider,
    StoreError,
    Token,
    TokenError,
};
use std::{
    fmt,
    sync::Arc,
};

/// A key/value parameter store holding encrypted parameters.
pub trait ParameterStore: Send + Sync {
    /// Fetch a parameter, decrypting it.
    fn get_parameter<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<String, StoreError>>;
}

/// Payload of a stored secret.
#[derive(Clone, PartialEq, Eq)]
pub enum SecretValue {
    String(String),
    Binary(Vec<u8>),
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretValue::String(_) => f.write_str("SecretValue::String([REDACTED])"),
            SecretValue::Binary(bytes) => write!(f, "SecretValue::Binary({} bytes)", bytes.len()),
        }
    }
}

pub trait SecretStore: Send + Sync {
    fn get_secret_value<'a>(&'a self, secret_id: &'a str) -> BoxFuture<'a, Result<SecretValue, StoreError>>;
}

/// Reads the token from a parameter store key. Not usable without a key.
#[derive(Clone)]
pub struct ParameterStoreProvider {
    client: Option<Arc<dyn ParameterStore>>,
    key: Option<String>,
}

impl ParameterStoreProvider {
    pub fn new(client: Option<Arc<dyn ParameterStore>>, key: Option<String>) -> Self {
        Self { client, key }
    }
}

impl Provider for ParameterStoreProvider {
    fn name(&self) -> &'static str {
        "ParameterStoreProvider"
    }

    fn get(&self) -> BoxFuture<'_, Result<Token, TokenError>> {
        Box::pin(async move {
            let Some(key) = self.key.as_deref().filter(|key| !key.is_empty()) else {
                return Err(TokenError::NotUsable);
            };
            let client = self
                .client
                .as_ref()
                .ok_or(TokenError::StoreUnavailable("parameter store"))?;

            debug!(key, "fetching token from parameter store");
            let value = client
                .get_parameter(key)
                .await
                .map_err(|source| TokenError::Retrieval {
                    provider: self.name(),
                    key: key.to_string(),
                    source,
                })?;

            Ok(Token::new(value))
        })
    }
}

/// Reads the token from a secret, optionally picking a string field out of a JSON object.
#[derive(Clone)]
pub struct SecretStoreProvider {
    client: Option<Arc<dyn SecretStore>>,
    secret_id: Option<String>,
    json_key: Option<String>,
}

impl SecretStoreProvider {
    pub fn new(client: Option<Arc<dyn SecretStore>>, secret_id: Option<String>) -> Self {
        Self {
            client,
            secret_id,
            json_key: None,
        }
    }

    pub fn with_json_key(mut self, json_key: Option<String>) -> Self {
        self.json_key = json_key.filter(|key| !key.is_empty());
        self
    }
}

impl Provider for SecretStoreProvider {
    fn name(&self) -> &'static str {
        "SecretStoreProvider"
    }

    fn get(&self) -> BoxFuture<'_, Result<Token, TokenError>> {
        Box::pin(async move {
            let Some(secret_id) = self.secret_id.as_deref().filter(|id| !id.is_empty()) else {
                return Err(TokenError::NotUsable);
            };
            let client = self
                .client
                .as_ref()
                .ok_or(TokenError::StoreUnavailable("secret store"))?;

            debug!(secret_id, json_key = ?self.json_key, "fetching token from secret store");
            let value = client
                .get_secret_value(secret_id)
                .await
                .map_err(|source| TokenError::Retrieval {
                    provider: self.name(),
                    key: secret_id.to_string(),
                    source,
                })?;

            let secret = match value {
                SecretValue::String(secret) => secret,
                SecretValue::Binary(bytes) => {
                    String::from_utf8(bytes).map_err(|err| TokenError::InvalidSecret {
                        secret_id: secret_id.to_string(),
                        reason: format!("binary secret is not valid UTF-8: {err}"),
                    })?
                }
            };

            match &self.json_key {
                None => Ok(Token::new(secret)),
                Some(json_key) => extract_json_key(secret_id, &secret, json_key),
            }
        })
    }
}

fn extract_json_key(secret_id: &str, secret: &str, json_key: &str) -> Result<Token, TokenError> {
    let invalid = |reason: String| TokenError::InvalidSecret {
        secret_id: secret_id.to_string(),
        reason,
    };

    let object: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(secret).map_err(|err| invalid(format!("not a JSON object: {err}")))?;

    match object.get(json_key) {
        Some(serde_json::Value::String(token)) => Ok(Token::new(token.clone())),
        Some(_) => Err(invalid(format!("value of key '{json_key}' is not a string"))),
        None => Err(invalid(format!("key '{json_key}' not found"))),
    }
}
