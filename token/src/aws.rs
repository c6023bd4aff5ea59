//! AWS Systems Manager and Secrets Manager backed stores.

use crate::{
    BoxFuture,
    ParameterStore,
    SecretStore,
    SecretValue,
    StoreError,
    Stores,
};
use aws_config::BehaviorVersion;
use std::sync::Arc;

/// Loads the shared AWS configuration, overriding the region when given.
pub async fn load_config(region: Option<String>) -> aws_config::SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(aws_config::Region::new(region));
    }
    loader.load().await
}

/// Both AWS stores from one configuration.
pub fn stores(config: &aws_config::SdkConfig) -> Stores {
    Stores {
        parameters: Some(Arc::new(SsmParameterStore::new(config))),
        secrets: Some(Arc::new(SecretsManagerStore::new(config))),
    }
}

#[derive(Clone, Debug)]
pub struct SsmParameterStore {
    client: aws_sdk_ssm::Client,
}

impl SsmParameterStore {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_ssm::Client::new(config),
        }
    }
}

impl ParameterStore for SsmParameterStore {
    fn get_parameter<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<String, StoreError>> {
        Box::pin(async move {
            let output = self
                .client
                .get_parameter()
                .name(name)
                .with_decryption(true)
                .send()
                .await
                .map_err(|err| StoreError::from(aws_sdk_ssm::error::DisplayErrorContext(err).to_string()))?;

            output
                .parameter()
                .and_then(|parameter| parameter.value())
                .map(str::to_string)
                .ok_or_else(|| StoreError::from(format!("parameter {name} has no value")))
        })
    }
}

#[derive(Clone, Debug)]
pub struct SecretsManagerStore {
    client: aws_sdk_secretsmanager::Client,
}

impl SecretsManagerStore {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_secretsmanager::Client::new(config),
        }
    }
}

impl SecretStore for SecretsManagerStore {
    fn get_secret_value<'a>(&'a self, secret_id: &'a str) -> BoxFuture<'a, Result<SecretValue, StoreError>> {
        Box::pin(async move {
            let output = self
                .client
                .get_secret_value()
                .secret_id(secret_id)
                .send()
                .await
                .map_err(|err| {
                    StoreError::from(aws_sdk_secretsmanager::error::DisplayErrorContext(err).to_string())
                })?;

            if let Some(secret) = output.secret_string() {
                return Ok(SecretValue::String(secret.to_string()));
            }
            if let Some(bytes) = output.secret_binary() {
                return Ok(SecretValue::Binary(bytes.as_ref().to_vec()));
            }
            Err(StoreError::from(format!("secret {secret_id} has no value")))
        })
    }
}
