use crate::{
    Provider,
    Token,
    TokenError,
};
use std::{
    fmt,
    sync::Arc,
};

/// Ordered list of providers. The first usable provider's outcome is final, success or not.
#[derive(Clone, Default)]
pub struct ProviderChain {
    providers: Vec<Arc<dyn Provider>>,
}

impl fmt::Debug for ProviderChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl ProviderChain {
    pub fn new(providers: Vec<Arc<dyn Provider>>) -> Self {
        Self { providers }
    }

    pub fn single(provider: impl Provider + 'static) -> Self {
        Self::new(vec![Arc::new(provider)])
    }

    /// Evaluated last.
    pub fn append(&mut self, provider: impl Provider + 'static) {
        self.providers.push(Arc::new(provider));
    }

    /// Evaluated first.
    pub fn prepend(&mut self, provider: impl Provider + 'static) {
        self.providers.insert(0, Arc::new(provider));
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|provider| provider.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub async fn resolve(&self) -> Result<Token, TokenError> {
        for provider in &self.providers {
            match provider.get().await {
                Ok(token) => {
                    debug!(provider = provider.name(), "resolved token");
                    return Ok(token);
                }
                Err(TokenError::NotUsable) => {
                    trace!(provider = provider.name(), "provider not usable, trying next");
                    continue;
                }
                Err(err) => return Err(err),
            }
        }

        Err(TokenError::NoUsableProvider(
            self.names().into_iter().map(str::to_string).collect(),
        ))
    }
}
