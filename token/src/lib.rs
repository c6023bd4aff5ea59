//! Resolution of Buildkite agent tokens.
//!
//! A [`Provider`] either yields a [`Token`], reports [`TokenError::NotUsable`] when the
//! configuration it needs is absent, or fails hard. Providers are evaluated in order by a
//! [`ProviderChain`]; the first usable provider decides the outcome. A [`TokenSource`] holds one
//! chain per logical credential so several tokens (e.g. one per cluster) can be polled.

#[macro_use]
extern crate tracing;

mod chain;
mod error;
mod exclusive;
mod provider;
mod source;
mod store;
mod token;

#[cfg(feature = "aws")]
pub mod aws;

pub use chain::ProviderChain;
pub use error::{
    StoreError,
    TokenError,
};
pub use exclusive::check_mutually_exclusive;
pub use provider::{
    EnvVarProvider,
    InMemoryProvider,
    Provider,
    StaticProvider,
    TOKEN_ENV_VAR,
};
pub use source::{
    Stores,
    TokenSettings,
    TokenSource,
    SECRETS_MANAGER_JSON_KEY_ENV_VAR,
    SECRETS_MANAGER_SECRET_ID_ENV_VAR,
    SSM_KEY_ENV_VAR,
    TOKEN_ENV_VAR_NAME_ENV_VAR,
};
pub use store::{
    ParameterStore,
    ParameterStoreProvider,
    SecretStore,
    SecretStoreProvider,
    SecretValue,
};
pub use token::Token;

pub type BoxFuture<'a, T> = futures::future::BoxFuture<'a, T>;
