//! Configuration for the inference gateway.
//!
//! [`GatewayConfig`] is read from camelCase JSON and validated before use.
//! Secrets never live in the file; a [`CredentialProvider`] supplies them.

#![warn(missing_docs, clippy::pedantic)]

pub mod credentials;
pub mod loader;
pub mod schema;

pub use credentials::{
    ANTHROPIC_API_KEY_ENV, CredentialProvider, EnvCredentialProvider, OPENAI_API_KEY_ENV,
    StaticCredentials,
};
pub use loader::{CONFIG_ENV_VAR, ConfigError, ConfigResult};
pub use schema::{GatewayConfig, ProviderEndpoints, TranslationSettings};
