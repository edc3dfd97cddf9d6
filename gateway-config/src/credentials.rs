//! Backend secrets supplied at startup.

use std::collections::HashMap;
use std::fmt;

use gateway_primitives::RemoteProvider;

/// Environment variable holding the `OpenAI` API key.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Environment variable holding the Anthropic API key.
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Supplies provider secrets. Consulted only while backends are constructed.
pub trait CredentialProvider: Send + Sync {
    /// Returns the API key for `provider`, if one is available.
    fn api_key(&self, provider: RemoteProvider) -> Option<String>;
}

/// Reads keys from process environment variables.
///
/// Ollama needs no key and always yields `None`.
#[derive(Clone, Copy)]
pub struct EnvCredentialProvider {
    lookup: fn(&str) -> Option<String>,
}

impl Default for EnvCredentialProvider {
    fn default() -> Self {
        Self {
            lookup: |name| std::env::var(name).ok(),
        }
    }
}

impl fmt::Debug for EnvCredentialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvCredentialProvider").finish_non_exhaustive()
    }
}

impl EnvCredentialProvider {
    /// Reads from the real process environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads variables through `lookup` instead of the process environment.
    #[must_use]
    pub const fn with_lookup(lookup: fn(&str) -> Option<String>) -> Self {
        Self { lookup }
    }

    /// Name of the variable consulted for `provider`.
    #[must_use]
    pub const fn variable_for(provider: RemoteProvider) -> Option<&'static str> {
        match provider {
            RemoteProvider::OpenAi => Some(OPENAI_API_KEY_ENV),
            RemoteProvider::Anthropic => Some(ANTHROPIC_API_KEY_ENV),
            RemoteProvider::Ollama => None,
        }
    }
}

impl CredentialProvider for EnvCredentialProvider {
    fn api_key(&self, provider: RemoteProvider) -> Option<String> {
        let name = Self::variable_for(provider)?;
        (self.lookup)(name).filter(|value| !value.trim().is_empty())
    }
}

/// Fixed in-memory keys.
#[derive(Clone, Default)]
pub struct StaticCredentials {
    keys: HashMap<RemoteProvider, String>,
}

impl fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("providers", &self.keys.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl StaticCredentials {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a key for `provider`.
    #[must_use]
    pub fn with_key(mut self, provider: RemoteProvider, key: impl Into<String>) -> Self {
        self.keys.insert(provider, key.into());
        self
    }
}

impl CredentialProvider for StaticCredentials {
    fn api_key(&self, provider: RemoteProvider) -> Option<String> {
        self.keys.get(&provider).cloned()
    }
}
