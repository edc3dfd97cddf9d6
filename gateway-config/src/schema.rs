//! Strongly typed configuration schema.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use gateway_primitives::{RemoteProvider, ToolDescriptor};
use gateway_telemetry::PriceTable;
use serde::{Deserialize, Serialize};

use crate::loader::ConfigError;

/// Startup configuration of the gateway.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GatewayConfig {
    /// Tool catalog.
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
    /// Per-model prices used for cost estimation.
    #[serde(default)]
    pub prices: PriceTable,
    /// Hard wall-clock budget for one dispatch, in milliseconds.
    #[serde(default = "defaults::execution_timeout_ms")]
    pub execution_timeout_ms: u64,
    /// Maximum number of dispatches in flight at once.
    #[serde(default = "defaults::worker_pool_size")]
    pub worker_pool_size: usize,
    /// Tools constructed eagerly at startup.
    #[serde(default)]
    pub preload: Vec<String>,
    /// Capacity of the history hand-off channel.
    #[serde(default = "defaults::history_buffer")]
    pub history_buffer: usize,
    /// How long a failed construction is remembered before it is retried.
    /// Zero retries on the next call.
    #[serde(default)]
    pub construction_cooldown_ms: u64,
    /// Largest question list accepted by one batch.
    #[serde(default = "defaults::max_batch_size")]
    pub max_batch_size: usize,
    /// Base URL overrides for remote providers.
    #[serde(default)]
    pub providers: ProviderEndpoints,
    /// Translation settings for the SQL layout.
    #[serde(default)]
    pub translation: TranslationSettings,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            tools: Vec::new(),
            prices: PriceTable::default(),
            execution_timeout_ms: defaults::execution_timeout_ms(),
            worker_pool_size: defaults::worker_pool_size(),
            preload: Vec::new(),
            history_buffer: defaults::history_buffer(),
            construction_cooldown_ms: 0,
            max_batch_size: defaults::max_batch_size(),
            providers: ProviderEndpoints::default(),
            translation: TranslationSettings::default(),
        }
    }
}

impl GatewayConfig {
    /// Dispatch budget as a [`Duration`].
    #[must_use]
    pub const fn execution_timeout(&self) -> Duration {
        Duration::from_millis(self.execution_timeout_ms)
    }

    /// Construction cooldown as a [`Duration`].
    #[must_use]
    pub const fn construction_cooldown(&self) -> Duration {
        Duration::from_millis(self.construction_cooldown_ms)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a descriptor is malformed, a
    /// display name repeats, tools sharing a backend id disagree on how it is
    /// served, a preload entry names an unknown tool, a price is negative, or
    /// a numeric limit is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.execution_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "executionTimeoutMs must be greater than zero".to_owned(),
            ));
        }
        if self.worker_pool_size == 0 {
            return Err(ConfigError::Invalid(
                "workerPoolSize must be greater than zero".to_owned(),
            ));
        }
        if self.history_buffer == 0 {
            return Err(ConfigError::Invalid(
                "historyBuffer must be greater than zero".to_owned(),
            ));
        }
        if self.max_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "maxBatchSize must be greater than zero".to_owned(),
            ));
        }
        self.validate_tools()?;
        self.validate_prices()?;
        self.providers.validate()?;
        self.translation.validate()
    }

    fn validate_tools(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        let mut backends: HashMap<&str, &ToolDescriptor> = HashMap::new();

        for tool in &self.tools {
            tool.validate()
                .map_err(|err| ConfigError::Invalid(err.to_string()))?;

            if !names.insert(tool.display_name()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate tool name `{}`",
                    tool.display_name()
                )));
            }

            if let Some(previous) = backends.insert(tool.backend_id(), tool) {
                if previous.backend_kind() != tool.backend_kind()
                    || previous.provider() != tool.provider()
                {
                    return Err(ConfigError::Invalid(format!(
                        "tools `{}` and `{}` share backend `{}` but disagree on how it is served",
                        previous.display_name(),
                        tool.display_name(),
                        tool.backend_id()
                    )));
                }
            }
        }

        for name in &self.preload {
            if !names.contains(name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "preload names unknown tool `{name}`"
                )));
            }
        }
        Ok(())
    }

    fn validate_prices(&self) -> Result<(), ConfigError> {
        for tool in &self.tools {
            if let Some(price) = self.prices.get(tool.backend_id()) {
                let valid = |value: f64| value.is_finite() && value >= 0.0;
                if !valid(price.input_per_1k) || !valid(price.output_per_1k) {
                    return Err(ConfigError::Invalid(format!(
                        "price for `{}` must be finite and non-negative",
                        tool.backend_id()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Base URL overrides for remote providers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProviderEndpoints {
    /// `OpenAI`-compatible endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai: Option<String>,
    /// Anthropic endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anthropic: Option<String>,
    /// Ollama daemon.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ollama: Option<String>,
}

impl ProviderEndpoints {
    /// Returns the override configured for `provider`.
    #[must_use]
    pub fn base_url(&self, provider: RemoteProvider) -> Option<&str> {
        match provider {
            RemoteProvider::OpenAi => self.openai.as_deref(),
            RemoteProvider::Anthropic => self.anthropic.as_deref(),
            RemoteProvider::Ollama => self.ollama.as_deref(),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for provider in [
            RemoteProvider::OpenAi,
            RemoteProvider::Anthropic,
            RemoteProvider::Ollama,
        ] {
            if let Some(url) = self.base_url(provider) {
                let url = url.trim();
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(ConfigError::Invalid(format!(
                        "providers.{provider} must start with http:// or https://"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Settings for translating SQL questions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TranslationSettings {
    /// Language questions are translated into.
    #[serde(default = "defaults::pivot_language")]
    pub pivot_language: String,
    /// Translation budget in milliseconds.
    #[serde(default = "defaults::translation_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for TranslationSettings {
    fn default() -> Self {
        Self {
            pivot_language: defaults::pivot_language(),
            timeout_ms: defaults::translation_timeout_ms(),
        }
    }
}

impl TranslationSettings {
    /// Translation budget as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.pivot_language.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "translation.pivotLanguage must not be empty".to_owned(),
            ));
        }
        Ok(())
    }
}

mod defaults {
    pub(super) const fn execution_timeout_ms() -> u64 {
        60_000
    }

    pub(super) const fn worker_pool_size() -> usize {
        4
    }

    pub(super) const fn history_buffer() -> usize {
        256
    }

    pub(super) const fn max_batch_size() -> usize {
        100
    }

    pub(super) fn pivot_language() -> String {
        "en".to_owned()
    }

    pub(super) const fn translation_timeout_ms() -> u64 {
        5_000
    }
}
