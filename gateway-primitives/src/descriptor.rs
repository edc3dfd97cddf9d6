//! Immutable catalog entries.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::{BackendKind, RemoteProvider, TemplateKind};

const MAX_NAME_LEN: usize = 128;

/// Catalog entry mapping a human-facing tool name to its backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    display_name: String,
    backend_kind: BackendKind,
    backend_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    provider: Option<RemoteProvider>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    template: Option<TemplateKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

impl ToolDescriptor {
    /// Starts building a descriptor.
    #[must_use]
    pub fn builder(
        display_name: impl Into<String>,
        backend_kind: BackendKind,
        backend_id: impl Into<String>,
    ) -> ToolDescriptorBuilder {
        ToolDescriptorBuilder {
            display_name: display_name.into(),
            backend_kind,
            backend_id: backend_id.into(),
            provider: None,
            template: None,
            temperature: None,
            max_output_tokens: None,
        }
    }

    /// Checks the invariants a deserialized descriptor must satisfy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDescriptor`] when a name is empty or too long, or
    /// when a provider is attached to an in-process backend.
    pub fn validate(&self) -> Result<()> {
        validate_name("display name", &self.display_name)?;
        validate_name("backend id", &self.backend_id)?;
        if self.provider.is_some() && self.backend_kind.is_local() {
            return Err(Error::invalid_descriptor(format!(
                "tool `{}` is {} and cannot name a remote provider",
                self.display_name, self.backend_kind
            )));
        }
        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(Error::invalid_descriptor(format!(
                    "tool `{}` temperature must be within 0.0..=2.0",
                    self.display_name
                )));
            }
        }
        Ok(())
    }

    /// Human-facing tool name used by callers.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Mechanism backing the tool.
    #[must_use]
    pub const fn backend_kind(&self) -> BackendKind {
        self.backend_kind
    }

    /// Backend identifier; doubles as the canonical model id for pricing.
    #[must_use]
    pub fn backend_id(&self) -> &str {
        &self.backend_id
    }

    /// Remote provider family. Remote tools default to [`RemoteProvider::OpenAi`].
    #[must_use]
    pub fn provider(&self) -> Option<RemoteProvider> {
        match self.backend_kind {
            BackendKind::RemoteApi => Some(self.provider.unwrap_or_default()),
            _ => None,
        }
    }

    /// Explicit template override, if configured.
    #[must_use]
    pub const fn template(&self) -> Option<TemplateKind> {
        self.template
    }

    /// Sampling temperature forwarded to the backend.
    #[must_use]
    pub const fn temperature(&self) -> Option<f32> {
        self.temperature
    }

    /// Output token budget forwarded to the backend.
    #[must_use]
    pub const fn max_output_tokens(&self) -> Option<u32> {
        self.max_output_tokens
    }
}

/// Builder for [`ToolDescriptor`].
#[derive(Debug)]
pub struct ToolDescriptorBuilder {
    display_name: String,
    backend_kind: BackendKind,
    backend_id: String,
    provider: Option<RemoteProvider>,
    template: Option<TemplateKind>,
    temperature: Option<f32>,
    max_output_tokens: Option<u32>,
}

impl ToolDescriptorBuilder {
    /// Names the remote provider family.
    #[must_use]
    pub fn provider(mut self, provider: RemoteProvider) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Forces a template instead of inferring one from the backend id.
    #[must_use]
    pub fn template(mut self, template: TemplateKind) -> Self {
        self.template = Some(template);
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets the output token budget.
    #[must_use]
    pub fn max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    /// Finalises the descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDescriptor`] when [`ToolDescriptor::validate`] fails.
    pub fn build(self) -> Result<ToolDescriptor> {
        let descriptor = ToolDescriptor {
            display_name: self.display_name.trim().to_owned(),
            backend_kind: self.backend_kind,
            backend_id: self.backend_id.trim().to_owned(),
            provider: self.provider,
            template: self.template,
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }
}

fn validate_name(what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::invalid_descriptor(format!("{what} cannot be empty")));
    }
    if value.len() > MAX_NAME_LEN {
        return Err(Error::invalid_descriptor(format!(
            "{what} length must be <= {MAX_NAME_LEN}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_remote_descriptor_with_default_provider() {
        let descriptor = ToolDescriptor::builder("GPT 4o mini", BackendKind::RemoteApi, "gpt-4o-mini")
            .build()
            .unwrap();
        assert_eq!(descriptor.provider(), Some(RemoteProvider::OpenAi));
        assert_eq!(descriptor.backend_id(), "gpt-4o-mini");
    }

    #[test]
    fn local_descriptor_has_no_provider() {
        let descriptor = ToolDescriptor::builder("Sentiment", BackendKind::LocalClassifier, "bert-sst2")
            .build()
            .unwrap();
        assert_eq!(descriptor.provider(), None);
    }

    #[test]
    fn rejects_empty_names() {
        let err = ToolDescriptor::builder("  ", BackendKind::LocalLlm, "llama")
            .build()
            .expect_err("empty display name");
        assert!(matches!(err, Error::InvalidDescriptor { .. }));
    }

    #[test]
    fn rejects_provider_on_local_backend() {
        let err = ToolDescriptor::builder("Llama", BackendKind::LocalLlm, "llama-3-8b")
            .provider(RemoteProvider::Ollama)
            .build()
            .expect_err("provider on local backend");
        assert!(err.to_string().contains("cannot name a remote provider"));
    }

    #[test]
    fn deserializes_camel_case() {
        let json = r#"{
            "displayName": "Claude Haiku",
            "backendKind": "remote_api",
            "backendId": "claude-3-haiku-20240307",
            "provider": "anthropic",
            "maxOutputTokens": 512
        }"#;
        let descriptor: ToolDescriptor = serde_json::from_str(json).unwrap();
        descriptor.validate().unwrap();
        assert_eq!(descriptor.provider(), Some(RemoteProvider::Anthropic));
        assert_eq!(descriptor.max_output_tokens(), Some(512));
    }
}
