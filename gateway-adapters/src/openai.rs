//! `OpenAI`-compatible chat completions adapter.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use gateway_primitives::BackendKind;
use hyper::header::{AUTHORIZATION, CONTENT_TYPE};
use hyper::{Body, Request, Uri};
use serde::{Deserialize, Serialize};

use crate::http_client::{HyperClient, build_https_client, exchange, sanitize_base_url};
use crate::traits::{
    AdapterError, AdapterMetadata, AdapterResult, BackendAdapter, Deadline, InvokeOutput,
    InvokeParams,
};

/// Configuration for the `OpenAI` adapter.
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    api_key: Option<String>,
    model: String,
    base_url: String,
    timeout: Duration,
    default_temperature: Option<f32>,
}

impl OpenAiConfig {
    /// Creates a configuration using the supplied model identifier.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            api_key: None,
            model: model.into(),
            base_url: "https://api.openai.com/".to_owned(),
            timeout: Duration::from_secs(60),
            default_temperature: None,
        }
    }

    /// Overrides the base URL used for API calls.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the supplied URL is invalid.
    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> AdapterResult<Self> {
        self.base_url = sanitize_base_url(base_url.as_ref(), "OpenAI")?;
        Ok(self)
    }

    /// Sets the default sampling temperature used when calls omit it.
    #[must_use]
    pub fn with_default_temperature(mut self, temperature: f32) -> Self {
        self.default_temperature = Some(temperature);
        self
    }

    /// Caps the HTTP exchange regardless of the caller's deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Supplies an explicit API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

/// Adapter that calls the `OpenAI` chat completions API over HTTPS.
pub struct OpenAiAdapter {
    client: HyperClient,
    endpoint: Uri,
    metadata: AdapterMetadata,
    api_key: String,
    timeout: Duration,
    default_temperature: Option<f32>,
}

impl fmt::Debug for OpenAiAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiAdapter")
            .field("model", &self.metadata.model())
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl OpenAiAdapter {
    /// Constructs a new adapter with the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the API key is missing or the
    /// endpoint cannot be parsed.
    pub fn new(config: OpenAiConfig) -> AdapterResult<Self> {
        let api_key = config
            .api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| AdapterError::configuration("OpenAI adapter requires an API key"))?;

        let metadata = AdapterMetadata::new(BackendKind::RemoteApi, "openai", config.model);
        let endpoint = format!("{}v1/chat/completions", config.base_url)
            .parse::<Uri>()
            .map_err(|err| {
                AdapterError::configuration(format!("invalid OpenAI endpoint: {err}"))
            })?;

        let client = build_https_client()?;

        Ok(Self {
            client,
            endpoint,
            metadata,
            api_key,
            timeout: config.timeout,
            default_temperature: config.default_temperature,
        })
    }

    fn build_request(&self, prompt: &str, params: &InvokeParams) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.metadata.model().to_owned(),
            messages: vec![OpenAiMessage {
                role: "user".to_owned(),
                content: prompt.to_owned(),
            }],
            temperature: params.temperature().or(self.default_temperature),
            max_tokens: params.max_output_tokens(),
            stream: false,
        }
    }
}

#[async_trait]
impl BackendAdapter for OpenAiAdapter {
    fn metadata(&self) -> &AdapterMetadata {
        &self.metadata
    }

    async fn invoke(
        &self,
        prompt: &str,
        params: &InvokeParams,
        deadline: Deadline,
    ) -> AdapterResult<InvokeOutput> {
        let payload = self.build_request(prompt, params);
        let body = serde_json::to_vec(&payload).map_err(|err| {
            AdapterError::invalid_request(format!("failed to encode OpenAI request: {err}"))
        })?;

        let request = Request::post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .body(Body::from(body))
            .map_err(|err| {
                AdapterError::transport(format!("failed to build OpenAI request: {err}"))
            })?;

        let budget = deadline.remaining().min(self.timeout);
        let bytes = exchange(&self.client, request, budget, "OpenAI").await?;

        let response: ChatCompletionResponse = serde_json::from_slice(&bytes).map_err(|err| {
            AdapterError::response(format!("failed to decode OpenAI response: {err}"))
        })?;

        Ok(response.into_output())
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<CompletionUsage>,
}

impl ChatCompletionResponse {
    fn into_output(self) -> InvokeOutput {
        let text = self
            .choices
            .into_iter()
            .find_map(|choice| choice.message.and_then(|message| message.content))
            .unwrap_or_default();

        let mut output = InvokeOutput::text(text);
        if let Some(usage) = self.usage {
            output.prompt_tokens = usage.prompt_tokens;
            output.completion_tokens = usage.completion_tokens;
        }
        output
    }
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionUsage {
    #[serde(default)]
    prompt_tokens: Option<u32>,
    #[serde(default)]
    completion_tokens: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_requires_scheme() {
        let err = OpenAiConfig::new("gpt-4o-mini")
            .with_base_url("api.openai.com")
            .expect_err("missing scheme should error");

        assert!(matches!(err, AdapterError::Configuration { .. }));
    }

    #[test]
    fn missing_key_is_configuration_error() {
        let err = OpenAiAdapter::new(OpenAiConfig::new("gpt-4o-mini")).expect_err("no key");
        assert!(matches!(err, AdapterError::Configuration { .. }));

        let err = OpenAiAdapter::new(OpenAiConfig::new("gpt-4o-mini").with_api_key("  "))
            .expect_err("blank key");
        assert!(matches!(err, AdapterError::Configuration { .. }));
    }

    #[test]
    fn response_parsing_extracts_content_and_usage() {
        let json = r#"{
            "choices": [
                { "message": { "content": "hi" } }
            ],
            "usage": { "prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15 }
        }"#;

        let parsed: ChatCompletionResponse = serde_json::from_str(json).unwrap();
        let output = parsed.into_output();
        assert_eq!(output.text, "hi");
        assert_eq!(output.prompt_tokens, Some(12));
        assert_eq!(output.completion_tokens, Some(3));
    }

    #[test]
    fn missing_usage_stays_unknown() {
        let json = r#"{ "choices": [ { "message": { "content": "hi" } } ] }"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(json).unwrap();
        let output = parsed.into_output();
        assert_eq!(output.prompt_tokens, None);
        assert_eq!(output.completion_tokens, None);
    }

    #[test]
    fn build_request_uses_defaults() {
        let config = OpenAiConfig::new("gpt-4o-mini")
            .with_default_temperature(0.2)
            .with_api_key("test_key");
        let adapter = OpenAiAdapter::new(config).expect("adapter");

        let chat = adapter.build_request("hello", &InvokeParams::new());
        assert_eq!(chat.model, "gpt-4o-mini");
        assert_eq!(chat.messages.len(), 1);
        assert_eq!(chat.messages[0].role, "user");
        assert_eq!(chat.temperature, Some(0.2));

        let chat = adapter.build_request(
            "hello",
            &InvokeParams::new()
                .with_temperature(Some(0.9))
                .with_max_output_tokens(Some(64)),
        );
        assert_eq!(chat.temperature, Some(0.9));
        assert_eq!(chat.max_tokens, Some(64));
    }
}
