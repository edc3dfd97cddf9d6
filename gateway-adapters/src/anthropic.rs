//! Anthropic messages API adapter.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use gateway_primitives::BackendKind;
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::{Body, Request, Uri};
use serde::{Deserialize, Serialize};

use crate::http_client::{HyperClient, build_https_client, exchange, sanitize_base_url};
use crate::traits::{
    AdapterError, AdapterMetadata, AdapterResult, BackendAdapter, Deadline, InvokeOutput,
    InvokeParams,
};

/// Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Configuration for the Anthropic adapter.
#[derive(Clone, Debug)]
pub struct AnthropicConfig {
    api_key: Option<String>,
    model: String,
    base_url: String,
    timeout: Duration,
    default_temperature: Option<f32>,
    default_max_tokens: u32,
}

impl AnthropicConfig {
    /// Creates a configuration using the supplied model identifier.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            api_key: None,
            model: model.into(),
            base_url: "https://api.anthropic.com/".to_owned(),
            timeout: Duration::from_secs(60),
            default_temperature: None,
            default_max_tokens: 1024,
        }
    }

    /// Overrides the base URL used for API calls.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the supplied URL is invalid.
    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> AdapterResult<Self> {
        self.base_url = sanitize_base_url(base_url.as_ref(), "Anthropic")?;
        Ok(self)
    }

    /// Sets the default sampling temperature used when calls omit it.
    #[must_use]
    pub fn with_default_temperature(mut self, temperature: f32) -> Self {
        self.default_temperature = Some(temperature);
        self
    }

    /// Sets the default max tokens; the messages API requires one.
    #[must_use]
    pub fn with_default_max_tokens(mut self, max_tokens: u32) -> Self {
        self.default_max_tokens = max_tokens;
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

/// Adapter that calls the Anthropic messages API over HTTPS.
pub struct AnthropicAdapter {
    client: HyperClient,
    endpoint: Uri,
    metadata: AdapterMetadata,
    api_key: String,
    timeout: Duration,
    default_temperature: Option<f32>,
    default_max_tokens: u32,
}

impl fmt::Debug for AnthropicAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnthropicAdapter")
            .field("model", &self.metadata.model())
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl AnthropicAdapter {
    /// Constructs a new adapter with the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the API key is missing or the
    /// endpoint cannot be parsed.
    pub fn new(config: AnthropicConfig) -> AdapterResult<Self> {
        let api_key = config
            .api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| AdapterError::configuration("Anthropic adapter requires an API key"))?;

        let metadata = AdapterMetadata::new(BackendKind::RemoteApi, "anthropic", config.model);
        let endpoint = format!("{}v1/messages", config.base_url)
            .parse::<Uri>()
            .map_err(|err| {
                AdapterError::configuration(format!("invalid Anthropic endpoint: {err}"))
            })?;

        let client = build_https_client()?;

        Ok(Self {
            client,
            endpoint,
            metadata,
            api_key,
            timeout: config.timeout,
            default_temperature: config.default_temperature,
            default_max_tokens: config.default_max_tokens,
        })
    }

    fn build_request(&self, prompt: &str, params: &InvokeParams) -> MessagesRequest {
        MessagesRequest {
            model: self.metadata.model().to_owned(),
            messages: vec![AnthropicMessage {
                role: "user".to_owned(),
                content: prompt.to_owned(),
            }],
            max_tokens: params.max_output_tokens().unwrap_or(self.default_max_tokens),
            temperature: params.temperature().or(self.default_temperature),
            stream: false,
        }
    }
}

#[async_trait]
impl BackendAdapter for AnthropicAdapter {
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
            AdapterError::invalid_request(format!("failed to encode Anthropic request: {err}"))
        })?;

        let request = Request::post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .header("x-api-key", &self.api_key)
            .header(
                "anthropic-version",
                HeaderValue::from_static(ANTHROPIC_VERSION),
            )
            .body(Body::from(body))
            .map_err(|err| {
                AdapterError::transport(format!("failed to build Anthropic request: {err}"))
            })?;

        let budget = deadline.remaining().min(self.timeout);
        let bytes = exchange(&self.client, request, budget, "Anthropic").await?;

        let response: MessagesResponse = serde_json::from_slice(&bytes).map_err(|err| {
            AdapterError::response(format!("failed to decode Anthropic response: {err}"))
        })?;

        Ok(response.into_output())
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<MessagesUsage>,
}

impl MessagesResponse {
    fn into_output(self) -> InvokeOutput {
        let text = self
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        let mut output = InvokeOutput::text(text);
        if let Some(usage) = self.usage {
            output.prompt_tokens = usage.input_tokens;
            output.completion_tokens = usage.output_tokens;
        }
        output
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessagesUsage {
    #[serde(default)]
    input_tokens: Option<u32>,
    #[serde(default)]
    output_tokens: Option<u32>,
}
