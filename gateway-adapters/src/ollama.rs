//! `Ollama` adapter implementation.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use gateway_primitives::BackendKind;
use hyper::header::CONTENT_TYPE;
use hyper::{Body, Request, Uri};
use serde::{Deserialize, Serialize};

use crate::http_client::{HyperClient, build_https_client, exchange, sanitize_base_url};
use crate::traits::{
    AdapterError, AdapterMetadata, AdapterResult, BackendAdapter, Deadline, InvokeOutput,
    InvokeParams,
};

/// Configuration for the `Ollama` adapter.
#[derive(Clone, Debug)]
pub struct OllamaConfig {
    base_url: String,
    model: String,
    default_temperature: Option<f32>,
    timeout: Duration,
}

impl OllamaConfig {
    /// Creates a configuration for the supplied model using default settings.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            base_url: "http://127.0.0.1:11434/".to_owned(),
            model: model.into(),
            default_temperature: None,
            timeout: Duration::from_secs(60),
        }
    }

    /// Overrides the base URL of the Ollama daemon.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the supplied URL is invalid.
    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> AdapterResult<Self> {
        self.base_url = sanitize_base_url(base_url.as_ref(), "Ollama")?;
        Ok(self)
    }

    /// Sets the default sampling temperature used when the call does not
    /// provide one explicitly.
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
}

/// `Ollama` adapter that calls the daemon's chat endpoint.
pub struct OllamaAdapter {
    client: HyperClient,
    endpoint: Uri,
    metadata: AdapterMetadata,
    timeout: Duration,
    default_temperature: Option<f32>,
}

impl fmt::Debug for OllamaAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OllamaAdapter")
            .field("model", &self.metadata.model())
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl OllamaAdapter {
    /// Constructs a new adapter from the supplied configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the endpoint is invalid or the HTTP
    /// client cannot be constructed.
    pub fn new(config: OllamaConfig) -> AdapterResult<Self> {
        let endpoint = format!("{}api/chat", config.base_url)
            .parse::<Uri>()
            .map_err(|err| {
                AdapterError::configuration(format!("invalid Ollama endpoint: {err}"))
            })?;

        let client = build_https_client()?;
        let metadata = AdapterMetadata::new(BackendKind::RemoteApi, "ollama", config.model);

        Ok(Self {
            client,
            endpoint,
            metadata,
            timeout: config.timeout,
            default_temperature: config.default_temperature,
        })
    }

    fn build_request(&self, prompt: &str, params: &InvokeParams) -> ChatRequest {
        let temperature = params.temperature().or(self.default_temperature);
        let options = if temperature.is_some() || params.max_output_tokens().is_some() {
            Some(ChatOptions {
                temperature,
                max_output_tokens: params.max_output_tokens(),
            })
        } else {
            None
        };

        ChatRequest {
            model: self.metadata.model().to_owned(),
            stream: false,
            messages: vec![ChatMessage {
                role: "user".to_owned(),
                content: prompt.to_owned(),
            }],
            options,
        }
    }
}

#[async_trait]
impl BackendAdapter for OllamaAdapter {
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
            AdapterError::invalid_request(format!("failed to encode Ollama request: {err}"))
        })?;

        let req = Request::post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .map_err(|err| {
                AdapterError::transport(format!("failed to build Ollama request: {err}"))
            })?;

        let budget = deadline.remaining().min(self.timeout);
        let bytes = exchange(&self.client, req, budget, "Ollama").await?;

        let response: ChatResponse = serde_json::from_slice(&bytes).map_err(|err| {
            AdapterError::response(format!("failed to decode Ollama response: {err}"))
        })?;

        response.into_output()
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    stream: bool,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ChatOptions>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "num_predict")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ChatMessage>,
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

impl ChatResponse {
    fn into_output(self) -> AdapterResult<InvokeOutput> {
        if let Some(error) = self.error {
            return Err(AdapterError::response(error));
        }

        let text = self
            .message
            .map(|message| message.content)
            .or(self.response)
            .unwrap_or_default();

        Ok(InvokeOutput {
            text,
            prompt_tokens: self.prompt_eval_count,
            completion_tokens: self.eval_count,
        })
    }
}
