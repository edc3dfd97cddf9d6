//! Shared backend adapter trait and data structures.

use std::time::Duration;

use async_trait::async_trait;
use gateway_primitives::BackendKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;

/// Result alias used by backend adapters.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Error type shared by adapter implementations.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Adapter is misconfigured or missing credentials.
    #[error("adapter not configured: {reason}")]
    Configuration {
        /// Additional context for the failure.
        reason: String,
    },

    /// The supplied request was invalid for the target model.
    #[error("invalid inference request: {reason}")]
    InvalidRequest {
        /// Reason describing why the request could not be processed.
        reason: String,
    },

    /// Transport-level failures (connection, DNS, protocol).
    #[error("adapter transport error: {reason}")]
    Transport {
        /// Additional context about the error.
        reason: String,
    },

    /// The call did not complete within its budget.
    #[error("adapter deadline exceeded after {budget:?}")]
    Timeout {
        /// Budget that was available when the call was issued.
        budget: Duration,
    },

    /// The provider rejected the request due to rate limiting.
    #[error("adapter rate limited (retry after {retry_after:?})")]
    RateLimited {
        /// Suggested delay before retrying.
        retry_after: Option<Duration>,
    },

    /// The provider answered with a non-success status or a malformed body.
    #[error("adapter response error: {reason}")]
    Response {
        /// Additional context about the response failure.
        reason: String,
    },

    /// An in-process model failed while computing its output.
    #[error("local execution failed: {reason}")]
    Execution {
        /// Reason reported by the model.
        reason: String,
    },
}

impl AdapterError {
    /// Convenience constructor for invalid requests.
    #[must_use]
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for configuration issues.
    #[must_use]
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for transport failures.
    #[must_use]
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for provider response failures.
    #[must_use]
    pub fn response(reason: impl Into<String>) -> Self {
        Self::Response {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for local model failures.
    #[must_use]
    pub fn execution(reason: impl Into<String>) -> Self {
        Self::Execution {
            reason: reason.into(),
        }
    }
}

/// Absolute point in time by which a dispatch must complete.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline(Instant);

impl Deadline {
    /// Deadline `budget` from now.
    #[must_use]
    pub fn after(budget: Duration) -> Self {
        Self(Instant::now() + budget)
    }

    /// Deadline at the supplied instant.
    #[must_use]
    pub const fn at(instant: Instant) -> Self {
        Self(instant)
    }

    /// Returns the underlying instant.
    #[must_use]
    pub const fn instant(self) -> Instant {
        self.0
    }

    /// Time left before the deadline; zero once it has passed.
    #[must_use]
    pub fn remaining(self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    /// Returns `true` once the deadline has passed.
    #[must_use]
    pub fn is_expired(self) -> bool {
        self.remaining().is_zero()
    }
}

/// Minimal metadata describing an adapter instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdapterMetadata {
    kind: BackendKind,
    provider: &'static str,
    model: String,
}

impl AdapterMetadata {
    /// Creates metadata for the supplied provider and model identifier.
    #[must_use]
    pub fn new(kind: BackendKind, provider: &'static str, model: impl Into<String>) -> Self {
        Self {
            kind,
            provider,
            model: model.into(),
        }
    }

    /// Returns the backend kind served by the adapter.
    #[must_use]
    pub const fn kind(&self) -> BackendKind {
        self.kind
    }

    /// Returns the provider identifier (e.g., "openai", "local").
    #[must_use]
    pub const fn provider(&self) -> &'static str {
        self.provider
    }

    /// Returns the configured model name.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

/// Per-call knobs forwarded to the backend.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InvokeParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

impl InvokeParams {
    /// Creates empty parameters; adapters apply their own defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            temperature: None,
            max_output_tokens: None,
        }
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub const fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the output token budget.
    #[must_use]
    pub const fn with_max_output_tokens(mut self, tokens: Option<u32>) -> Self {
        self.max_output_tokens = tokens;
        self
    }

    /// Returns the configured sampling temperature.
    #[must_use]
    pub const fn temperature(&self) -> Option<f32> {
        self.temperature
    }

    /// Returns the configured maximum output tokens.
    #[must_use]
    pub const fn max_output_tokens(&self) -> Option<u32> {
        self.max_output_tokens
    }
}

/// Text produced by a backend plus whatever usage it reported.
///
/// Token counts stay `None` when the mechanism does not report them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeOutput {
    /// Generated text.
    pub text: String,
    /// Prompt tokens consumed, if reported.
    pub prompt_tokens: Option<u32>,
    /// Completion tokens produced, if reported.
    pub completion_tokens: Option<u32>,
}

impl InvokeOutput {
    /// Output without usage information.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            prompt_tokens: None,
            completion_tokens: None,
        }
    }

    /// Attaches token usage.
    #[must_use]
    pub const fn with_usage(mut self, prompt_tokens: u32, completion_tokens: u32) -> Self {
        self.prompt_tokens = Some(prompt_tokens);
        self.completion_tokens = Some(completion_tokens);
        self
    }
}

/// Capability implemented by every backend.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    /// Returns basic metadata describing the adapter instance.
    fn metadata(&self) -> &AdapterMetadata;

    /// Runs the rendered prompt through the backend.
    ///
    /// Implementations that can bound their own I/O must do so with
    /// `deadline`; callers still race the returned future against it.
    async fn invoke(
        &self,
        prompt: &str,
        params: &InvokeParams,
        deadline: Deadline,
    ) -> AdapterResult<InvokeOutput>;
}
