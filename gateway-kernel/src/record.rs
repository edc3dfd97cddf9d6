//! Request and record value types exchanged with gateway callers.

use gateway_primitives::{BackendKind, RequestId};
use gateway_telemetry::CallMetrics;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, GatewayError};

/// One question to route to a catalog tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    /// Display name of the catalog tool.
    pub tool_name: String,
    /// Instructions placed ahead of the data.
    pub system_prompt: String,
    /// Data the question is about.
    pub data_context: String,
    /// The question itself.
    pub user_question: String,
    /// Dataset the context was drawn from.
    pub dataset_id: String,
    /// Caller identity, carried into history.
    pub user_id: String,
}

impl ExecutionRequest {
    /// Checks that every field is non-empty after trimming.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidInput`] naming the first empty field.
    pub fn validate(&self) -> Result<(), GatewayError> {
        let fields = [
            ("toolName", &self.tool_name),
            ("systemPrompt", &self.system_prompt),
            ("dataContext", &self.data_context),
            ("userQuestion", &self.user_question),
            ("datasetId", &self.dataset_id),
            ("userId", &self.user_id),
        ];
        match fields.iter().find(|(_, value)| value.trim().is_empty()) {
            Some(&(field, _)) => Err(GatewayError::invalid_input(field, "must not be empty")),
            None => Ok(()),
        }
    }
}

/// Telemetry attached to every record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMeta {
    /// Correlation id assigned at entry.
    pub request_id: RequestId,
    /// Wall-clock time from entry to record assembly.
    pub latency_ms: u64,
    /// Backend id, once the tool was resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    /// Backend kind, once the tool was resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_kind: Option<BackendKind>,
    /// Prompt tokens, when the backend reported them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u32>,
    /// Completion tokens, when the backend reported them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u32>,
    /// Cost, when both token counts and a price are known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_cost_usd: Option<f64>,
}

impl ExecutionMeta {
    pub(crate) const fn new(request_id: RequestId) -> Self {
        Self {
            request_id,
            latency_ms: 0,
            model_id: None,
            backend_kind: None,
            prompt_tokens: None,
            completion_tokens: None,
            estimated_cost_usd: None,
        }
    }
}

/// Result of one request. Exactly one of `response` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    /// Whether the backend produced a response.
    pub success: bool,
    /// Backend output on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// Human-readable failure on error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Failure category on error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Tool named by the request.
    pub tool_name: String,
    /// Dataset named by the request.
    pub dataset_id: String,
    /// Caller named by the request.
    pub user_id: String,
    /// Telemetry.
    pub meta: ExecutionMeta,
}

impl ExecutionRecord {
    pub(crate) fn succeeded(
        request: &ExecutionRequest,
        response: String,
        meta: ExecutionMeta,
    ) -> Self {
        Self {
            success: true,
            response: Some(response),
            error: None,
            error_kind: None,
            tool_name: request.tool_name.clone(),
            dataset_id: request.dataset_id.clone(),
            user_id: request.user_id.clone(),
            meta,
        }
    }

    pub(crate) fn failed(
        request: &ExecutionRequest,
        error: &GatewayError,
        meta: ExecutionMeta,
    ) -> Self {
        Self {
            success: false,
            response: None,
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
            tool_name: request.tool_name.clone(),
            dataset_id: request.dataset_id.clone(),
            user_id: request.user_id.clone(),
            meta,
        }
    }

    /// Metrics view used for batch aggregation.
    #[must_use]
    pub const fn metrics(&self) -> CallMetrics {
        CallMetrics {
            success: self.success,
            latency_ms: self.meta.latency_ms,
            prompt_tokens: self.meta.prompt_tokens,
            completion_tokens: self.meta.completion_tokens,
            estimated_cost_usd: self.meta.estimated_cost_usd,
        }
    }
}
