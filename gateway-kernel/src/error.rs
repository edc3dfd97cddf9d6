//! Error taxonomy surfaced by the execution gateway.

use std::fmt;
use std::time::Duration;

use gateway_adapters::traits::AdapterError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pool::PoolError;
use crate::registry::RegistryError;
use crate::stage::StageError;

/// Failure of one gateway request.
///
/// These never escape [`ExecutionGateway::execute`](crate::ExecutionGateway::execute);
/// they are rendered into the `error` field of the returned record.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// The request was malformed and never reached a backend.
    #[error("invalid input: {field} {reason}")]
    InvalidInput {
        /// Name of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// The tool name is not in the catalog.
    #[error("tool `{name}` not found")]
    ToolNotFound {
        /// Requested tool name.
        name: String,
    },

    /// The backend could not be constructed; a later call may succeed.
    #[error("backend for tool `{tool}` unavailable: {reason}")]
    BackendUnavailable {
        /// Requested tool name.
        tool: String,
        /// Construction failure.
        reason: String,
    },

    /// The dispatch did not finish within the execution budget.
    #[error("execution timed out after {}ms", after.as_millis())]
    Timeout {
        /// Budget that elapsed.
        after: Duration,
    },

    /// Connection-level failure talking to a remote provider.
    #[error("transport error: {reason}")]
    Transport {
        /// Failure detail.
        reason: String,
    },

    /// The provider or model rejected the call.
    #[error("provider error: {reason}")]
    Provider {
        /// Failure detail.
        reason: String,
    },

    /// Unexpected failure inside the gateway itself.
    #[error("internal error: {reason}")]
    Internal {
        /// Failure detail.
        reason: String,
    },
}

impl GatewayError {
    /// Convenience constructor for invalid input.
    #[must_use]
    pub fn invalid_input(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            reason: reason.into(),
        }
    }

    /// Convenience constructor for internal errors.
    #[must_use]
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Returns the machine-readable category.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::ToolNotFound { .. } => ErrorKind::ToolNotFound,
            Self::BackendUnavailable { .. } => ErrorKind::BackendUnavailable,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Transport { .. } => ErrorKind::TransportError,
            Self::Provider { .. } => ErrorKind::ProviderError,
            Self::Internal { .. } => ErrorKind::InternalError,
        }
    }
}

impl From<RegistryError> for GatewayError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::ToolNotFound { name } => Self::ToolNotFound { name },
            RegistryError::BackendUnavailable { tool, reason } => {
                Self::BackendUnavailable { tool, reason }
            }
            RegistryError::InvalidCatalog { reason } => Self::Internal { reason },
        }
    }
}

impl From<PoolError> for GatewayError {
    fn from(err: PoolError) -> Self {
        Self::internal(err.to_string())
    }
}

impl From<StageError> for GatewayError {
    fn from(err: StageError) -> Self {
        Self::internal(err.to_string())
    }
}

/// Category of a [`GatewayError`], stored on failed records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`GatewayError::InvalidInput`].
    InvalidInput,
    /// See [`GatewayError::ToolNotFound`].
    ToolNotFound,
    /// See [`GatewayError::BackendUnavailable`].
    BackendUnavailable,
    /// See [`GatewayError::Timeout`].
    Timeout,
    /// See [`GatewayError::Transport`].
    TransportError,
    /// See [`GatewayError::Provider`].
    ProviderError,
    /// See [`GatewayError::Internal`].
    InternalError,
}

impl ErrorKind {
    /// Stable snake-case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::ToolNotFound => "tool_not_found",
            Self::BackendUnavailable => "backend_unavailable",
            Self::Timeout => "timeout",
            Self::TransportError => "transport_error",
            Self::ProviderError => "provider_error",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Translates an adapter failure into the gateway taxonomy.
///
/// An adapter timeout keeps the budget the adapter actually ran under, which
/// may be shorter than the gateway's when the adapter caps its own calls.
pub(crate) fn map_adapter_error(err: AdapterError) -> GatewayError {
    match err {
        AdapterError::Timeout { budget } => GatewayError::Timeout { after: budget },
        AdapterError::Transport { reason } => GatewayError::Transport { reason },
        AdapterError::Configuration { reason } => GatewayError::Provider {
            reason: format!("backend misconfigured: {reason}"),
        },
        AdapterError::RateLimited { retry_after } => GatewayError::Provider {
            reason: match retry_after {
                Some(delay) => format!("rate limited, retry after {}s", delay.as_secs()),
                None => "rate limited".to_owned(),
            },
        },
        AdapterError::InvalidRequest { reason }
        | AdapterError::Response { reason }
        | AdapterError::Execution { reason } => GatewayError::Provider { reason },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_input_names_the_field() {
        let err = GatewayError::invalid_input("userQuestion", "must not be empty");
        assert_eq!(err.to_string(), "invalid input: userQuestion must not be empty");
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn adapter_errors_map_into_taxonomy() {
        assert_eq!(
            map_adapter_error(AdapterError::Timeout {
                budget: Duration::from_secs(1)
            }),
            GatewayError::Timeout {
                after: Duration::from_secs(1)
            }
        );
        assert_eq!(
            map_adapter_error(AdapterError::transport("dns")).kind(),
            ErrorKind::TransportError
        );
        assert_eq!(
            map_adapter_error(AdapterError::RateLimited { retry_after: None }).kind(),
            ErrorKind::ProviderError
        );
        assert_eq!(
            map_adapter_error(AdapterError::execution("oom")).kind(),
            ErrorKind::ProviderError
        );
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::BackendUnavailable).unwrap();
        assert_eq!(json, "\"backend_unavailable\"");
    }
}
