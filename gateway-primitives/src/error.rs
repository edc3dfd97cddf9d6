//! Shared error definitions for gateway primitive types.

use thiserror::Error;
use uuid::Error as UuidError;

/// Result alias used throughout the gateway primitives.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while manipulating gateway primitive types.
#[derive(Debug, Error)]
pub enum Error {
    /// The provided request identifier could not be parsed.
    #[error("invalid request id: {source}")]
    InvalidRequestId {
        /// Source parsing error from the UUID library.
        #[from]
        source: UuidError,
    },

    /// A tag string did not name a known variant.
    #[error("unknown {what} `{value}`")]
    UnknownTag {
        /// Which tag family was being parsed (e.g. "backend kind").
        what: &'static str,
        /// The offending string.
        value: String,
    },

    /// Tool descriptor failed validation.
    #[error("invalid tool descriptor: {reason}")]
    InvalidDescriptor {
        /// Human-readable reason for rejection.
        reason: String,
    },
}

impl Error {
    pub(crate) fn invalid_descriptor(reason: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            reason: reason.into(),
        }
    }
}
