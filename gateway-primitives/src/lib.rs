//! Core shared types for the inference gateway.

#![warn(missing_docs, clippy::pedantic)]

mod descriptor;
mod error;
mod ids;
mod kind;

/// Immutable catalog entries describing a tool and its backend.
pub use descriptor::{ToolDescriptor, ToolDescriptorBuilder};
/// Error type and result alias shared across the gateway crates.
pub use error::{Error, Result};
/// Correlation identifier assigned to every gateway request.
pub use ids::RequestId;
/// Backend, provider, and template tags decided at catalog-load time.
pub use kind::{BackendKind, RemoteProvider, TemplateKind};
