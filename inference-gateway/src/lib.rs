//! In-process inference dispatch gateway.
//!
//! Bundles the gateway crates behind feature flags. With default features,
//! [`kernel::ExecutionGateway`] is the entry point: build it from a
//! [`config::GatewayConfig`] and a [`kernel::BackendFactory`], then call
//! `execute` or `execute_batch`.

#![warn(missing_docs, clippy::pedantic)]

/// Shared catalog types and identifiers.
pub use gateway_primitives as primitives;

/// Tool registry, execution gateway, and batch coordinator (enabled by `kernel` feature).
#[cfg(feature = "kernel")]
pub use gateway_kernel as kernel;

/// Backend adapters (enabled by `adapters` feature).
#[cfg(feature = "adapters")]
pub use gateway_adapters as adapters;

/// Prompt layouts and translation (enabled by `prompts` feature).
#[cfg(feature = "prompts")]
pub use gateway_prompts as prompts;

/// Pricing, batch summaries, and tracing setup (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use gateway_telemetry as telemetry;

/// Configuration loading and credentials (enabled by `config` feature).
#[cfg(feature = "config")]
pub use gateway_config as config;
