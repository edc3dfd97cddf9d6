//! Usage accounting and observability helpers for the gateway.

#![warn(missing_docs, clippy::pedantic)]

pub mod pricing;
pub mod summary;
pub mod tracing_support;

pub use pricing::{ModelPrice, PriceTable, round_usd};
pub use summary::{BatchSummary, CallMetrics};
