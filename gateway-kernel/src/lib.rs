//! Dispatch core of the inference gateway.
//!
//! [`ToolRegistry`] owns the catalog and constructs backend adapters lazily,
//! once per backend id. [`ExecutionGateway`] takes one request through
//! validation, resolution, prompt rendering, a deadline-bounded dispatch on the
//! [`DispatchPool`], and scoring, and always answers with an
//! [`ExecutionRecord`]. Finished records are handed to a [`HistorySink`]
//! without blocking the caller.

#![warn(missing_docs, clippy::pedantic)]

mod batch;
mod error;
mod factory;
mod gateway;
mod history;
mod pool;
mod record;
mod registry;
mod stage;

#[cfg(test)]
mod testing;

pub use batch::{BatchMode, BatchOutcome, BatchRequest};
pub use error::{ErrorKind, GatewayError};
pub use factory::{BackendFactory, DefaultBackendFactory, LocalModelLoader};
pub use gateway::{
    BuildError, DEFAULT_EXECUTION_TIMEOUT, DEFAULT_MAX_BATCH_SIZE, ExecutionGateway,
    ExecutionGatewayBuilder,
};
pub use history::{
    CollectingHistorySink, FileHistorySink, HistoryDispatcher, HistoryError, HistorySink,
    TracingHistorySink,
};
pub use pool::{DEFAULT_POOL_SIZE, DispatchPool, PoolConfig, PoolError, PoolResult};
pub use record::{ExecutionMeta, ExecutionRecord, ExecutionRequest};
pub use registry::{
    PreloadReport, RegistryError, RegistryResult, ResolvedTool, SlotStatus, ToolRegistry,
    ToolStatus,
};
pub use stage::{ExecutionStage, StageError, StageResult, StageTracker};

/// Milliseconds elapsed since `started`, saturating.
pub(crate) fn elapsed_ms(started: tokio::time::Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
