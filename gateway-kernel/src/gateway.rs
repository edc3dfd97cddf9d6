//! Execution gateway: one request from validation to record.

use std::any::Any;
use std::fmt;
use std::num::NonZeroUsize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use gateway_adapters::traits::Deadline;
use gateway_config::{ConfigError, GatewayConfig};
use gateway_primitives::RequestId;
use gateway_prompts::{PromptEngine, PromptParts, Translator};
use gateway_telemetry::PriceTable;
use thiserror::Error;
use tokio::time::{Instant, timeout_at};
use tracing::{Instrument, info, info_span, warn};

use crate::elapsed_ms;
use crate::error::{GatewayError, map_adapter_error};
use crate::factory::BackendFactory;
use crate::history::{HistoryDispatcher, HistorySink};
use crate::pool::{DispatchPool, PoolConfig};
use crate::record::{ExecutionMeta, ExecutionRecord, ExecutionRequest};
use crate::registry::{PreloadReport, RegistryError, ToolRegistry};
use crate::stage::{ExecutionStage, StageTracker};

/// Budget applied to a dispatch when none is configured.
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Largest batch accepted when none is configured.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

const DEFAULT_HISTORY_BUFFER: usize = 256;

/// Failure assembling a gateway from configuration.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The configuration did not validate.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The tool catalog was rejected by the registry.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Routes requests to catalog tools.
///
/// `execute` never returns an error: every outcome, including invalid input
/// and timeouts, is an [`ExecutionRecord`]. The gateway holds no per-request
/// state and can be shared behind an [`Arc`].
pub struct ExecutionGateway {
    registry: Arc<ToolRegistry>,
    prompts: PromptEngine,
    prices: PriceTable,
    pool: DispatchPool,
    timeout: Duration,
    max_batch_size: usize,
    history: Option<HistoryDispatcher>,
}

impl fmt::Debug for ExecutionGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionGateway")
            .field("registry", &self.registry)
            .field("pool", &self.pool)
            .field("timeout", &self.timeout)
            .field("max_batch_size", &self.max_batch_size)
            .field("history", &self.history.is_some())
            .finish_non_exhaustive()
    }
}

impl ExecutionGateway {
    /// Starts a builder around an existing registry.
    #[must_use]
    pub fn builder(registry: Arc<ToolRegistry>) -> ExecutionGatewayBuilder {
        ExecutionGatewayBuilder::new(registry)
    }

    /// Starts a builder from a loaded configuration. Backends are constructed
    /// through `factory` on first use.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] when the configuration or its catalog is invalid.
    pub fn from_config(
        config: &GatewayConfig,
        factory: Arc<dyn BackendFactory>,
    ) -> Result<ExecutionGatewayBuilder, BuildError> {
        config.validate()?;
        let registry = ToolRegistry::new(config.tools.iter().cloned(), factory)?
            .with_construction_cooldown(config.construction_cooldown());
        let prompts = PromptEngine::default()
            .with_pivot_language(config.translation.pivot_language.clone())
            .with_translation_timeout(config.translation.timeout());
        let pool_size = NonZeroUsize::new(config.worker_pool_size).unwrap_or(NonZeroUsize::MIN);

        Ok(Self::builder(Arc::new(registry))
            .prices(config.prices.clone())
            .prompts(prompts)
            .pool_size(pool_size)
            .execution_timeout(config.execution_timeout())
            .max_batch_size(config.max_batch_size)
            .history_buffer(config.history_buffer))
    }

    /// Returns the tool registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Budget for a single dispatch.
    #[must_use]
    pub const fn execution_timeout(&self) -> Duration {
        self.timeout
    }

    /// Largest accepted batch.
    #[must_use]
    pub const fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Constructs the named tools ahead of the first request.
    pub async fn preload<S: AsRef<str>>(&self, names: &[S]) -> PreloadReport {
        self.registry.preload(names).await
    }

    /// Runs one request through the stage machine and returns its record.
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionRecord {
        let request_id = RequestId::random();
        let span = info_span!("execute", request_id = %request_id, tool = %request.tool_name);
        self.execute_with_id(request_id, request)
            .instrument(span)
            .await
    }

    async fn execute_with_id(
        &self,
        request_id: RequestId,
        request: ExecutionRequest,
    ) -> ExecutionRecord {
        let started = Instant::now();
        let mut tracker = StageTracker::new(request_id);
        let mut meta = ExecutionMeta::new(request_id);

        let outcome = self.run_stages(&request, &mut tracker, &mut meta).await;
        meta.latency_ms = elapsed_ms(started);

        let record = match outcome {
            Ok(response) => {
                info!(
                    latency_ms = meta.latency_ms,
                    prompt_tokens = meta.prompt_tokens,
                    completion_tokens = meta.completion_tokens,
                    "execution completed"
                );
                ExecutionRecord::succeeded(&request, response, meta)
            }
            Err(err) => {
                let stage = tracker.fail().unwrap_or(ExecutionStage::Failed);
                warn!(
                    %stage,
                    error_kind = %err.kind(),
                    error = %err,
                    latency_ms = meta.latency_ms,
                    "execution failed"
                );
                ExecutionRecord::failed(&request, &err, meta)
            }
        };

        if let Some(history) = &self.history {
            history.submit(record.clone());
        }
        record
    }

    async fn run_stages(
        &self,
        request: &ExecutionRequest,
        tracker: &mut StageTracker,
        meta: &mut ExecutionMeta,
    ) -> Result<String, GatewayError> {
        request.validate()?;

        tracker.advance_to(ExecutionStage::Resolving)?;
        let tool = self.registry.resolve(&request.tool_name).await?;
        meta.model_id = Some(tool.model_id().to_owned());
        meta.backend_kind = Some(tool.backend_kind());

        tracker.advance_to(ExecutionStage::Rendering)?;
        let parts = PromptParts {
            system_prompt: &request.system_prompt,
            data_context: &request.data_context,
            user_question: &request.user_question,
        };
        let prompt = self
            .prompts
            .build(tool.template(), parts)
            .await
            .map_err(|err| GatewayError::internal(format!("prompt rendering failed: {err}")))?;

        tracker.advance_to(ExecutionStage::Dispatching)?;
        let deadline = Deadline::after(self.timeout);
        let invoke = AssertUnwindSafe(tool.handle().invoke(&prompt, tool.params(), deadline));
        let call = self.pool.run(invoke.catch_unwind());
        let output = match timeout_at(deadline.instant(), call).await {
            Ok(dispatched) => match dispatched? {
                Ok(result) => result.map_err(map_adapter_error)?,
                Err(payload) => {
                    return Err(GatewayError::internal(format!(
                        "backend panicked: {}",
                        panic_message(&*payload)
                    )));
                }
            },
            Err(_) => {
                return Err(GatewayError::Timeout {
                    after: self.timeout,
                });
            }
        };

        tracker.advance_to(ExecutionStage::Scoring)?;
        meta.prompt_tokens = output.prompt_tokens;
        meta.completion_tokens = output.completion_tokens;
        if let (Some(prompt_tokens), Some(completion_tokens)) =
            (output.prompt_tokens, output.completion_tokens)
        {
            meta.estimated_cost_usd =
                self.prices
                    .estimate_cost(tool.model_id(), prompt_tokens, completion_tokens);
        }

        tracker.advance_to(ExecutionStage::Completed)?;
        Ok(output.text)
    }

    /// Stops accepting dispatches and flushes queued history records.
    pub async fn shutdown(self) {
        self.pool.close();
        if let Some(history) = self.history {
            history.shutdown().await;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Builder for [`ExecutionGateway`].
pub struct ExecutionGatewayBuilder {
    registry: Arc<ToolRegistry>,
    prompts: PromptEngine,
    prices: PriceTable,
    pool: PoolConfig,
    timeout: Duration,
    max_batch_size: usize,
    history: Option<Arc<dyn HistorySink>>,
    history_buffer: usize,
}

impl fmt::Debug for ExecutionGatewayBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionGatewayBuilder")
            .field("pool", &self.pool)
            .field("timeout", &self.timeout)
            .field("max_batch_size", &self.max_batch_size)
            .field("history_buffer", &self.history_buffer)
            .finish_non_exhaustive()
    }
}

impl ExecutionGatewayBuilder {
    fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            prompts: PromptEngine::default(),
            prices: PriceTable::new(),
            pool: PoolConfig::default(),
            timeout: DEFAULT_EXECUTION_TIMEOUT,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            history: None,
            history_buffer: DEFAULT_HISTORY_BUFFER,
        }
    }

    /// Sets the prompt engine.
    #[must_use]
    pub fn prompts(mut self, prompts: PromptEngine) -> Self {
        self.prompts = prompts;
        self
    }

    /// Translates SQL-layout questions with `translator`, keeping the
    /// engine's pivot language and translation timeout.
    #[must_use]
    pub fn translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.prompts = self.prompts.with_translator(translator);
        self
    }

    /// Sets the price table used for cost estimates.
    #[must_use]
    pub fn prices(mut self, prices: PriceTable) -> Self {
        self.prices = prices;
        self
    }

    /// Bounds how many dispatches run at once.
    #[must_use]
    pub const fn pool_size(mut self, size: NonZeroUsize) -> Self {
        self.pool = PoolConfig::new(size);
        self
    }

    /// Sets the per-dispatch budget.
    #[must_use]
    pub const fn execution_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the largest accepted batch.
    #[must_use]
    pub const fn max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    /// Forwards finished records to `sink`.
    #[must_use]
    pub fn history(mut self, sink: Arc<dyn HistorySink>) -> Self {
        self.history = Some(sink);
        self
    }

    /// Capacity of the history hand-off channel.
    #[must_use]
    pub const fn history_buffer(mut self, capacity: usize) -> Self {
        self.history_buffer = capacity;
        self
    }

    /// Builds the gateway, starting the history drain task if a sink is set.
    ///
    /// # Panics
    ///
    /// Panics when a history sink is configured and no Tokio runtime is running.
    #[must_use]
    pub fn build(self) -> ExecutionGateway {
        let history = self
            .history
            .map(|sink| HistoryDispatcher::spawn(sink, self.history_buffer));
        ExecutionGateway {
            registry: self.registry,
            prompts: self.prompts,
            prices: self.prices,
            pool: DispatchPool::new(self.pool),
            timeout: self.timeout,
            max_batch_size: self.max_batch_size,
            history,
        }
    }
}
