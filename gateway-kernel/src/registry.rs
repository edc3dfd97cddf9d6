//! Tool registry with lazy, per-backend construction of adapters.
//!
//! The catalog is fixed when the registry is built. Every distinct backend id
//! owns one slot; tools that share a backend id share its handle. A slot is
//! filled on first resolution using check-lock-check: the handle is read
//! without waiting, and only on a miss does the caller take the slot's build
//! lock, re-check, and construct. Slots never share a lock, so slow
//! construction of one backend does not delay resolution of another.
//!
//! A failed construction leaves the slot empty and is retried on a later
//! resolution. With a non-zero cooldown, resolutions inside the cooldown
//! window fail fast with the last failure instead of rebuilding.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use futures::future::join_all;
use gateway_adapters::traits::{BackendAdapter, InvokeParams};
use gateway_primitives::{BackendKind, TemplateKind, ToolDescriptor};
use gateway_prompts::select_template;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::factory::BackendFactory;

/// Result alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors surfaced by the registry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The catalog supplied at startup was inconsistent.
    #[error("invalid tool catalog: {reason}")]
    InvalidCatalog {
        /// What is wrong with the catalog.
        reason: String,
    },

    /// No tool with this name is registered.
    #[error("tool `{name}` not found")]
    ToolNotFound {
        /// Requested name.
        name: String,
    },

    /// Backend construction failed or is cooling down after a failure.
    #[error("backend for tool `{tool}` unavailable: {reason}")]
    BackendUnavailable {
        /// Requested name.
        tool: String,
        /// Last construction failure.
        reason: String,
    },
}

/// Everything the gateway needs to dispatch to a tool.
#[derive(Clone)]
pub struct ResolvedTool {
    handle: Arc<dyn BackendAdapter>,
    display_name: String,
    backend_kind: BackendKind,
    model_id: String,
    template: TemplateKind,
    params: InvokeParams,
}

impl fmt::Debug for ResolvedTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedTool")
            .field("display_name", &self.display_name)
            .field("backend_kind", &self.backend_kind)
            .field("model_id", &self.model_id)
            .field("template", &self.template)
            .finish_non_exhaustive()
    }
}

impl ResolvedTool {
    /// Shared backend handle.
    #[must_use]
    pub fn handle(&self) -> &Arc<dyn BackendAdapter> {
        &self.handle
    }

    /// Tool display name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Backend kind of the tool.
    #[must_use]
    pub const fn backend_kind(&self) -> BackendKind {
        self.backend_kind
    }

    /// Canonical model id used for pricing.
    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Prompt layout used for this tool.
    #[must_use]
    pub const fn template(&self) -> TemplateKind {
        self.template
    }

    /// Call parameters forwarded to the backend.
    #[must_use]
    pub const fn params(&self) -> &InvokeParams {
        &self.params
    }
}

/// Construction state of a tool's backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotStatus {
    /// Never constructed.
    NotLoaded,
    /// Handle is cached.
    Loaded,
    /// Last construction attempt failed.
    Failed {
        /// Failure reason.
        reason: String,
        /// Consecutive failed attempts.
        attempts: u32,
    },
}

/// Status line for one catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolStatus {
    /// Tool display name.
    pub name: String,
    /// Backend id backing the tool.
    pub backend_id: String,
    /// Construction state.
    pub status: SlotStatus,
}

/// Outcome of [`ToolRegistry::preload`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreloadReport {
    /// Tools whose backend is ready.
    pub loaded: Vec<String>,
    /// Tools that could not be loaded, with the reason.
    pub failed: Vec<(String, String)>,
}

#[derive(Debug)]
struct Failure {
    reason: String,
    attempts: u32,
    at: Instant,
}

struct Slot {
    descriptor: ToolDescriptor,
    handle: RwLock<Option<Arc<dyn BackendAdapter>>>,
    build_lock: tokio::sync::Mutex<()>,
    failure: Mutex<Option<Failure>>,
}

impl Slot {
    fn new(descriptor: ToolDescriptor) -> Self {
        Self {
            descriptor,
            handle: RwLock::new(None),
            build_lock: tokio::sync::Mutex::new(()),
            failure: Mutex::new(None),
        }
    }

    fn cached(&self) -> Option<Arc<dyn BackendAdapter>> {
        self.handle
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn status(&self) -> SlotStatus {
        if self.cached().is_some() {
            return SlotStatus::Loaded;
        }
        match &*self.failure.lock().unwrap_or_else(PoisonError::into_inner) {
            Some(failure) => SlotStatus::Failed {
                reason: failure.reason.clone(),
                attempts: failure.attempts,
            },
            None => SlotStatus::NotLoaded,
        }
    }

    fn cooling_down(&self, cooldown: Duration) -> Option<String> {
        if cooldown.is_zero() {
            return None;
        }
        let guard = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
        guard
            .as_ref()
            .filter(|failure| failure.at.elapsed() < cooldown)
            .map(|failure| failure.reason.clone())
    }

    async fn get_or_build(
        &self,
        factory: &dyn BackendFactory,
        cooldown: Duration,
        tool: &str,
    ) -> RegistryResult<Arc<dyn BackendAdapter>> {
        if let Some(handle) = self.cached() {
            return Ok(handle);
        }

        let _build = self.build_lock.lock().await;
        if let Some(handle) = self.cached() {
            return Ok(handle);
        }

        let backend_id = self.descriptor.backend_id();
        if let Some(reason) = self.cooling_down(cooldown) {
            debug!(backend_id, "construction cooling down after failure");
            return Err(RegistryError::BackendUnavailable {
                tool: tool.to_owned(),
                reason,
            });
        }

        let started = Instant::now();
        match factory.build(&self.descriptor).await {
            Ok(handle) => {
                *self.handle.write().unwrap_or_else(PoisonError::into_inner) =
                    Some(Arc::clone(&handle));
                *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = None;
                info!(
                    backend_id,
                    kind = %self.descriptor.backend_kind(),
                    elapsed_ms = crate::elapsed_ms(started),
                    "backend constructed"
                );
                Ok(handle)
            }
            Err(err) => {
                let reason = err.to_string();
                let mut failure = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
                let attempts = failure.as_ref().map_or(0, |f| f.attempts) + 1;
                *failure = Some(Failure {
                    reason: reason.clone(),
                    attempts,
                    at: Instant::now(),
                });
                warn!(backend_id, attempts, error = %reason, "backend construction failed");
                Err(RegistryError::BackendUnavailable {
                    tool: tool.to_owned(),
                    reason,
                })
            }
        }
    }
}

struct ToolEntry {
    descriptor: ToolDescriptor,
    template: TemplateKind,
    params: InvokeParams,
    slot: Arc<Slot>,
}

/// Catalog of tools and owner of their backend handles.
pub struct ToolRegistry {
    order: Vec<String>,
    tools: HashMap<String, ToolEntry>,
    factory: Arc<dyn BackendFactory>,
    cooldown: Duration,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.order)
            .field("cooldown", &self.cooldown)
            .finish_non_exhaustive()
    }
}

impl ToolRegistry {
    /// Builds the registry for `catalog`. Nothing is constructed yet.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidCatalog`] when a descriptor is invalid,
    /// a display name repeats, or tools sharing a backend id disagree on its
    /// kind or provider.
    pub fn new(
        catalog: impl IntoIterator<Item = ToolDescriptor>,
        factory: Arc<dyn BackendFactory>,
    ) -> RegistryResult<Self> {
        let mut order = Vec::new();
        let mut tools = HashMap::new();
        let mut slots: HashMap<String, Arc<Slot>> = HashMap::new();

        for descriptor in catalog {
            descriptor
                .validate()
                .map_err(|err| RegistryError::InvalidCatalog {
                    reason: err.to_string(),
                })?;
            let name = descriptor.display_name().to_owned();
            if tools.contains_key(&name) {
                return Err(RegistryError::InvalidCatalog {
                    reason: format!("duplicate tool name `{name}`"),
                });
            }

            let slot = Arc::clone(
                slots
                    .entry(descriptor.backend_id().to_owned())
                    .or_insert_with(|| Arc::new(Slot::new(descriptor.clone()))),
            );
            let shared = &slot.descriptor;
            if shared.backend_kind() != descriptor.backend_kind()
                || shared.provider() != descriptor.provider()
            {
                return Err(RegistryError::InvalidCatalog {
                    reason: format!(
                        "tools `{}` and `{name}` share backend `{}` but disagree on how it is served",
                        shared.display_name(),
                        descriptor.backend_id()
                    ),
                });
            }

            let template = descriptor
                .template()
                .unwrap_or_else(|| select_template(descriptor.backend_id()));
            let params = InvokeParams::new()
                .with_temperature(descriptor.temperature())
                .with_max_output_tokens(descriptor.max_output_tokens());

            order.push(name.clone());
            tools.insert(
                name,
                ToolEntry {
                    descriptor,
                    template,
                    params,
                    slot,
                },
            );
        }

        Ok(Self {
            order,
            tools,
            factory,
            cooldown: Duration::ZERO,
        })
    }

    /// Remembers construction failures for `cooldown` before retrying.
    #[must_use]
    pub fn with_construction_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Resolves `name` to a ready backend, constructing it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ToolNotFound`] for names outside the catalog
    /// (nothing is constructed), and [`RegistryError::BackendUnavailable`] when
    /// construction fails or is cooling down.
    pub async fn resolve(&self, name: &str) -> RegistryResult<ResolvedTool> {
        let entry = self
            .tools
            .get(name)
            .ok_or_else(|| RegistryError::ToolNotFound {
                name: name.to_owned(),
            })?;

        let handle = entry
            .slot
            .get_or_build(self.factory.as_ref(), self.cooldown, name)
            .await?;

        Ok(ResolvedTool {
            handle,
            display_name: entry.descriptor.display_name().to_owned(),
            backend_kind: entry.descriptor.backend_kind(),
            model_id: entry.descriptor.backend_id().to_owned(),
            template: entry.template,
            params: entry.params.clone(),
        })
    }

    /// Constructs the named tools eagerly. Failures are logged and reported,
    /// never returned as errors.
    pub async fn preload<S: AsRef<str>>(&self, names: &[S]) -> PreloadReport {
        let attempts = names.iter().map(|name| async move {
            let name = name.as_ref();
            (name.to_owned(), self.resolve(name).await)
        });

        let mut report = PreloadReport::default();
        for (name, result) in join_all(attempts).await {
            match result {
                Ok(_) => report.loaded.push(name),
                Err(err) => {
                    warn!(tool = %name, error = %err, "preload failed");
                    report.failed.push((name, err.to_string()));
                }
            }
        }
        info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            "preload finished"
        );
        report
    }

    /// Returns `true` when `name` is in the catalog.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Catalog entries in registration order.
    #[must_use]
    pub fn catalog(&self) -> Vec<&ToolDescriptor> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|entry| &entry.descriptor)
            .collect()
    }

    /// Construction state of every tool, in registration order.
    #[must_use]
    pub fn status(&self) -> Vec<ToolStatus> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name).map(|entry| (name, entry)))
            .map(|(name, entry)| ToolStatus {
                name: name.clone(),
                backend_id: entry.descriptor.backend_id().to_owned(),
                status: entry.slot.status(),
            })
            .collect()
    }
}
