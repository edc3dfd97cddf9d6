//! Construction of backend adapters from catalog entries.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gateway_adapters::anthropic::{AnthropicAdapter, AnthropicConfig};
use gateway_adapters::local::{LocalAdapter, LocalModel};
use gateway_adapters::ollama::{OllamaAdapter, OllamaConfig};
use gateway_adapters::openai::{OpenAiAdapter, OpenAiConfig};
use gateway_adapters::traits::{AdapterError, AdapterResult, BackendAdapter};
use gateway_config::{CredentialProvider, ProviderEndpoints};
use gateway_primitives::{BackendKind, RemoteProvider, ToolDescriptor};
use tokio::task;

/// Builds the adapter for a catalog entry.
///
/// Called by the registry at most once per backend id at a time; a failed
/// build may be retried on a later resolution.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    /// Constructs the adapter described by `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns an [`AdapterError`] when the backend cannot be constructed.
    async fn build(&self, descriptor: &ToolDescriptor) -> AdapterResult<Arc<dyn BackendAdapter>>;
}

/// Loads an in-process model. Runs on the blocking pool.
pub type LocalModelLoader =
    Arc<dyn Fn(&ToolDescriptor) -> AdapterResult<Arc<dyn LocalModel>> + Send + Sync>;

/// Factory covering the built-in remote providers and registered local loaders.
#[derive(Clone)]
pub struct DefaultBackendFactory {
    credentials: Arc<dyn CredentialProvider>,
    endpoints: ProviderEndpoints,
    loaders: HashMap<String, LocalModelLoader>,
    request_timeout: Duration,
}

impl fmt::Debug for DefaultBackendFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut loaders: Vec<&str> = self.loaders.keys().map(String::as_str).collect();
        loaders.sort_unstable();
        f.debug_struct("DefaultBackendFactory")
            .field("endpoints", &self.endpoints)
            .field("loaders", &loaders)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl DefaultBackendFactory {
    /// Creates a factory reading secrets from `credentials`.
    #[must_use]
    pub fn new(credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            credentials,
            endpoints: ProviderEndpoints::default(),
            loaders: HashMap::new(),
            request_timeout: Duration::from_secs(60),
        }
    }

    /// Overrides provider base URLs.
    #[must_use]
    pub fn with_endpoints(mut self, endpoints: ProviderEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Caps individual HTTP exchanges of remote adapters.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Registers the loader used for the local backend `backend_id`.
    #[must_use]
    pub fn with_local_loader(
        mut self,
        backend_id: impl Into<String>,
        loader: LocalModelLoader,
    ) -> Self {
        self.loaders.insert(backend_id.into(), loader);
        self
    }

    fn api_key(&self, provider: RemoteProvider) -> AdapterResult<String> {
        self.credentials.api_key(provider).ok_or_else(|| {
            AdapterError::configuration(format!("no credentials available for {provider}"))
        })
    }

    fn build_remote(
        &self,
        provider: RemoteProvider,
        model: &str,
    ) -> AdapterResult<Arc<dyn BackendAdapter>> {
        let base_url = self.endpoints.base_url(provider);
        let adapter: Arc<dyn BackendAdapter> = match provider {
            RemoteProvider::OpenAi => {
                let mut config = OpenAiConfig::new(model)
                    .with_api_key(self.api_key(provider)?)
                    .with_timeout(self.request_timeout);
                if let Some(url) = base_url {
                    config = config.with_base_url(url)?;
                }
                Arc::new(OpenAiAdapter::new(config)?)
            }
            RemoteProvider::Anthropic => {
                let mut config = AnthropicConfig::new(model)
                    .with_api_key(self.api_key(provider)?)
                    .with_timeout(self.request_timeout);
                if let Some(url) = base_url {
                    config = config.with_base_url(url)?;
                }
                Arc::new(AnthropicAdapter::new(config)?)
            }
            RemoteProvider::Ollama => {
                let mut config = OllamaConfig::new(model).with_timeout(self.request_timeout);
                if let Some(url) = base_url {
                    config = config.with_base_url(url)?;
                }
                Arc::new(OllamaAdapter::new(config)?)
            }
        };
        Ok(adapter)
    }

    async fn build_local(
        &self,
        kind: BackendKind,
        descriptor: &ToolDescriptor,
    ) -> AdapterResult<Arc<dyn BackendAdapter>> {
        let loader = self
            .loaders
            .get(descriptor.backend_id())
            .cloned()
            .ok_or_else(|| {
                AdapterError::configuration(format!(
                    "no loader registered for local backend `{}`",
                    descriptor.backend_id()
                ))
            })?;

        let owned = descriptor.clone();
        let model = task::spawn_blocking(move || loader(&owned))
            .await
            .map_err(|err| AdapterError::execution(format!("model loader failed: {err}")))??;

        Ok(Arc::new(LocalAdapter::new(
            kind,
            descriptor.backend_id(),
            model,
        )?))
    }
}

#[async_trait]
impl BackendFactory for DefaultBackendFactory {
    async fn build(&self, descriptor: &ToolDescriptor) -> AdapterResult<Arc<dyn BackendAdapter>> {
        let kind = descriptor.backend_kind();
        match descriptor.provider() {
            Some(provider) => self.build_remote(provider, descriptor.backend_id()),
            None => self.build_local(kind, descriptor).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use gateway_adapters::traits::{Deadline, InvokeOutput, InvokeParams};
    use gateway_config::StaticCredentials;

    use super::*;

    fn descriptor(kind: BackendKind, id: &str) -> ToolDescriptor {
        ToolDescriptor::builder("tool", kind, id).build().unwrap()
    }

    #[tokio::test]
    async fn remote_without_key_is_configuration_error() {
        let factory = DefaultBackendFactory::new(Arc::new(StaticCredentials::new()));
        let err = factory
            .build(&descriptor(BackendKind::RemoteApi, "gpt-4o-mini"))
            .await
            .err()
            .expect("missing key");
        assert!(matches!(err, AdapterError::Configuration { reason } if reason.contains("openai")));
    }

    #[tokio::test]
    async fn remote_with_key_builds_provider_adapter() {
        let creds = StaticCredentials::new().with_key(RemoteProvider::OpenAi, "sk-test");
        let factory = DefaultBackendFactory::new(Arc::new(creds));
        let adapter = factory
            .build(&descriptor(BackendKind::RemoteApi, "gpt-4o-mini"))
            .await
            .unwrap();
        assert_eq!(adapter.metadata().provider(), "openai");
        assert_eq!(adapter.metadata().model(), "gpt-4o-mini");
    }

    #[tokio::test]
    async fn ollama_needs_no_key() {
        let factory = DefaultBackendFactory::new(Arc::new(StaticCredentials::new()));
        let tool = ToolDescriptor::builder("tool", BackendKind::RemoteApi, "gemma2:2b")
            .provider(RemoteProvider::Ollama)
            .build()
            .unwrap();
        let adapter = factory.build(&tool).await.unwrap();
        assert_eq!(adapter.metadata().provider(), "ollama");
    }

    #[tokio::test]
    async fn local_backend_uses_registered_loader() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let loader: LocalModelLoader = Arc::new(move |_descriptor: &ToolDescriptor| {
            counter.fetch_add(1, Ordering::SeqCst);
            let model: Arc<dyn LocalModel> = Arc::new(|_: &str, _: &InvokeParams| {
                Ok(InvokeOutput::text("cluster 3"))
            });
            Ok(model)
        });
        let factory = DefaultBackendFactory::new(Arc::new(StaticCredentials::new()))
            .with_local_loader("kmeans-8", loader);

        let adapter = factory
            .build(&descriptor(BackendKind::LocalClusterer, "kmeans-8"))
            .await
            .unwrap();
        let output = adapter
            .invoke(
                "rows",
                &InvokeParams::new(),
                Deadline::after(Duration::from_secs(5)),
            )
            .await
            .unwrap();

        assert_eq!(output.text, "cluster 3");
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(adapter.metadata().kind(), BackendKind::LocalClusterer);
    }

    #[tokio::test]
    async fn unregistered_local_backend_is_configuration_error() {
        let factory = DefaultBackendFactory::new(Arc::new(StaticCredentials::new()));
        let err = factory
            .build(&descriptor(BackendKind::LocalDetector, "yolo-v8"))
            .await
            .err()
            .expect("no loader");
        assert!(matches!(err, AdapterError::Configuration { .. }));
    }
}
