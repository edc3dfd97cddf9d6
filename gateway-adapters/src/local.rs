//! In-process model adapter.
//!
//! Local models are synchronous and usually CPU or GPU bound, so the adapter
//! moves each prediction onto the blocking pool and waits for it only until
//! the deadline. An overrun is reported as [`AdapterError::Timeout`]; the
//! prediction keeps running on its blocking thread and its output is dropped.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use gateway_primitives::BackendKind;
use tokio::task;
use tokio::time::timeout_at;
use tracing::warn;

use crate::traits::{
    AdapterError, AdapterMetadata, AdapterResult, BackendAdapter, Deadline, InvokeOutput,
    InvokeParams,
};

/// A loaded model that can answer prompts synchronously.
pub trait LocalModel: Send + Sync + 'static {
    /// Computes the model output for `prompt`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Execution`] (or any other variant) when the
    /// model cannot produce an answer.
    fn predict(&self, prompt: &str, params: &InvokeParams) -> AdapterResult<InvokeOutput>;
}

impl<F> LocalModel for F
where
    F: Fn(&str, &InvokeParams) -> AdapterResult<InvokeOutput> + Send + Sync + 'static,
{
    fn predict(&self, prompt: &str, params: &InvokeParams) -> AdapterResult<InvokeOutput> {
        self(prompt, params)
    }
}

/// Adapter wrapping a [`LocalModel`].
pub struct LocalAdapter {
    model: Arc<dyn LocalModel>,
    metadata: AdapterMetadata,
}

impl fmt::Debug for LocalAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalAdapter")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

impl LocalAdapter {
    /// Wraps `model` as the backend for `model_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] when `kind` is not a local kind.
    pub fn new(
        kind: BackendKind,
        model_id: impl Into<String>,
        model: Arc<dyn LocalModel>,
    ) -> AdapterResult<Self> {
        if !kind.is_local() {
            return Err(AdapterError::configuration(format!(
                "{kind} cannot be served by an in-process model"
            )));
        }
        Ok(Self {
            model,
            metadata: AdapterMetadata::new(kind, "local", model_id),
        })
    }
}

#[async_trait]
impl BackendAdapter for LocalAdapter {
    fn metadata(&self) -> &AdapterMetadata {
        &self.metadata
    }

    async fn invoke(
        &self,
        prompt: &str,
        params: &InvokeParams,
        deadline: Deadline,
    ) -> AdapterResult<InvokeOutput> {
        let budget = deadline.remaining();
        if budget.is_zero() {
            return Err(AdapterError::Timeout { budget });
        }

        let model = Arc::clone(&self.model);
        let prompt = prompt.to_owned();
        let params = params.clone();
        let handle = task::spawn_blocking(move || model.predict(&prompt, &params));

        match timeout_at(deadline.instant(), handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(AdapterError::execution(format!(
                "local model task failed: {join}"
            ))),
            Err(_) => {
                warn!(model = %self.metadata.model(), "local prediction abandoned after deadline");
                Err(AdapterError::Timeout { budget })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    fn echo() -> Arc<dyn LocalModel> {
        Arc::new(|prompt: &str, _: &InvokeParams| Ok(InvokeOutput::text(prompt.to_uppercase())))
    }

    #[test]
    fn remote_kind_is_rejected() {
        let err = LocalAdapter::new(BackendKind::RemoteApi, "x", echo()).expect_err("remote");
        assert!(matches!(err, AdapterError::Configuration { .. }));
    }

    #[tokio::test]
    async fn prediction_runs_and_reports_no_usage() {
        let adapter = LocalAdapter::new(BackendKind::LocalClassifier, "sentiment", echo()).unwrap();
        let output = adapter
            .invoke(
                "good",
                &InvokeParams::new(),
                Deadline::after(Duration::from_secs(5)),
            )
            .await
            .unwrap();

        assert_eq!(output.text, "GOOD");
        assert_eq!(output.prompt_tokens, None);
        assert_eq!(adapter.metadata().provider(), "local");
    }

    #[tokio::test]
    async fn model_error_passes_through() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let model: Arc<dyn LocalModel> = Arc::new(move |_: &str, _: &InvokeParams| {
            seen.fetch_add(1, Ordering::SeqCst);
            Err(AdapterError::execution("weights corrupted"))
        });
        let adapter = LocalAdapter::new(BackendKind::LocalDetector, "yolo", model).unwrap();

        let err = adapter
            .invoke("x", &InvokeParams::new(), Deadline::after(Duration::from_secs(5)))
            .await
            .expect_err("model failure");
        assert!(matches!(err, AdapterError::Execution { reason } if reason == "weights corrupted"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_prediction_times_out() {
        let model: Arc<dyn LocalModel> = Arc::new(|_: &str, _: &InvokeParams| {
            std::thread::sleep(Duration::from_millis(500));
            Ok(InvokeOutput::text("late"))
        });
        let adapter = LocalAdapter::new(BackendKind::LocalLlm, "llama", model).unwrap();

        let started = std::time::Instant::now();
        let err = adapter
            .invoke("x", &InvokeParams::new(), Deadline::after(Duration::from_millis(50)))
            .await
            .expect_err("deadline");
        assert!(matches!(err, AdapterError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_millis(400));
    }
}
