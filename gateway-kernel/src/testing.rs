//! Scripted backends shared by unit tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use gateway_adapters::traits::{
    AdapterError, AdapterMetadata, AdapterResult, BackendAdapter, Deadline, InvokeOutput,
    InvokeParams,
};
use gateway_primitives::{BackendKind, ToolDescriptor};

use crate::factory::BackendFactory;
use crate::gateway::{ExecutionGateway, ExecutionGatewayBuilder};
use crate::record::ExecutionRequest;
use crate::registry::ToolRegistry;

/// How a scripted backend answers.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Script {
    /// Answers with the prompt, without usage.
    Echo,
    /// Answers with the prompt and reports the given token counts.
    Usage(u32, u32),
    /// Rejects prompts containing the marker, echoes them otherwise.
    FailWhen(&'static str),
    /// Never answers.
    Pending,
    /// Fails as if its own call budget ran out.
    TimesOut(Duration),
    /// Panics inside `invoke`.
    Panics,
}

struct ScriptedAdapter {
    metadata: AdapterMetadata,
    script: Script,
    invocations: Arc<AtomicUsize>,
}

#[async_trait]
impl BackendAdapter for ScriptedAdapter {
    fn metadata(&self) -> &AdapterMetadata {
        &self.metadata
    }

    async fn invoke(
        &self,
        prompt: &str,
        _params: &InvokeParams,
        _deadline: Deadline,
    ) -> AdapterResult<InvokeOutput> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        match self.script {
            Script::Echo => Ok(InvokeOutput::text(prompt)),
            Script::Usage(prompt_tokens, completion_tokens) => {
                Ok(InvokeOutput::text(prompt).with_usage(prompt_tokens, completion_tokens))
            }
            Script::FailWhen(marker) if prompt.contains(marker) => {
                Err(AdapterError::response("model rejected the prompt"))
            }
            Script::FailWhen(_) => Ok(InvokeOutput::text(prompt)),
            Script::Pending => std::future::pending().await,
            Script::TimesOut(budget) => Err(AdapterError::Timeout { budget }),
            Script::Panics => panic!("backend blew up"),
        }
    }
}

/// Factory handing out scripted adapters and counting what it does.
#[derive(Clone, Default)]
pub(crate) struct ScriptedFactory {
    tools: Vec<ToolDescriptor>,
    scripts: HashMap<String, Script>,
    invocations: HashMap<String, Arc<AtomicUsize>>,
    builds: Arc<AtomicUsize>,
    failures_left: Arc<AtomicUsize>,
}

impl ScriptedFactory {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(mut self, name: &str, backend_id: &str, script: Script) -> Self {
        self.tools.push(
            ToolDescriptor::builder(name, BackendKind::RemoteApi, backend_id)
                .build()
                .unwrap(),
        );
        self.scripts.insert(backend_id.to_owned(), script);
        self.invocations
            .entry(backend_id.to_owned())
            .or_insert_with(|| Arc::new(AtomicUsize::new(0)));
        self
    }

    pub(crate) fn failing_builds(self, count: usize) -> Self {
        self.failures_left.store(count, Ordering::SeqCst);
        self
    }

    pub(crate) fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub(crate) fn invocations(&self, backend_id: &str) -> usize {
        self.invocations
            .get(backend_id)
            .map_or(0, |count| count.load(Ordering::SeqCst))
    }

    pub(crate) fn gateway(&self) -> ExecutionGatewayBuilder {
        let registry = ToolRegistry::new(self.tools.clone(), Arc::new(self.clone())).unwrap();
        ExecutionGateway::builder(Arc::new(registry))
    }
}

#[async_trait]
impl BackendFactory for ScriptedFactory {
    async fn build(&self, descriptor: &ToolDescriptor) -> AdapterResult<Arc<dyn BackendAdapter>> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AdapterError::transport("connection refused"));
        }

        let id = descriptor.backend_id();
        let script = self
            .scripts
            .get(id)
            .copied()
            .ok_or_else(|| AdapterError::configuration(format!("no script for `{id}`")))?;
        Ok(Arc::new(ScriptedAdapter {
            metadata: AdapterMetadata::new(descriptor.backend_kind(), "scripted", id),
            script,
            invocations: Arc::clone(&self.invocations[id]),
        }))
    }
}

pub(crate) fn request(tool: &str, question: &str) -> ExecutionRequest {
    ExecutionRequest {
        tool_name: tool.to_owned(),
        system_prompt: "Answer from the data.".to_owned(),
        data_context: "region,amount\nnorth,10\nsouth,7".to_owned(),
        user_question: question.to_owned(),
        dataset_id: "sales-2024".to_owned(),
        user_id: "analyst-7".to_owned(),
    }
}
