//! End-to-end dispatch through the facade: config, factory, local models.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use inference_gateway::adapters::local::LocalModel;
use inference_gateway::adapters::traits::{AdapterResult, InvokeOutput, InvokeParams};
use inference_gateway::config::{GatewayConfig, StaticCredentials};
use inference_gateway::kernel::{
    BatchMode, BatchRequest, CollectingHistorySink, DefaultBackendFactory, ErrorKind,
    ExecutionGateway, ExecutionRequest, LocalModelLoader, SlotStatus,
};
use inference_gateway::primitives::ToolDescriptor;

const CONFIG: &str = r#"{
    "tools": [
        { "displayName": "Sentiment", "backendKind": "local_classifier", "backendId": "sentiment-v1" },
        { "displayName": "Assistant", "backendKind": "local_llm", "backendId": "mistral-7b-instruct" },
        { "displayName": "Cloud", "backendKind": "remote_api", "backendId": "gpt-4o-mini" }
    ],
    "prices": {
        "mistral-7b-instruct": { "inputPer1k": 0.005, "outputPer1k": 0.015 }
    },
    "executionTimeoutMs": 2000,
    "workerPoolSize": 2,
    "preload": ["Sentiment"]
}"#;

fn loader<M: LocalModel>(model: M, loads: &Arc<AtomicUsize>) -> LocalModelLoader {
    let model: Arc<dyn LocalModel> = Arc::new(model);
    let loads = Arc::clone(loads);
    Arc::new(move |_descriptor: &ToolDescriptor| {
        loads.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&model))
    })
}

fn factory(config: &GatewayConfig, loads: &Arc<AtomicUsize>) -> DefaultBackendFactory {
    let sentiment = |prompt: &str, _: &InvokeParams| -> AdapterResult<InvokeOutput> {
        let label = if prompt.contains("great") { "positive" } else { "negative" };
        Ok(InvokeOutput::text(label))
    };
    let assistant = |prompt: &str, _: &InvokeParams| -> AdapterResult<InvokeOutput> {
        Ok(InvokeOutput::text(prompt).with_usage(1000, 1000))
    };
    DefaultBackendFactory::new(Arc::new(StaticCredentials::new()))
        .with_endpoints(config.providers.clone())
        .with_local_loader("sentiment-v1", loader(sentiment, loads))
        .with_local_loader("mistral-7b-instruct", loader(assistant, loads))
}

fn request(tool: &str, question: &str) -> ExecutionRequest {
    ExecutionRequest {
        tool_name: tool.to_owned(),
        system_prompt: "Classify or answer using the reviews.".to_owned(),
        data_context: "review\nThe product is great".to_owned(),
        user_question: question.to_owned(),
        dataset_id: "reviews-q3".to_owned(),
        user_id: "tester".to_owned(),
    }
}

#[tokio::test]
async fn configured_gateway_serves_local_tools() {
    let config = GatewayConfig::from_json_str(CONFIG).unwrap();
    let loads = Arc::new(AtomicUsize::new(0));
    let gateway = ExecutionGateway::from_config(&config, Arc::new(factory(&config, &loads)))
        .unwrap()
        .build();

    let report = gateway.preload(&config.preload).await;
    assert_eq!(report.loaded, vec!["Sentiment".to_owned()]);
    assert_eq!(loads.load(Ordering::SeqCst), 1);

    let sentiment = gateway.execute(request("Sentiment", "Is the review positive?")).await;
    assert!(sentiment.success);
    assert_eq!(sentiment.response.as_deref(), Some("positive"));
    assert_eq!(sentiment.meta.prompt_tokens, None);
    assert_eq!(sentiment.meta.estimated_cost_usd, None);
    assert_eq!(loads.load(Ordering::SeqCst), 1);

    let answer = gateway.execute(request("Assistant", "Summarise the review")).await;
    assert!(answer.success);
    let text = answer.response.as_deref().unwrap();
    assert!(text.starts_with("<s>[INST] <<SYS>>"), "unexpected layout: {text}");
    assert_eq!(answer.meta.model_id.as_deref(), Some("mistral-7b-instruct"));
    assert_eq!(answer.meta.estimated_cost_usd, Some(0.02));
    assert_eq!(loads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn remote_tool_without_credentials_is_unavailable() {
    let config = GatewayConfig::from_json_str(CONFIG).unwrap();
    let loads = Arc::new(AtomicUsize::new(0));
    let gateway = ExecutionGateway::from_config(&config, Arc::new(factory(&config, &loads)))
        .unwrap()
        .build();

    let report = gateway.preload(&["Cloud"]).await;
    assert_eq!(report.failed.len(), 1);

    let record = gateway.execute(request("Cloud", "Anything?")).await;
    assert_eq!(record.error_kind, Some(ErrorKind::BackendUnavailable));
    assert!(record.error.as_deref().unwrap().contains("openai"));

    let cloud = gateway
        .registry()
        .status()
        .into_iter()
        .find(|tool| tool.name == "Cloud")
        .unwrap();
    assert!(matches!(cloud.status, SlotStatus::Failed { attempts: 2, .. }));
}

#[tokio::test]
async fn batch_results_reach_history_in_order() {
    let config = GatewayConfig::from_json_str(CONFIG).unwrap();
    let loads = Arc::new(AtomicUsize::new(0));
    let sink = CollectingHistorySink::new();
    let gateway = ExecutionGateway::from_config(&config, Arc::new(factory(&config, &loads)))
        .unwrap()
        .history(sink.clone())
        .build();

    let outcome = gateway
        .execute_batch(BatchRequest {
            tool_name: "Assistant".into(),
            system_prompt: "Answer briefly.".into(),
            data_context: "review\nThe product is great".into(),
            questions: vec!["one".into(), "two".into(), "three".into()],
            dataset_id: "reviews-q3".into(),
            user_id: "tester".into(),
            mode: BatchMode::Sequential,
        })
        .await
        .unwrap();
    gateway.shutdown().await;

    assert_eq!(outcome.summary.succeeded, 3);
    assert_eq!(outcome.summary.total_prompt_tokens, 3000);
    assert!((outcome.summary.total_cost_usd - 0.06).abs() < 1e-9);

    let stored = sink.drain();
    assert_eq!(stored, outcome.records);
}

#[tokio::test]
async fn slow_local_model_is_abandoned_at_the_deadline() {
    let config = GatewayConfig::from_json_str(CONFIG).unwrap();
    let loads = Arc::new(AtomicUsize::new(0));
    let slow = |_: &str, _: &InvokeParams| -> AdapterResult<InvokeOutput> {
        std::thread::sleep(Duration::from_millis(400));
        Ok(InvokeOutput::text("late"))
    };
    let factory =
        factory(&config, &loads).with_local_loader("sentiment-v1", loader(slow, &loads));
    let gateway = ExecutionGateway::from_config(&config, Arc::new(factory))
        .unwrap()
        .execution_timeout(Duration::from_millis(50))
        .build();

    let started = std::time::Instant::now();
    let record = gateway.execute(request("Sentiment", "Is it late?")).await;

    assert_eq!(record.error_kind, Some(ErrorKind::Timeout));
    assert!(started.elapsed() < Duration::from_millis(300));
}
