//! Command-line front end for the inference gateway.
//!
//! Loads a gateway config, preloads the tools it names, and answers one
//! question or a batch of questions, printing the records as JSON.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use inference_gateway::adapters::local::LocalModel;
use inference_gateway::adapters::traits::{AdapterResult, InvokeOutput, InvokeParams};
use inference_gateway::config::{EnvCredentialProvider, GatewayConfig};
use inference_gateway::kernel::{
    BatchMode, BatchRequest, DefaultBackendFactory, ExecutionGateway, ExecutionRequest,
    FileHistorySink, LocalModelLoader, TracingHistorySink,
};
use inference_gateway::primitives::ToolDescriptor;
use inference_gateway::telemetry::tracing_support::init_tracing;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "gateway-demo", about = "Route questions to catalog tools")]
struct Cli {
    /// Gateway config; defaults to `$INFERENCE_GATEWAY_CONFIG`, then `inference-gateway.json`.
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Append records to this NDJSON file instead of logging them.
    #[arg(long, value_name = "PATH", global = true)]
    history: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Preload the configured tools and print the catalog state.
    Status,
    /// Ask one question.
    Ask {
        #[command(flatten)]
        target: Target,
        /// The question.
        #[arg(long)]
        question: String,
    },
    /// Ask every line of a file as a separate question.
    Batch {
        #[command(flatten)]
        target: Target,
        /// File with one question per line.
        #[arg(long, value_name = "PATH")]
        questions: PathBuf,
        /// Run up to this many questions at once.
        #[arg(long, value_name = "N")]
        parallel: Option<NonZeroUsize>,
    },
}

#[derive(Args, Debug)]
struct Target {
    /// Tool display name.
    #[arg(long)]
    tool: String,
    /// System prompt.
    #[arg(long, default_value = "Answer using only the provided data.")]
    system: String,
    /// File holding the data context.
    #[arg(long, value_name = "PATH")]
    context: PathBuf,
    /// Dataset identifier recorded in history.
    #[arg(long, default_value = "demo")]
    dataset: String,
    /// User identifier recorded in history.
    #[arg(long, default_value = "cli")]
    user: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("info").map_err(|err| anyhow::anyhow!(err))?;
    let cli = Cli::parse();

    let config = GatewayConfig::load(cli.config.as_deref()).context("loading gateway config")?;
    let gateway = build_gateway(&config, cli.history.as_deref()).await?;

    let report = gateway.preload(&config.preload).await;
    for (tool, reason) in &report.failed {
        warn!(tool = %tool, reason = %reason, "tool not preloaded");
    }

    let result = run(&gateway, cli.command).await;
    gateway.shutdown().await;
    result
}

async fn build_gateway(
    config: &GatewayConfig,
    history: Option<&Path>,
) -> Result<ExecutionGateway> {
    let mut factory = DefaultBackendFactory::new(Arc::new(EnvCredentialProvider::new()))
        .with_endpoints(config.providers.clone())
        .with_request_timeout(config.execution_timeout());
    for tool in &config.tools {
        if tool.backend_kind().is_local() {
            factory = factory.with_local_loader(tool.backend_id(), keyword_sentiment_loader());
        }
    }

    let builder = ExecutionGateway::from_config(config, Arc::new(factory))?;
    let builder = match history {
        Some(path) => {
            let sink = FileHistorySink::open(path)
                .await
                .with_context(|| format!("opening history file {}", path.display()))?;
            info!(path = %sink.path().display(), "writing history");
            builder.history(Arc::new(sink))
        }
        None => builder.history(Arc::new(TracingHistorySink)),
    };
    Ok(builder.build())
}

async fn run(gateway: &ExecutionGateway, command: Command) -> Result<()> {
    match command {
        Command::Status => {
            let tools: Vec<_> = gateway
                .registry()
                .status()
                .into_iter()
                .map(|tool| {
                    serde_json::json!({
                        "name": tool.name,
                        "backendId": tool.backend_id,
                        "status": format!("{:?}", tool.status),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&tools)?);
        }
        Command::Ask { target, question } => {
            let data_context = read_context(&target.context)?;
            let record = gateway
                .execute(ExecutionRequest {
                    tool_name: target.tool,
                    system_prompt: target.system,
                    data_context,
                    user_question: question,
                    dataset_id: target.dataset,
                    user_id: target.user,
                })
                .await;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::Batch {
            target,
            questions,
            parallel,
        } => {
            let data_context = read_context(&target.context)?;
            let questions = std::fs::read_to_string(&questions)
                .with_context(|| format!("reading {}", questions.display()))?
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_owned)
                .collect();
            let mode = parallel.map_or(BatchMode::Sequential, |max_in_flight| {
                BatchMode::Parallel { max_in_flight }
            });
            let outcome = gateway
                .execute_batch(BatchRequest {
                    tool_name: target.tool,
                    system_prompt: target.system,
                    data_context,
                    questions,
                    dataset_id: target.dataset,
                    user_id: target.user,
                    mode,
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
    }
    Ok(())
}

fn read_context(path: &Path) -> Result<String> {
    let context =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    if context.trim().is_empty() {
        bail!("{} is empty", path.display());
    }
    Ok(context)
}

/// Stand-in for real model weights: labels text by counting sentiment words.
fn keyword_sentiment_loader() -> LocalModelLoader {
    const POSITIVE: &[&str] = &["good", "great", "excellent", "love"];
    const NEGATIVE: &[&str] = &["bad", "poor", "terrible", "hate"];

    Arc::new(|_descriptor: &ToolDescriptor| {
        let classify = |prompt: &str, _: &InvokeParams| -> AdapterResult<InvokeOutput> {
            let text = prompt.to_lowercase();
            let score = |words: &[&str]| {
                words
                    .iter()
                    .map(|word| text.matches(word).count())
                    .sum::<usize>()
            };
            let label = match score(POSITIVE).cmp(&score(NEGATIVE)) {
                std::cmp::Ordering::Greater => "positive",
                std::cmp::Ordering::Less => "negative",
                std::cmp::Ordering::Equal => "neutral",
            };
            Ok(InvokeOutput::text(label))
        };
        let model: Arc<dyn LocalModel> = Arc::new(classify);
        Ok(model)
    })
}
