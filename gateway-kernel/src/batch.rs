//! Batch coordinator: many questions against one tool.

use std::num::NonZeroUsize;

use futures::{StreamExt, stream};
use gateway_telemetry::BatchSummary;
use serde::{Deserialize, Serialize};
use tracing::{Instrument, info, info_span};

use crate::error::GatewayError;
use crate::gateway::ExecutionGateway;
use crate::record::{ExecutionRecord, ExecutionRequest};

/// How batch questions are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "mode")]
pub enum BatchMode {
    /// One question at a time.
    #[default]
    Sequential,
    /// Up to `max_in_flight` questions at once, still bounded by the dispatch pool.
    #[serde(rename_all = "camelCase")]
    Parallel {
        /// Questions dispatched concurrently.
        max_in_flight: NonZeroUsize,
    },
}

/// Questions sharing a tool, prompt, and data context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    /// Display name of the catalog tool.
    pub tool_name: String,
    /// Instructions placed ahead of the data.
    pub system_prompt: String,
    /// Data every question is about.
    pub data_context: String,
    /// Questions, answered in order.
    pub questions: Vec<String>,
    /// Dataset the context was drawn from.
    pub dataset_id: String,
    /// Caller identity.
    pub user_id: String,
    /// Scheduling mode.
    #[serde(default)]
    pub mode: BatchMode,
}

impl BatchRequest {
    fn requests(self) -> impl Iterator<Item = ExecutionRequest> {
        let Self {
            tool_name,
            system_prompt,
            data_context,
            questions,
            dataset_id,
            user_id,
            ..
        } = self;
        questions
            .into_iter()
            .map(move |user_question| ExecutionRequest {
                tool_name: tool_name.clone(),
                system_prompt: system_prompt.clone(),
                data_context: data_context.clone(),
                user_question,
                dataset_id: dataset_id.clone(),
                user_id: user_id.clone(),
            })
    }
}

/// Records of a batch, in question order, plus their summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    /// One record per question.
    pub records: Vec<ExecutionRecord>,
    /// Aggregate over `records`.
    pub summary: BatchSummary,
}

impl ExecutionGateway {
    /// Runs every question of `batch` and summarises the results.
    ///
    /// A failing question yields a failed record and does not stop the rest.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidInput`] when the question list is empty
    /// or longer than the configured maximum; nothing is dispatched then.
    pub async fn execute_batch(&self, batch: BatchRequest) -> Result<BatchOutcome, GatewayError> {
        let total = batch.questions.len();
        if total == 0 {
            return Err(GatewayError::invalid_input(
                "questions",
                "must contain at least one question",
            ));
        }
        if total > self.max_batch_size() {
            return Err(GatewayError::invalid_input(
                "questions",
                format!("must not exceed {} entries", self.max_batch_size()),
            ));
        }

        let mode = batch.mode;
        let span = info_span!("batch", tool = %batch.tool_name, total);
        async move {
            let requests = batch.requests();
            let records: Vec<ExecutionRecord> = match mode {
                BatchMode::Sequential => {
                    let mut records = Vec::with_capacity(total);
                    for request in requests {
                        records.push(self.execute(request).await);
                    }
                    records
                }
                BatchMode::Parallel { max_in_flight } => {
                    stream::iter(requests)
                        .map(|request| self.execute(request))
                        .buffered(max_in_flight.get())
                        .collect::<Vec<_>>()
                        .await
                }
            };

            let summary: BatchSummary = records.iter().map(ExecutionRecord::metrics).collect();
            info!(
                succeeded = summary.succeeded,
                failed = summary.failed,
                total_cost_usd = summary.total_cost_usd,
                "batch finished"
            );
            Ok(BatchOutcome { records, summary })
        }
        .instrument(span)
        .await
    }
}
