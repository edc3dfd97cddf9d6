//! Aggregation of per-call metrics into a batch summary.

use serde::{Deserialize, Serialize};

use crate::pricing::round_usd;

/// Metrics of one finished call, as seen by the aggregator.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CallMetrics {
    /// Whether the call succeeded.
    pub success: bool,
    /// Wall-clock latency in milliseconds.
    pub latency_ms: u64,
    /// Prompt tokens, if reported.
    pub prompt_tokens: Option<u32>,
    /// Completion tokens, if reported.
    pub completion_tokens: Option<u32>,
    /// Estimated cost, if known.
    pub estimated_cost_usd: Option<f64>,
}

/// Aggregate over the records of one batch.
///
/// `succeeded + failed == total` always holds. Latency is averaged over
/// successful calls only; cost and token totals sum the values that are known.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    /// Number of calls.
    pub total: usize,
    /// Calls that succeeded.
    pub succeeded: usize,
    /// Calls that failed.
    pub failed: usize,
    /// Sum of known costs, rounded to six decimals.
    pub total_cost_usd: f64,
    /// Mean latency of successful calls; zero when none succeeded.
    pub average_latency_ms: f64,
    /// Sum of known prompt token counts.
    pub total_prompt_tokens: u64,
    /// Sum of known completion token counts.
    pub total_completion_tokens: u64,
}

impl BatchSummary {
    /// Builds the summary from per-call metrics.
    #[must_use]
    pub fn from_metrics<I>(metrics: I) -> Self
    where
        I: IntoIterator<Item = CallMetrics>,
    {
        let mut summary = Self::default();
        let mut success_latency: u64 = 0;

        for call in metrics {
            summary.total += 1;
            if call.success {
                summary.succeeded += 1;
                success_latency = success_latency.saturating_add(call.latency_ms);
            } else {
                summary.failed += 1;
            }
            summary.total_cost_usd += call.estimated_cost_usd.unwrap_or(0.0);
            summary.total_prompt_tokens += u64::from(call.prompt_tokens.unwrap_or(0));
            summary.total_completion_tokens += u64::from(call.completion_tokens.unwrap_or(0));
        }

        summary.total_cost_usd = round_usd(summary.total_cost_usd);
        if summary.succeeded > 0 {
            #[allow(clippy::cast_precision_loss)]
            let mean = success_latency as f64 / summary.succeeded as f64;
            summary.average_latency_ms = mean;
        }
        summary
    }
}

impl FromIterator<CallMetrics> for BatchSummary {
    fn from_iter<T: IntoIterator<Item = CallMetrics>>(iter: T) -> Self {
        Self::from_metrics(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(latency_ms: u64, cost: Option<f64>, tokens: Option<(u32, u32)>) -> CallMetrics {
        CallMetrics {
            success: true,
            latency_ms,
            prompt_tokens: tokens.map(|t| t.0),
            completion_tokens: tokens.map(|t| t.1),
            estimated_cost_usd: cost,
        }
    }

    fn failed(latency_ms: u64) -> CallMetrics {
        CallMetrics {
            latency_ms,
            ..CallMetrics::default()
        }
    }

    #[test]
    fn latency_averages_successes_only() {
        let summary: BatchSummary = [
            ok(100, Some(0.01), Some((10, 5))),
            failed(9_000),
            ok(300, None, None),
        ]
        .into_iter()
        .collect();

        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert!((summary.average_latency_ms - 200.0).abs() < f64::EPSILON);
        assert!((summary.total_cost_usd - 0.01).abs() < f64::EPSILON);
        assert_eq!(summary.total_prompt_tokens, 10);
        assert_eq!(summary.total_completion_tokens, 5);
    }

    #[test]
    fn all_failed_has_zero_average() {
        let summary = BatchSummary::from_metrics([failed(10), failed(20)]);
        assert_eq!(summary.succeeded, 0);
        assert_eq!(summary.failed, 2);
        assert!(summary.average_latency_ms.abs() < f64::EPSILON);
    }

    #[test]
    fn empty_input_is_all_zero() {
        assert_eq!(BatchSummary::from_metrics([]), BatchSummary::default());
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(BatchSummary::default()).unwrap();
        assert!(json.get("averageLatencyMs").is_some());
        assert!(json.get("totalCostUsd").is_some());
    }
}
