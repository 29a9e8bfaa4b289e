//! Metric names recorded on the request path. Nothing here installs a
//! recorder; binaries pick the exporter.
use std::time::Duration;

/// Accumulated generation spend in dollars, labelled by `model`.
pub const COST_METRIC: &str = "rag_cost_dollars_total";
/// Estimated tokens, labelled by `model` and `type` (`input` or `output`).
pub const TOKENS_METRIC: &str = "rag_token_usage_total";
/// Wall time per `stage`: `embedding`, `cache_lookup`, `retrieval`,
/// `generation` and `total`.
pub const STAGE_DURATION_METRIC: &str = "rag_request_duration_seconds";

/// Histogram buckets for [`STAGE_DURATION_METRIC`], in seconds.
pub const STAGE_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 20.0];

pub(crate) fn record_stage(stage: &'static str, elapsed: Duration) {
    metrics::histogram!(STAGE_DURATION_METRIC, "stage" => stage).record(elapsed.as_secs_f64());
}

pub(crate) fn record_usage(model: &str, input_tokens: u64, output_tokens: u64, cost: f64) {
    metrics::counter!(TOKENS_METRIC, "model" => model.to_string(), "type" => "input").increment(input_tokens);
    metrics::counter!(TOKENS_METRIC, "model" => model.to_string(), "type" => "output").increment(output_tokens);
    // Counters are integral; dollars accumulate on a gauge.
    metrics::gauge!(COST_METRIC, "model" => model.to_string()).increment(cost);
}
