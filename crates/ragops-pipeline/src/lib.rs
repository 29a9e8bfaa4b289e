//! Per-query orchestration: drift record, cache lookup, routing, retrieval,
//! and (optionally) prompt selection plus generation.
mod pipeline;
pub mod prompts;
pub mod telemetry;

pub use ab_test::{AbTestTracker, VersionReport};
pub use pipeline::{estimate_tokens, Evaluation, EvaluationSource, GenerationOutcome, QueryPipeline, QueryResponse};
pub use prompts::{PromptRegistry, PromptVersion, RenderedPrompt};
