//! Embedding providers that run in-process.
//!
//! Production deployments plug a hosted model in through
//! [`ragops_core::traits::EmbedProvider`]; the hashing embedder here is
//! deterministic and dependency-free, for local runs and tests.
mod hashing;

pub use hashing::HashingEmbedder;

use std::sync::Arc;

use ragops_core::config::EmbeddingSettings;
use ragops_core::traits::EmbedProvider;

/// Provider used when nothing else is wired in.
pub fn default_provider(settings: &EmbeddingSettings) -> Arc<dyn EmbedProvider> {
    tracing::info!(dim = settings.dimension, "using hashing embedder");
    Arc::new(HashingEmbedder::new(settings.dimension))
}
