use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use ragops_cache::SemanticCache;
use ragops_core::config::Settings;
use ragops_core::domain::Domain;
use ragops_core::error::{with_deadline, Result};
use ragops_core::traits::{GenerationProvider, VectorIndex};
use ragops_core::types::RoutingDecision;
use ragops_drift::DriftMonitor;
use ragops_hybrid::{HybridRetriever, RetrievedChunk};
use ragops_route::ComplexityRouter;

use crate::ab_test::AbTestTracker;
use crate::prompts::{PromptRegistry, PromptVersion, RenderedPrompt};
use crate::telemetry::{record_stage, record_usage};

const GENERATION_BACKEND: &str = "generation-provider";

/// Rough token count used for cost accounting.
pub fn estimate_tokens(text: &str) -> u64 {
    let words = text.split_whitespace().count();
    (words as f64 / 0.75) as u64
}

#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationSource {
    Cached { response: String, similarity: f32 },
    /// Cache miss: the caller still has to generate from `retrieval`.
    Pending { routing: RoutingDecision, retrieval: Vec<RetrievedChunk> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub domain: Domain,
    pub source: EvaluationSource,
    pub query_embedding: Vec<f32>,
}

impl Evaluation {
    pub fn is_cached(&self) -> bool {
        matches!(self.source, EvaluationSource::Cached { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GenerationOutcome {
    Answer { text: String },
    Failed { reason: String },
    /// No generation provider is wired in.
    Unavailable,
}

impl GenerationOutcome {
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Answer { text } => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse {
    pub question: String,
    pub domain: Domain,
    pub answer: GenerationOutcome,
    pub cached: bool,
    pub similarity: Option<f32>,
    pub routing: Option<RoutingDecision>,
    pub sources: Vec<RetrievedChunk>,
    pub prompt_version: Option<String>,
    pub latency_ms: f64,
}

fn numbered_context(chunks: &[RetrievedChunk]) -> String {
    chunks.iter().enumerate().map(|(i, c)| format!("[{}] {}", i + 1, c.text)).collect::<Vec<_>>().join("\n\n")
}

/// Per-query request path shared by every caller of the service.
pub struct QueryPipeline<VI: VectorIndex> {
    retriever: Arc<HybridRetriever<VI>>,
    cache: Arc<SemanticCache>,
    router: ComplexityRouter,
    drift: Arc<DriftMonitor>,
    prompts: RwLock<PromptRegistry>,
    ab_tests: Arc<AbTestTracker>,
    generator: Option<Arc<dyn GenerationProvider>>,
    rng: Mutex<StdRng>,
    settings: Settings,
}

impl<VI: VectorIndex> QueryPipeline<VI> {
    pub fn new(retriever: Arc<HybridRetriever<VI>>, cache: Arc<SemanticCache>, drift: Arc<DriftMonitor>, settings: Settings) -> Result<Self> {
        let router = ComplexityRouter::from_settings(&settings.routing)?;
        let rng = match settings.generation.ab_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            retriever,
            cache,
            router,
            drift,
            prompts: RwLock::new(PromptRegistry::builtin()),
            ab_tests: Arc::new(AbTestTracker::new()),
            generator: None,
            rng: Mutex::new(rng),
            settings,
        })
    }

    #[must_use]
    pub fn with_generator(mut self, generator: Arc<dyn GenerationProvider>) -> Self {
        self.generator = Some(generator);
        self
    }

    #[must_use]
    pub fn with_prompts(mut self, prompts: PromptRegistry) -> Self {
        self.prompts = RwLock::new(prompts);
        self
    }

    pub fn retriever(&self) -> &Arc<HybridRetriever<VI>> {
        &self.retriever
    }

    pub fn router(&self) -> &ComplexityRouter {
        &self.router
    }

    pub fn drift(&self) -> &Arc<DriftMonitor> {
        &self.drift
    }

    pub fn ab_tests(&self) -> &Arc<AbTestTracker> {
        &self.ab_tests
    }

    pub fn add_prompt_version(&self, domain: &Domain, version: PromptVersion) {
        self.prompts.write().unwrap_or_else(PoisonError::into_inner).add_version(domain, version);
    }

    pub fn deactivate_prompt_version(&self, domain: &Domain, version_id: &str) -> bool {
        self.prompts.write().unwrap_or_else(PoisonError::into_inner).deactivate_version(domain, version_id)
    }

    /// Everything up to generation: drift record, cache lookup and, on a
    /// miss, routing plus retrieval.
    ///
    /// Without a domain the cache works in `general` and retrieval spans the
    /// whole corpus. Retrieval failures propagate; cache failures are misses.
    pub async fn evaluate_query(&self, question: &str, domain: Option<&str>) -> Result<Evaluation> {
        let resolved = Domain::from_optional(domain)?;
        let filter = domain.map(|_| &resolved);
        self.drift.record(&resolved, question);

        let stage = Instant::now();
        let query_embedding = match self.cache.get_embedding(question).await {
            Some(cached) => cached,
            None => {
                let fresh = self.retriever.embed_query(question).await?;
                self.cache.set_embedding(question, &fresh).await;
                fresh
            }
        };
        record_stage("embedding", stage.elapsed());

        let stage = Instant::now();
        let hit = self.cache.lookup(question, &query_embedding, &resolved).await;
        record_stage("cache_lookup", stage.elapsed());
        if let Some(hit) = hit {
            let source = EvaluationSource::Cached { response: hit.response, similarity: hit.similarity };
            return Ok(Evaluation { domain: resolved, source, query_embedding });
        }

        let routing = self.router.classify(question, &resolved);
        let retrieval_settings = self.retriever.settings();
        let stage = Instant::now();
        let retrieval = self
            .retriever
            .search_with_embedding(question, &query_embedding, retrieval_settings.top_k, filter, retrieval_settings.alpha)
            .await?;
        record_stage("retrieval", stage.elapsed());
        tracing::info!(
            domain = %resolved,
            tier = %routing.tier,
            model = %routing.model_id,
            sources = retrieval.len(),
            "query evaluated"
        );
        Ok(Evaluation { domain: resolved, source: EvaluationSource::Pending { routing, retrieval }, query_embedding })
    }

    /// The full request path. Generation problems come back as
    /// [`GenerationOutcome`] data rather than errors.
    pub async fn answer(&self, question: &str, domain: Option<&str>) -> Result<QueryResponse> {
        let started = Instant::now();
        let evaluation = self.evaluate_query(question, domain).await?;
        let Evaluation { domain, source, query_embedding } = evaluation;

        let (routing, sources) = match source {
            EvaluationSource::Cached { response, similarity } => {
                record_stage("total", started.elapsed());
                return Ok(QueryResponse {
                    question: question.to_string(),
                    domain,
                    answer: GenerationOutcome::Answer { text: response },
                    cached: true,
                    similarity: Some(similarity),
                    routing: None,
                    sources: Vec::new(),
                    prompt_version: None,
                    latency_ms: started.elapsed().as_secs_f64() * 1_000.0,
                });
            }
            EvaluationSource::Pending { routing, retrieval } => (routing, retrieval),
        };

        let prompt = self.render_prompt(&domain, &numbered_context(&sources), question);
        let stage = Instant::now();
        let answer = self.generate(&prompt, &routing).await;
        record_stage("generation", stage.elapsed());
        let elapsed = started.elapsed();
        record_stage("total", elapsed);
        let latency_ms = elapsed.as_secs_f64() * 1_000.0;

        if let GenerationOutcome::Answer { text } = &answer {
            self.cache.store(question, &query_embedding, text, &domain).await;
            let input_tokens = estimate_tokens(&prompt.system) + estimate_tokens(&prompt.user);
            let output_tokens = estimate_tokens(text);
            let tokens = input_tokens + output_tokens;
            let cost = tokens as f64 / 1_000.0 * self.settings.routing.models.cost_per_1k_tokens(routing.tier);
            record_usage(&routing.model_id, input_tokens, output_tokens, cost);
            self.ab_tests.record(&prompt.version_id, cost, tokens, latency_ms, None);
        }

        Ok(QueryResponse {
            question: question.to_string(),
            domain,
            answer,
            cached: false,
            similarity: None,
            routing: Some(routing),
            sources,
            prompt_version: Some(prompt.version_id),
            latency_ms,
        })
    }

    fn render_prompt(&self, domain: &Domain, context: &str, question: &str) -> RenderedPrompt {
        let prompts = self.prompts.read().unwrap_or_else(PoisonError::into_inner);
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        prompts.render(domain, context, question, None, &mut *rng)
    }

    async fn generate(&self, prompt: &RenderedPrompt, routing: &RoutingDecision) -> GenerationOutcome {
        let Some(generator) = &self.generator else {
            return GenerationOutcome::Unavailable;
        };
        let call = generator.generate(&prompt.system, &prompt.user, &routing.model_id);
        match with_deadline(GENERATION_BACKEND, self.settings.generation.timeout(), call).await {
            Ok(text) => GenerationOutcome::Answer { text },
            Err(e) => {
                tracing::error!(model = %routing.model_id, error = %e, "generation failed");
                GenerationOutcome::Failed { reason: e.to_string() }
            }
        }
    }
}
