//! Semantic response cache.
//!
//! Two namespaces share one [`CacheBackend`]:
//! - `embedding:{hash(text)}` holds raw embeddings (long TTL)
//! - `response:{domain}:{hash(domain:query)}` holds a JSON [`CacheEntry`]
//!
//! A lookup scans the newest entries of the caller's domain and returns the
//! best one whose query embedding is at least `similarity_threshold` cosine
//! similar. The cache is an optimisation: every backend failure is logged and
//! read as a miss.
mod backend;
pub mod similarity;

use std::future::Future;
use std::sync::Arc;

use ragops_core::config::CacheSettings;
use ragops_core::domain::Domain;
use ragops_core::error::{with_deadline, Error, Result};
use ragops_core::traits::{CacheBackend, Clock, SystemClock};
use ragops_core::types::CacheEntry;

pub use backend::MemoryCacheBackend;
pub use similarity::cosine;

const BACKEND: &str = "cache";

const EMBEDDING_PREFIX: &str = "embedding";
const RESPONSE_PREFIX: &str = "response";

/// Counter labelled by `type` (`response` or `embedding`) and `hit`.
pub const CACHE_REQUESTS_METRIC: &str = "rag_cache_requests_total";

fn count_request(kind: &'static str, hit: bool) {
    metrics::counter!(CACHE_REQUESTS_METRIC, "type" => kind, "hit" => if hit { "true" } else { "false" }).increment(1);
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit {
    pub response: String,
    pub similarity: f32,
    /// The query the cached answer was produced for.
    pub query: String,
}

fn digest(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

pub fn embedding_key(text: &str) -> String {
    format!("{EMBEDDING_PREFIX}:{}", digest(text))
}

pub fn response_prefix(domain: &Domain) -> String {
    format!("{RESPONSE_PREFIX}:{domain}:")
}

pub fn response_key(domain: &Domain, query: &str) -> String {
    format!("{}{}", response_prefix(domain), digest(&format!("{domain}:{query}")))
}

fn encode_err(e: serde_json::Error) -> Error {
    Error::Operation(format!("cache encoding: {e}"))
}

pub struct SemanticCache {
    backend: Arc<dyn CacheBackend>,
    settings: CacheSettings,
    dim: usize,
    clock: Arc<dyn Clock>,
}

impl SemanticCache {
    pub fn new(backend: Arc<dyn CacheBackend>, settings: CacheSettings, dim: usize) -> Self {
        Self { backend, settings, dim, clock: Arc::new(SystemClock) }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    async fn guarded<T, F>(&self, op: &'static str, fut: F) -> Option<T>
    where
        F: Future<Output = Result<T>>,
    {
        match with_deadline(BACKEND, self.settings.timeout(), fut).await {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(op, error = %e, "cache unavailable, continuing without it");
                None
            }
        }
    }

    /// Best cached answer for a semantically equivalent query in `domain`.
    pub async fn lookup(&self, query: &str, query_embedding: &[f32], domain: &Domain) -> Option<CacheHit> {
        let hit = self.guarded("lookup", self.scan_for_match(query_embedding, domain)).await.flatten();
        count_request("response", hit.is_some());
        match &hit {
            Some(h) => tracing::info!(domain = %domain, similarity = h.similarity, query, "cache hit"),
            None => tracing::debug!(domain = %domain, query, "cache miss"),
        }
        hit
    }

    async fn scan_for_match(&self, query_embedding: &[f32], domain: &Domain) -> Result<Option<CacheHit>> {
        let keys = self.backend.scan_prefix(&response_prefix(domain), Some(self.settings.scan_limit)).await?;
        let now = self.clock.now();
        let mut best: Option<CacheHit> = None;
        for key in keys {
            let Some(raw) = self.backend.get(&key).await? else { continue };
            let entry: CacheEntry = match serde_json::from_str(&raw) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!(key, error = %e, "skipping unreadable cache entry");
                    continue;
                }
            };
            if entry.domain != *domain || entry.is_expired(now) {
                continue;
            }
            let similarity = cosine(query_embedding, &entry.query_embedding);
            if similarity >= self.settings.similarity_threshold && best.as_ref().map_or(true, |b| similarity > b.similarity) {
                best = Some(CacheHit { response: entry.response, similarity, query: entry.query });
            }
        }
        Ok(best)
    }

    /// Remember `response` for `query`. Failures are logged, never returned.
    pub async fn store(&self, query: &str, query_embedding: &[f32], response: &str, domain: &Domain) {
        if query_embedding.len() != self.dim {
            tracing::warn!(expected = self.dim, actual = query_embedding.len(), "not caching response with wrong embedding dimension");
            return;
        }
        self.set_embedding(query, query_embedding).await;
        let entry = CacheEntry {
            query: query.to_string(),
            query_embedding: query_embedding.to_vec(),
            response: response.to_string(),
            domain: domain.clone(),
            created_at: self.clock.now(),
            ttl_secs: self.settings.response_ttl_secs,
        };
        if self.guarded("store", self.write_entry(query, &entry)).await.is_some() {
            tracing::debug!(domain = %domain, query, "cached response");
        }
    }

    async fn write_entry(&self, query: &str, entry: &CacheEntry) -> Result<()> {
        let value = serde_json::to_string(entry).map_err(encode_err)?;
        self.backend.set(&response_key(&entry.domain, query), value, self.settings.response_ttl()).await
    }

    /// Drop every cached response for `domain`; returns how many went.
    pub async fn invalidate(&self, domain: &Domain) -> usize {
        let removed = self.guarded("invalidate", self.purge(&response_prefix(domain))).await.unwrap_or(0);
        tracing::info!(domain = %domain, removed, "invalidated cached responses");
        removed
    }

    async fn purge(&self, prefix: &str) -> Result<usize> {
        let keys = self.backend.scan_prefix(prefix, None).await?;
        self.backend.delete(&keys).await
    }

    pub async fn get_embedding(&self, text: &str) -> Option<Vec<f32>> {
        let embedding = self.guarded("get_embedding", self.read_embedding(text)).await.flatten();
        count_request("embedding", embedding.is_some());
        embedding
    }

    async fn read_embedding(&self, text: &str) -> Result<Option<Vec<f32>>> {
        let Some(raw) = self.backend.get(&embedding_key(text)).await? else { return Ok(None) };
        let v: Vec<f32> = serde_json::from_str(&raw).map_err(encode_err)?;
        Ok((v.len() == self.dim).then_some(v))
    }

    pub async fn set_embedding(&self, text: &str, embedding: &[f32]) {
        self.guarded("set_embedding", self.write_embedding(text, embedding)).await;
    }

    async fn write_embedding(&self, text: &str, embedding: &[f32]) -> Result<()> {
        let value = serde_json::to_string(embedding).map_err(encode_err)?;
        self.backend.set(&embedding_key(text), value, self.settings.embedding_ttl()).await
    }
}
