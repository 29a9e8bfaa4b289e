//! Contracts for the external collaborators the core talks to.
//!
//! Every implementation is expected to be cheap to share behind an `Arc` and
//! safe to call from many tasks at once. Callers wrap each call in
//! [`crate::error::with_deadline`]; implementations do not need their own
//! timeouts.
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::Domain;
use crate::error::Result;
use crate::types::{ChunkId, Meta, META_DOMAIN};

#[async_trait]
pub trait EmbedProvider: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `hash:xxh64:d1024`).
    fn embedder_id(&self) -> &str;
    /// Embedding dimensionality (D).
    fn dim(&self) -> usize;
    /// Fails with `Error::Provider`.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub id: ChunkId,
    pub distance: f32,
    pub metadata: Meta,
}

/// Exact-match metadata predicate, all pairs must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaFilter(Meta);

impl MetaFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn domain(domain: &Domain) -> Self {
        Self::new().with(META_DOMAIN, domain.as_str())
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(&self, meta: &Meta) -> bool {
        self.0.iter().all(|(k, v)| meta.get(k) == Some(v))
    }
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn dim(&self) -> usize;
    /// Insert or replace rows. Slices are parallel and must have equal length.
    async fn upsert(&self, ids: &[ChunkId], vectors: &[Vec<f32>], metadata: &[Meta]) -> Result<()>;
    /// Nearest `k` rows by ascending distance. Fails with `Error::Connectivity`.
    async fn query(&self, vector: &[f32], k: usize, filter: Option<&MetaFilter>) -> Result<Vec<VectorHit>>;
    /// Remove every row matching `filter`; returns the number removed.
    async fn delete_where(&self, filter: &MetaFilter) -> Result<usize>;
}

/// TTL-aware key-value store with prefix-scoped enumeration.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<String>>;
    /// Live keys starting with `prefix`, most recently written first.
    async fn scan_prefix(&self, prefix: &str, limit: Option<usize>) -> Result<Vec<String>>;
    async fn delete(&self, keys: &[String]) -> Result<usize>;
}

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Fails with `Error::Generation`.
    async fn generate(&self, system_prompt: &str, user_prompt: &str, model_id: &str) -> Result<String>;
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn publish(&self, topic: &str, subject: &str, message: &str) -> Result<()>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
