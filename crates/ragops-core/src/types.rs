//! Domain types shared by the retrieval, cache, routing and drift crates.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Domain;
use crate::error::{Error, Result};

pub type ChunkId = String;
pub type Meta = BTreeMap<String, String>;

pub const META_DOMAIN: &str = "domain";
pub const META_SOURCE: &str = "source";
pub const META_CHUNK_INDEX: &str = "chunk_index";

/// A piece of a source document, indexed independently.
///
/// Chunks are immutable once stored. `metadata` always carries `domain`,
/// `source` and `chunk_index` when built through [`Chunk::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: Meta,
}

impl Chunk {
    pub fn new(
        id: impl Into<ChunkId>,
        text: impl Into<String>,
        embedding: Vec<f32>,
        domain: &Domain,
        source: impl Into<String>,
        chunk_index: usize,
    ) -> Self {
        let metadata = Meta::from([
            (META_DOMAIN.to_string(), domain.to_string()),
            (META_SOURCE.to_string(), source.into()),
            (META_CHUNK_INDEX.to_string(), chunk_index.to_string()),
        ]);
        Self { id: id.into(), text: text.into(), embedding, metadata }
    }

    pub fn domain(&self) -> Option<&str> {
        self.metadata.get(META_DOMAIN).map(String::as_str)
    }
}

/// Fail with [`Error::Validation`] unless `actual == expected`.
pub fn ensure_dim(expected: usize, actual: usize, what: &str) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "{what}: embedding has dimension {actual}, expected {expected}"
        )))
    }
}

/// Per-candidate scores produced while fusing one query.
///
/// `vector_score` is in `[0, 1]`, `lexical_score` is non-negative and
/// unbounded, `fused_score` is `alpha * vector + (1 - alpha) * lexical`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalCandidate {
    pub chunk_id: ChunkId,
    pub vector_score: f32,
    pub lexical_score: f32,
    pub fused_score: f32,
}

/// A cached answer, as stored in the response namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub query: String,
    pub query_embedding: Vec<f32>,
    pub response: String,
    pub domain: Domain,
    pub created_at: DateTime<Utc>,
    pub ttl_secs: u64,
}

impl CacheEntry {
    pub fn expires_at(&self) -> DateTime<Utc> {
        i64::try_from(self.ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|ttl| self.created_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Lite,
    Pro,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lite => f.write_str("lite"),
            Self::Pro => f.write_str("pro"),
        }
    }
}

/// Surface features the router decides on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFeatures {
    pub word_count: usize,
    pub sentence_count: usize,
    pub has_technical_terms: bool,
    pub has_multiple_questions: bool,
    pub has_conditional_language: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub tier: Tier,
    pub model_id: String,
    pub rationale: String,
    /// Weighted score for score-based domains, word count for the
    /// threshold-rule domains.
    pub complexity_score: f64,
    pub domain: Domain,
    pub features: QueryFeatures,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySample {
    pub timestamp: DateTime<Utc>,
    pub domain: Domain,
    pub word_count: usize,
}
