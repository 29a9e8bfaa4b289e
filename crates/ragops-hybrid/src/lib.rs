//! Hybrid retrieval: a vector shortlist re-scored with BM25.
pub mod fusion;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use ragops_core::config::RetrievalSettings;
use ragops_core::domain::Domain;
use ragops_core::error::{with_deadline, Error, Result};
use ragops_core::traits::{EmbedProvider, MetaFilter, VectorIndex};
use ragops_core::types::{ensure_dim, Chunk, ChunkId, Meta, RetrievalCandidate};
use ragops_text::{LexicalIndex, LexicalSnapshot};

pub use fusion::{distance_to_similarity, fuse};

const VECTOR_BACKEND: &str = "vector-index";
const EMBED_BACKEND: &str = "embedding-provider";

/// A ranked chunk with the scores that placed it.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub id: ChunkId,
    pub text: String,
    pub metadata: Meta,
    pub scores: RetrievalCandidate,
}

pub struct HybridRetriever<VI: VectorIndex> {
    lexical: Arc<LexicalIndex>,
    vector: VI,
    embedder: Arc<dyn EmbedProvider>,
    settings: RetrievalSettings,
    embed_timeout: Duration,
    ingest: Mutex<()>,
}

fn validate_request(top_k: usize, alpha: f32) -> Result<()> {
    if top_k == 0 {
        return Err(Error::Validation("top_k must be > 0".into()));
    }
    if !(0.0..=1.0).contains(&alpha) {
        return Err(Error::Validation(format!("alpha must be within [0, 1], got {alpha}")));
    }
    Ok(())
}

fn join_err(e: tokio::task::JoinError) -> Error {
    Error::Operation(format!("lexical rebuild task: {e}"))
}

impl<VI: VectorIndex> HybridRetriever<VI> {
    pub fn new(vector: VI, embedder: Arc<dyn EmbedProvider>, settings: RetrievalSettings, embed_timeout: Duration) -> Result<Self> {
        if embedder.dim() != vector.dim() {
            return Err(Error::InvalidConfig(format!(
                "embedder {} produces {} dimensions but the vector index holds {}",
                embedder.embedder_id(),
                embedder.dim(),
                vector.dim()
            )));
        }
        Ok(Self { lexical: Arc::new(LexicalIndex::new()?), vector, embedder, settings, embed_timeout, ingest: Mutex::new(()) })
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    pub fn embedder(&self) -> &Arc<dyn EmbedProvider> {
        &self.embedder
    }

    pub fn vector(&self) -> &VI {
        &self.vector
    }

    pub fn snapshot(&self) -> Arc<LexicalSnapshot> {
        self.lexical.snapshot()
    }

    /// Add chunks to both indexes. Returns the new lexical generation.
    ///
    /// Chunk ids must be new: a batch repeating an id, or naming an id already
    /// in the corpus, is rejected before anything is written. So is a chunk
    /// without a valid `domain` entry, since domain filters could not see it.
    pub async fn add_chunks(&self, chunks: Vec<Chunk>) -> Result<u64> {
        let _guard = self.ingest.lock().await;
        if chunks.is_empty() {
            return Ok(self.lexical.generation());
        }
        let current = self.lexical.snapshot();
        let mut seen = HashSet::with_capacity(chunks.len());
        for c in &chunks {
            ensure_dim(self.vector.dim(), c.embedding.len(), &c.id)?;
            match c.domain() {
                Some(raw) => {
                    Domain::parse(raw).map_err(|e| Error::Validation(format!("chunk {}: {e}", c.id)))?;
                }
                None => return Err(Error::Validation(format!("chunk {} has no domain metadata", c.id))),
            }
            if !seen.insert(c.id.as_str()) || current.contains(&c.id) {
                return Err(Error::Validation(format!("duplicate chunk id {}", c.id)));
            }
        }

        let ids: Vec<ChunkId> = chunks.iter().map(|c| c.id.clone()).collect();
        let vectors: Vec<Vec<f32>> = chunks.iter().map(|c| c.embedding.clone()).collect();
        let metadata: Vec<Meta> = chunks.iter().map(|c| c.metadata.clone()).collect();
        with_deadline(VECTOR_BACKEND, self.settings.timeout(), self.vector.upsert(&ids, &vectors, &metadata)).await?;

        let lexical = Arc::clone(&self.lexical);
        let generation = tokio::task::spawn_blocking(move || lexical.add(chunks)).await.map_err(join_err)??;
        tracing::info!(chunks = ids.len(), generation, "ingested chunks");
        Ok(generation)
    }

    /// Drop a domain from both indexes; returns the vector rows removed.
    pub async fn invalidate_domain(&self, domain: &Domain) -> Result<usize> {
        let _guard = self.ingest.lock().await;
        let filter = MetaFilter::domain(domain);
        let removed = with_deadline(VECTOR_BACKEND, self.settings.timeout(), self.vector.delete_where(&filter)).await?;
        let lexical = Arc::clone(&self.lexical);
        let owned = domain.clone();
        let lexical_removed = tokio::task::spawn_blocking(move || lexical.remove_domain(&owned)).await.map_err(join_err)??;
        tracing::info!(domain = %domain, removed, lexical_removed, "invalidated domain");
        Ok(removed)
    }

    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let embedding = with_deadline(EMBED_BACKEND, self.embed_timeout, self.embedder.embed(query)).await?;
        ensure_dim(self.vector.dim(), embedding.len(), "query")?;
        Ok(embedding)
    }

    pub async fn search(&self, query: &str, top_k: usize, domain: Option<&Domain>, alpha: f32) -> Result<Vec<RetrievedChunk>> {
        validate_request(top_k, alpha)?;
        let embedding = self.embed_query(query).await?;
        self.search_with_embedding(query, &embedding, top_k, domain, alpha).await
    }

    /// Like [`Self::search`] with the query embedding already in hand.
    pub async fn search_with_embedding(
        &self,
        query: &str,
        embedding: &[f32],
        top_k: usize,
        domain: Option<&Domain>,
        alpha: f32,
    ) -> Result<Vec<RetrievedChunk>> {
        validate_request(top_k, alpha)?;
        ensure_dim(self.vector.dim(), embedding.len(), "query")?;
        let snapshot = self.lexical.snapshot();
        let filter = domain.map(MetaFilter::domain);
        let shortlist_len = top_k.saturating_mul(self.settings.candidate_multiplier);

        let mut shortlist =
            with_deadline(VECTOR_BACKEND, self.settings.timeout(), self.vector.query(embedding, shortlist_len, filter.as_ref())).await?;
        // Rows upserted by an ingestion whose lexical generation is not yet visible.
        shortlist.retain(|hit| snapshot.contains(&hit.id));

        let lexical = snapshot.score_all(query)?;
        let fused = fuse(&shortlist, &lexical, alpha, top_k);
        tracing::debug!(query, shortlist = shortlist.len(), results = fused.len(), alpha, "hybrid search");
        Ok(fused.into_iter().filter_map(|scores| Self::materialize(&snapshot, scores)).collect())
    }

    /// Rank by BM25 alone, for callers that want to keep serving while the
    /// vector index is unreachable.
    pub fn search_lexical(&self, query: &str, top_k: usize, domain: Option<&Domain>) -> Result<Vec<RetrievedChunk>> {
        validate_request(top_k, 0.0)?;
        let snapshot = self.lexical.snapshot();
        let hits = snapshot.search(query, top_k, domain)?;
        Ok(hits
            .into_iter()
            .filter_map(|h| {
                let scores = RetrievalCandidate { chunk_id: h.id, vector_score: 0.0, lexical_score: h.score, fused_score: h.score };
                Self::materialize(&snapshot, scores)
            })
            .collect())
    }

    fn materialize(snapshot: &LexicalSnapshot, scores: RetrievalCandidate) -> Option<RetrievedChunk> {
        let chunk = snapshot.get(&scores.chunk_id)?;
        Some(RetrievedChunk { id: chunk.id.clone(), text: chunk.text.clone(), metadata: chunk.metadata.clone(), scores })
    }
}
