use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use ragops_core::config::RetrievalSettings;
use ragops_core::domain::Domain;
use ragops_core::error::{Error, Result};
use ragops_core::traits::{MetaFilter, VectorHit, VectorIndex};
use ragops_core::types::{Chunk, ChunkId, Meta};
use ragops_embed::HashingEmbedder;
use ragops_hybrid::HybridRetriever;
use ragops_vector::MemoryVectorIndex;

const DIM: usize = 256;

fn embedder() -> HashingEmbedder {
    HashingEmbedder::new(DIM)
}

fn chunk(id: &str, domain: &str, text: &str) -> Chunk {
    let embedding = embedder().embed_sync(text).unwrap();
    Chunk::new(id, text, embedding, &Domain::parse(domain).unwrap(), format!("{domain}/{id}.txt"), 0)
}

fn corpus() -> Vec<Chunk> {
    vec![
        chunk("hr-1", "hr", "employees accrue vacation days every month"),
        chunk("hr-2", "hr", "reset your password in the employee portal"),
        chunk("hr-3", "hr", "password policy requires twelve characters"),
        chunk("eng-1", "engineering", "rotate the database password before release"),
        chunk("eng-2", "engineering", "deployment pipeline runs integration tests"),
        chunk("legal-1", "legal", "indemnification clause survives termination"),
    ]
}

fn settings(multiplier: usize) -> RetrievalSettings {
    RetrievalSettings { candidate_multiplier: multiplier, timeout_ms: 200, ..RetrievalSettings::default() }
}

async fn retriever() -> HybridRetriever<MemoryVectorIndex> {
    let r = HybridRetriever::new(MemoryVectorIndex::new(DIM), Arc::new(embedder()), settings(2), Duration::from_secs(1)).expect("retriever");
    r.add_chunks(corpus()).await.expect("ingest");
    r
}

#[tokio::test]
async fn alpha_one_ranks_by_vector_similarity() {
    let r = retriever().await;
    let results = r.search("reset password", 3, None, 1.0).await.expect("search");
    assert_eq!(results.len(), 3);
    for pair in results.windows(2) {
        assert!(pair[0].scores.vector_score >= pair[1].scores.vector_score);
        assert!((pair[0].scores.fused_score - pair[0].scores.vector_score).abs() < 1e-6);
    }
    assert_eq!(results[0].id, "hr-2");
    assert_eq!(results[0].text, "reset your password in the employee portal");
}

#[tokio::test]
async fn alpha_zero_ranks_shortlist_by_lexical_score() {
    let r = retriever().await;
    let results = r.search("password", 2, None, 0.0).await.expect("search");
    assert_eq!(results.len(), 2);
    assert!(results[0].scores.lexical_score >= results[1].scores.lexical_score);

    // The shortlist is 2 * top_k by vector distance; nothing outside it appears.
    let embedding = r.embed_query("password").await.unwrap();
    let shortlist = r.vector().query(&embedding, 4, None).await.unwrap();
    for res in &results {
        assert!(shortlist.iter().any(|h| h.id == res.id));
    }
}

#[tokio::test]
async fn lexical_only_candidates_are_excluded() {
    let r = HybridRetriever::new(MemoryVectorIndex::new(DIM), Arc::new(embedder()), settings(1), Duration::from_secs(1)).unwrap();
    r.add_chunks(corpus()).await.unwrap();
    let results = r.search("password", 1, None, 0.0).await.unwrap();
    let embedding = r.embed_query("password").await.unwrap();
    let nearest = r.vector().query(&embedding, 1, None).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, nearest[0].id);
}

#[tokio::test]
async fn domain_filter_restricts_results() {
    let r = retriever().await;
    let eng = Domain::parse("engineering").unwrap();
    let results = r.search("password", 3, Some(&eng), 0.7).await.unwrap();
    assert!(!results.is_empty());
    assert!(results.iter().all(|c| c.metadata.get("domain").map(String::as_str) == Some("engineering")));
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let r = retriever().await;
    assert!(matches!(r.search("q", 0, None, 0.5).await, Err(Error::Validation(_))));
    assert!(matches!(r.search("q", 3, None, 1.5).await, Err(Error::Validation(_))));
    assert!(matches!(r.search("q", 3, None, f32::NAN).await, Err(Error::Validation(_))));
    assert!(matches!(r.search_with_embedding("q", &[0.0; 3], 3, None, 0.5).await, Err(Error::Validation(_))));
}

#[tokio::test]
async fn ingestion_validates_dimension_and_duplicates() {
    let r = retriever().await;
    let generation = r.snapshot().generation();

    let mut short = chunk("new-1", "hr", "short vector");
    short.embedding.truncate(3);
    assert!(matches!(r.add_chunks(vec![short]).await, Err(Error::Validation(_))));

    assert!(matches!(r.add_chunks(vec![chunk("hr-1", "hr", "again")]).await, Err(Error::Validation(_))));
    let twice = vec![chunk("n", "hr", "one"), chunk("n", "hr", "two")];
    assert!(matches!(r.add_chunks(twice).await, Err(Error::Validation(_))));

    assert_eq!(r.snapshot().generation(), generation);
    assert_eq!(r.vector().len(), 6);
}

#[tokio::test]
async fn chunks_without_a_usable_domain_are_rejected() {
    let r = retriever().await;
    let generation = r.snapshot().generation();

    let mut unlabelled = chunk("loose-1", "hr", "vacation carryover rules");
    unlabelled.metadata.remove("domain");
    let batch = vec![chunk("ok-1", "hr", "vacation requests go to your manager"), unlabelled];
    assert!(matches!(r.add_chunks(batch).await, Err(Error::Validation(_))));

    let mut malformed = chunk("loose-2", "hr", "vacation carryover rules");
    malformed.metadata.insert("domain".into(), "HR Team".into());
    assert!(matches!(r.add_chunks(vec![malformed]).await, Err(Error::Validation(_))));

    // Nothing reached either index, so the domain filter and lexical view agree.
    assert_eq!(r.snapshot().generation(), generation);
    assert_eq!(r.vector().len(), 6);
    let hr = Domain::parse("hr").unwrap();
    let hits = r.search("vacation carryover", 10, Some(&hr), 0.5).await.unwrap();
    assert!(hits.iter().all(|h| !h.id.starts_with("loose") && h.id != "ok-1"));
}

#[tokio::test]
async fn search_lexical_works_without_vectors() {
    let r = retriever().await;
    let hr = Domain::parse("hr").unwrap();
    let results = r.search_lexical("password", 5, Some(&hr)).unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|c| c.scores.vector_score == 0.0));
    assert!(results[0].scores.lexical_score >= results[1].scores.lexical_score);
}

#[tokio::test]
async fn invalidate_domain_clears_both_indexes() {
    let r = retriever().await;
    let removed = r.invalidate_domain(&Domain::parse("hr").unwrap()).await.unwrap();
    assert_eq!(removed, 3);
    assert_eq!(r.snapshot().len(), 3);
    let results = r.search("password vacation", 6, None, 0.5).await.unwrap();
    assert!(results.iter().all(|c| !c.id.starts_with("hr-")));
}

#[test]
fn mismatched_embedder_dimension_is_a_config_error() {
    let res = HybridRetriever::new(MemoryVectorIndex::new(8), Arc::new(embedder()), settings(2), Duration::from_secs(1));
    assert!(matches!(res, Err(Error::InvalidConfig(_))));
}

struct OfflineIndex {
    hang: bool,
}

#[async_trait]
impl VectorIndex for OfflineIndex {
    fn dim(&self) -> usize {
        DIM
    }

    async fn upsert(&self, _: &[ChunkId], _: &[Vec<f32>], _: &[Meta]) -> Result<()> {
        Ok(())
    }

    async fn query(&self, _: &[f32], _: usize, _: Option<&MetaFilter>) -> Result<Vec<VectorHit>> {
        if self.hang {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        Err(Error::connectivity("test-index", "connection refused"))
    }

    async fn delete_where(&self, _: &MetaFilter) -> Result<usize> {
        Ok(0)
    }
}

#[tokio::test]
async fn unreachable_vector_index_propagates_connectivity() {
    for hang in [false, true] {
        let r = HybridRetriever::new(OfflineIndex { hang }, Arc::new(embedder()), settings(2), Duration::from_secs(1)).unwrap();
        r.add_chunks(corpus()).await.unwrap();
        let err = r.search("password", 3, None, 0.7).await.unwrap_err();
        assert!(err.is_connectivity(), "hang={hang}: {err}");

        // The lexical path still serves.
        assert!(!r.search_lexical("password", 3, None).unwrap().is_empty());
    }
}
