use std::collections::HashMap;

use ragops_core::traits::VectorHit;
use ragops_core::types::{ChunkId, RetrievalCandidate};

/// Map a vector distance onto `(0, 1]`.
pub fn distance_to_similarity(distance: f32) -> f32 {
    1.0 / (1.0 + distance.max(0.0))
}

/// Score the vector shortlist as `alpha * similarity + (1 - alpha) * lexical`,
/// best first with ties broken by ascending id, keeping `top_k`.
///
/// Chunks that only the lexical side found are not candidates.
pub fn fuse(shortlist: &[VectorHit], lexical: &HashMap<ChunkId, f32>, alpha: f32, top_k: usize) -> Vec<RetrievalCandidate> {
    let mut out: Vec<RetrievalCandidate> = shortlist
        .iter()
        .map(|hit| {
            let vector_score = distance_to_similarity(hit.distance);
            let lexical_score = lexical.get(&hit.id).copied().unwrap_or(0.0);
            RetrievalCandidate {
                chunk_id: hit.id.clone(),
                vector_score,
                lexical_score,
                fused_score: alpha * vector_score + (1.0 - alpha) * lexical_score,
            }
        })
        .collect();
    out.sort_by(|a, b| b.fused_score.total_cmp(&a.fused_score).then_with(|| a.chunk_id.cmp(&b.chunk_id)));
    out.truncate(top_k);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragops_core::types::Meta;

    fn hit(id: &str, distance: f32) -> VectorHit {
        VectorHit { id: id.to_string(), distance, metadata: Meta::new() }
    }

    #[test]
    fn similarity_is_one_at_zero_distance() {
        assert_eq!(distance_to_similarity(0.0), 1.0);
        assert_eq!(distance_to_similarity(1.0), 0.5);
    }

    #[test]
    fn alpha_one_follows_vector_order() {
        let shortlist = vec![hit("a", 0.1), hit("b", 0.5), hit("c", 0.9)];
        let lexical = HashMap::from([("c".to_string(), 9.0), ("b".to_string(), 4.0)]);
        let fused = fuse(&shortlist, &lexical, 1.0, 3);
        assert_eq!(fused.iter().map(|c| c.chunk_id.as_str()).collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(fused[2].lexical_score, 9.0);
    }

    #[test]
    fn alpha_zero_follows_lexical_within_shortlist() {
        let shortlist = vec![hit("a", 0.1), hit("b", 0.5)];
        let lexical = HashMap::from([("b".to_string(), 2.0), ("a".to_string(), 1.0), ("outside".to_string(), 50.0)]);
        let fused = fuse(&shortlist, &lexical, 0.0, 5);
        assert_eq!(fused.iter().map(|c| c.chunk_id.as_str()).collect::<Vec<_>>(), vec!["b", "a"]);
    }

    #[test]
    fn ties_break_by_id_and_top_k_truncates() {
        let shortlist = vec![hit("z", 0.5), hit("m", 0.5), hit("q", 3.0)];
        let fused = fuse(&shortlist, &HashMap::new(), 0.7, 2);
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].chunk_id, "m");
        assert_eq!(fused[1].chunk_id, "z");
        assert!((fused[0].fused_score - 0.7 / 1.5).abs() < 1e-6);
    }
}
