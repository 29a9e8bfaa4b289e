use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use ragops_core::error::{Error, Result};
use ragops_core::traits::{MetaFilter, VectorHit, VectorIndex};
use ragops_core::types::{ensure_dim, ChunkId, Meta};

use crate::squared_l2;

struct Row {
    vector: Vec<f32>,
    metadata: Meta,
}

/// Exact brute-force index held in process memory.
pub struct MemoryVectorIndex {
    dim: usize,
    rows: RwLock<BTreeMap<ChunkId, Row>>,
}

impl MemoryVectorIndex {
    pub fn new(dim: usize) -> Self {
        Self { dim, rows: RwLock::new(BTreeMap::new()) }
    }

    pub fn len(&self) -> usize {
        self.rows.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rows.read().unwrap_or_else(PoisonError::into_inner).contains_key(id)
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    fn dim(&self) -> usize {
        self.dim
    }

    async fn upsert(&self, ids: &[ChunkId], vectors: &[Vec<f32>], metadata: &[Meta]) -> Result<()> {
        if ids.len() != vectors.len() || ids.len() != metadata.len() {
            return Err(Error::Validation(format!(
                "upsert: {} ids, {} vectors, {} metadata rows",
                ids.len(),
                vectors.len(),
                metadata.len()
            )));
        }
        for (id, v) in ids.iter().zip(vectors) {
            ensure_dim(self.dim, v.len(), id)?;
        }
        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        for ((id, vector), meta) in ids.iter().zip(vectors).zip(metadata) {
            rows.insert(id.clone(), Row { vector: vector.clone(), metadata: meta.clone() });
        }
        tracing::debug!(rows = ids.len(), total = rows.len(), "memory vector upsert");
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize, filter: Option<&MetaFilter>) -> Result<Vec<VectorHit>> {
        ensure_dim(self.dim, vector.len(), "query")?;
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        let mut hits: Vec<VectorHit> = rows
            .iter()
            .filter(|(_, row)| filter.map_or(true, |f| f.matches(&row.metadata)))
            .map(|(id, row)| VectorHit { id: id.clone(), distance: squared_l2(vector, &row.vector), metadata: row.metadata.clone() })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(k);
        Ok(hits)
    }

    async fn delete_where(&self, filter: &MetaFilter) -> Result<usize> {
        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        let before = rows.len();
        rows.retain(|_, row| !filter.matches(&row.metadata));
        Ok(before - rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn squared_l2_matches_hand_computation() {
        assert_eq!(squared_l2(&[0.0, 0.0], &[3.0, 4.0]), 25.0);
        assert_eq!(squared_l2(&[1.0, 1.0], &[1.0, 1.0]), 0.0);
    }
}
