//! ragops-text
//!
//! Tantivy-backed lexical index over an in-memory corpus. Every ingestion
//! rebuilds the index from the whole corpus (an ingestion-time cost linear in
//! corpus size) and publishes it as a new immutable [`LexicalSnapshot`]
//! generation; queries clone the current `Arc` and never observe a half-built
//! index.
pub mod index;
pub mod tantivy_utils;

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use ragops_core::domain::Domain;
use ragops_core::error::Result;
use ragops_core::types::Chunk;

pub use index::{LexicalHit, LexicalSnapshot};

pub struct LexicalIndex {
    current: RwLock<Arc<LexicalSnapshot>>,
    rebuild: Mutex<()>,
}

impl LexicalIndex {
    pub fn new() -> Result<Self> {
        Ok(Self { current: RwLock::new(Arc::new(LexicalSnapshot::empty()?)), rebuild: Mutex::new(()) })
    }

    /// The current complete generation.
    pub fn snapshot(&self) -> Arc<LexicalSnapshot> {
        self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn generation(&self) -> u64 {
        self.snapshot().generation()
    }

    /// Add (or replace, by id) chunks and swap in the rebuilt generation.
    pub fn add(&self, chunks: Vec<Chunk>) -> Result<u64> {
        self.rebuild_with(|corpus| {
            for chunk in chunks {
                corpus.insert(chunk.id.clone(), Arc::new(chunk));
            }
        })
    }

    /// Drop every chunk of `domain`; returns how many were removed.
    pub fn remove_domain(&self, domain: &Domain) -> Result<usize> {
        let mut removed = 0;
        self.rebuild_with(|corpus| {
            let before = corpus.len();
            corpus.retain(|_, c| c.domain() != Some(domain.as_str()));
            removed = before - corpus.len();
        })?;
        Ok(removed)
    }

    fn rebuild_with<F>(&self, edit: F) -> Result<u64>
    where
        F: FnOnce(&mut std::collections::HashMap<String, Arc<Chunk>>),
    {
        let _guard = self.rebuild.lock().unwrap_or_else(PoisonError::into_inner);
        let base = self.snapshot();
        let mut corpus = base.chunks().map(|c| (c.id.clone(), Arc::clone(c))).collect();
        edit(&mut corpus);

        let started = Instant::now();
        let generation = base.generation() + 1;
        let next = Arc::new(LexicalSnapshot::build(generation, corpus)?);
        let size = next.len();
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = next;
        tracing::info!(generation, chunks = size, elapsed_ms = started.elapsed().as_millis() as u64, "lexical index rebuilt");
        Ok(generation)
    }
}
