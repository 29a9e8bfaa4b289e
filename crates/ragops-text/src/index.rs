use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;

use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Value};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

use ragops_core::domain::{Domain, DEFAULT_DOMAIN};
use ragops_core::error::{Error, Result};
use ragops_core::types::{Chunk, ChunkId};

use crate::tantivy_utils::{build_schema, register_tokenizer, tokenize_query, FIELD_DOMAIN, FIELD_ID, FIELD_TEXT};

// One writer thread keeps document order and segment layout deterministic.
const WRITER_MEMORY_BUDGET: usize = 20_000_000;

pub(crate) fn op_err(e: impl Display) -> Error {
	Error::Operation(format!("lexical index: {e}"))
}

#[derive(Debug, Clone, PartialEq)]
pub struct LexicalHit {
	pub id: ChunkId,
	pub score: f32,
}

/// One complete, immutable generation of the lexical index.
///
/// Holds both the BM25 postings (an in-RAM tantivy index) and the chunk
/// store they were built from, so a query that grabbed this snapshot sees
/// text, metadata and scores from the same generation.
pub struct LexicalSnapshot {
	generation: u64,
	reader: IndexReader,
	id_field: Field,
	domain_field: Field,
	text_field: Field,
	chunks: HashMap<ChunkId, Arc<Chunk>>,
}

impl LexicalSnapshot {
	pub fn empty() -> Result<Self> {
		Self::build(0, HashMap::new())
	}

	/// Index every chunk from scratch. Cost is linear in corpus size.
	pub fn build(generation: u64, chunks: HashMap<ChunkId, Arc<Chunk>>) -> Result<Self> {
		let schema = build_schema();
		let index = Index::create_in_ram(schema.clone());
		register_tokenizer(&index);
		let id_field = schema.get_field(FIELD_ID).map_err(op_err)?;
		let domain_field = schema.get_field(FIELD_DOMAIN).map_err(op_err)?;
		let text_field = schema.get_field(FIELD_TEXT).map_err(op_err)?;

		let mut writer: IndexWriter = index.writer_with_num_threads(1, WRITER_MEMORY_BUDGET).map_err(op_err)?;
		for chunk in chunks.values() {
			writer
				.add_document(doc!(
					id_field => chunk.id.clone(),
					domain_field => chunk.domain().unwrap_or(DEFAULT_DOMAIN).to_string(),
					text_field => chunk.text.clone(),
				))
				.map_err(op_err)?;
		}
		writer.commit().map_err(op_err)?;

		let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into().map_err(op_err)?;
		Ok(Self { generation, reader, id_field, domain_field, text_field, chunks })
	}

	pub fn generation(&self) -> u64 {
		self.generation
	}

	pub fn len(&self) -> usize {
		self.chunks.len()
	}

	pub fn is_empty(&self) -> bool {
		self.chunks.is_empty()
	}

	pub fn contains(&self, id: &str) -> bool {
		self.chunks.contains_key(id)
	}

	pub fn get(&self, id: &str) -> Option<Arc<Chunk>> {
		self.chunks.get(id).cloned()
	}

	pub fn chunks(&self) -> impl Iterator<Item = &Arc<Chunk>> {
		self.chunks.values()
	}

	/// BM25 score for every chunk that shares at least one term with `query`.
	/// Chunks absent from the map score zero.
	pub fn score_all(&self, query: &str) -> Result<HashMap<ChunkId, f32>> {
		let hits = self.run(query, None)?;
		Ok(hits.into_iter().map(|h| (h.id, h.score)).collect())
	}

	/// Lexical-only ranking, best first, ties by ascending id.
	pub fn search(&self, query: &str, k: usize, domain: Option<&Domain>) -> Result<Vec<LexicalHit>> {
		let mut hits = self.run(query, domain)?;
		hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
		hits.truncate(k);
		Ok(hits)
	}

	fn run(&self, query: &str, domain: Option<&Domain>) -> Result<Vec<LexicalHit>> {
		let terms = tokenize_query(query);
		if terms.is_empty() || self.chunks.is_empty() {
			return Ok(Vec::new());
		}
		let clauses: Vec<(Occur, Box<dyn Query>)> = terms
			.iter()
			.map(|t| {
				let q = TermQuery::new(Term::from_field_text(self.text_field, t), IndexRecordOption::WithFreqs);
				(Occur::Should, Box::new(q) as Box<dyn Query>)
			})
			.collect();
		let mut q: Box<dyn Query> = Box::new(BooleanQuery::new(clauses));
		if let Some(domain) = domain {
			let domain_q = TermQuery::new(Term::from_field_text(self.domain_field, domain.as_str()), IndexRecordOption::Basic);
			q = Box::new(BooleanQuery::new(vec![(Occur::Must, q), (Occur::Must, Box::new(domain_q) as Box<dyn Query>)]));
		}

		let searcher = self.reader.searcher();
		let top_docs = searcher.search(&*q, &TopDocs::with_limit(self.chunks.len())).map_err(op_err)?;
		let mut hits = Vec::with_capacity(top_docs.len());
		for (score, addr) in top_docs {
			let doc: TantivyDocument = searcher.doc(addr).map_err(op_err)?;
			if let Some(id) = doc.get_first(self.id_field).and_then(|v| v.as_str()) {
				hits.push(LexicalHit { id: id.to_string(), score });
			}
		}
		Ok(hits)
	}
}
