//! LanceDB-backed vector index.
//!
//! One row per chunk. The well-known metadata keys get their own columns so
//! filters push down as SQL; the full metadata map rides along as JSON.
use std::fmt::Display;
use std::sync::Arc;

use arrow_array::{Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, Table};

use ragops_core::error::{Error, Result};
use ragops_core::traits::{MetaFilter, VectorHit, VectorIndex};
use ragops_core::types::{ensure_dim, ChunkId, Meta, META_CHUNK_INDEX, META_DOMAIN, META_SOURCE};

use crate::schema::*;

const BACKEND: &str = "lancedb";

fn conn_err(e: impl Display) -> Error {
	Error::connectivity(BACKEND, e)
}

fn sql_quote(v: &str) -> String {
	format!("'{}'", v.replace('\'', "''"))
}

/// SQL predicate for the pushable part of `filter`, plus whether any pair
/// could not be pushed down.
fn predicate(filter: &MetaFilter) -> (Option<String>, bool) {
	let mut clauses = Vec::new();
	let mut residual = false;
	for (k, v) in filter.pairs() {
		if FILTER_COLUMNS.contains(&k) {
			clauses.push(format!("{k} = {}", sql_quote(v)));
		} else {
			residual = true;
		}
	}
	let sql = if clauses.is_empty() { None } else { Some(clauses.join(" AND ")) };
	(sql, residual)
}

fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
	batch
		.column_by_name(name)
		.and_then(|c| c.as_any().downcast_ref::<StringArray>())
		.ok_or_else(|| Error::Operation(format!("{BACKEND}: column {name} missing")))
}

pub struct LanceVectorIndex {
	db: Connection,
	table_name: String,
	dim: usize,
}

impl LanceVectorIndex {
	/// Connect to `uri` and create `table_name` empty if it does not exist.
	pub async fn open(uri: &str, table_name: &str, dim: usize) -> Result<Self> {
		let dim_i32 = i32::try_from(dim).map_err(|_| Error::InvalidConfig(format!("dimension {dim} too large")))?;
		let db = connect(uri).execute().await.map_err(conn_err)?;
		let names = db.table_names().execute().await.map_err(conn_err)?;
		if !names.contains(&table_name.to_string()) {
			let schema = build_chunk_schema(dim_i32);
			let iter = RecordBatchIterator::new(vec![].into_iter(), schema);
			db.create_table(table_name, Box::new(iter)).execute().await.map_err(conn_err)?;
			tracing::info!(table = table_name, dim, "created lance table");
		}
		Ok(Self { db, table_name: table_name.to_string(), dim })
	}

	async fn table(&self) -> Result<Table> {
		self.db.open_table(&self.table_name).execute().await.map_err(conn_err)
	}

	pub async fn count(&self) -> Result<usize> {
		self.table().await?.count_rows(None).await.map_err(conn_err)
	}

	fn to_record_batch(&self, ids: &[ChunkId], vectors: &[Vec<f32>], metadata: &[Meta]) -> Result<RecordBatch> {
		let field = |m: &Meta, k: &str| m.get(k).cloned().unwrap_or_default();
		let mut json = Vec::with_capacity(ids.len());
		for m in metadata {
			json.push(serde_json::to_string(m).map_err(|e| Error::Operation(e.to_string()))?);
		}
		let rows: Vec<Option<Vec<Option<f32>>>> = vectors.iter().map(|v| Some(v.iter().map(|&x| Some(x)).collect())).collect();
		let record_batch = RecordBatch::try_new(
			build_chunk_schema(self.dim as i32),
			vec![
				Arc::new(StringArray::from(ids.to_vec())),
				Arc::new(StringArray::from(metadata.iter().map(|m| field(m, META_DOMAIN)).collect::<Vec<_>>())),
				Arc::new(StringArray::from(metadata.iter().map(|m| field(m, META_SOURCE)).collect::<Vec<_>>())),
				Arc::new(StringArray::from(metadata.iter().map(|m| field(m, META_CHUNK_INDEX)).collect::<Vec<_>>())),
				Arc::new(StringArray::from(json)),
				Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(rows.into_iter(), self.dim as i32)),
			],
		)
		.map_err(|e| Error::Operation(e.to_string()))?;
		Ok(record_batch)
	}
}

#[async_trait]
impl VectorIndex for LanceVectorIndex {
	fn dim(&self) -> usize {
		self.dim
	}

	async fn upsert(&self, ids: &[ChunkId], vectors: &[Vec<f32>], metadata: &[Meta]) -> Result<()> {
		if ids.len() != vectors.len() || ids.len() != metadata.len() {
			return Err(Error::Validation(format!("upsert: {} ids, {} vectors, {} metadata rows", ids.len(), vectors.len(), metadata.len())));
		}
		if ids.is_empty() {
			return Ok(());
		}
		for (id, v) in ids.iter().zip(vectors) {
			ensure_dim(self.dim, v.len(), id)?;
		}
		let rb = self.to_record_batch(ids, vectors, metadata)?;
		let schema = rb.schema();
		let reader = Box::new(RecordBatchIterator::new(vec![Ok(rb)].into_iter(), schema));
		let table = self.table().await?;
		// Upsert behavior via merge_insert: id is unique
		let mut mi = table.merge_insert(&[COL_ID]);
		mi.when_matched_update_all(None).when_not_matched_insert_all();
		let res = mi.execute(reader).await.map_err(conn_err)?;
		tracing::debug!(inserted = res.num_inserted_rows, updated = res.num_updated_rows, "lance upsert");
		Ok(())
	}

	async fn query(&self, vector: &[f32], k: usize, filter: Option<&MetaFilter>) -> Result<Vec<VectorHit>> {
		ensure_dim(self.dim, vector.len(), "query")?;
		let (sql, residual) = filter.map(predicate).unwrap_or((None, false));
		// Over-fetch when some filter keys can only be checked after decoding metadata.
		let limit = if residual { k.saturating_mul(4) } else { k };
		let table = self.table().await?;
		let mut q = table.vector_search(vector.to_vec()).map_err(conn_err)?.limit(limit);
		if let Some(sql) = sql {
			q = q.only_if(sql);
		}
		let mut stream = q.execute().await.map_err(conn_err)?;
		let mut hits = Vec::new();
		while let Some(batch) = stream.try_next().await.map_err(conn_err)? {
			let ids = string_col(&batch, COL_ID)?;
			let metas = string_col(&batch, COL_METADATA)?;
			let distances = batch
				.column_by_name(COL_DISTANCE)
				.and_then(|c| c.as_any().downcast_ref::<Float32Array>())
				.ok_or_else(|| Error::Operation(format!("{BACKEND}: column {COL_DISTANCE} missing")))?;
			for i in 0..batch.num_rows() {
				let metadata: Meta = serde_json::from_str(metas.value(i)).map_err(|e| Error::Operation(e.to_string()))?;
				if filter.map_or(false, |f| !f.matches(&metadata)) {
					continue;
				}
				hits.push(VectorHit { id: ids.value(i).to_string(), distance: distances.value(i), metadata });
			}
		}
		hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then_with(|| a.id.cmp(&b.id)));
		hits.truncate(k);
		Ok(hits)
	}

	async fn delete_where(&self, filter: &MetaFilter) -> Result<usize> {
		let (sql, residual) = predicate(filter);
		let Some(sql) = sql.filter(|_| !residual) else {
			return Err(Error::Validation("lance delete only supports domain, source and chunk_index filters".into()));
		};
		let table = self.table().await?;
		let n = table.count_rows(Some(sql.clone())).await.map_err(conn_err)?;
		if n > 0 {
			table.delete(&sql).await.map_err(conn_err)?;
		}
		Ok(n)
	}
}
