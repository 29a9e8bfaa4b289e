use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

pub const COL_ID: &str = "id";
pub const COL_DOMAIN: &str = "domain";
pub const COL_SOURCE: &str = "source";
pub const COL_CHUNK_INDEX: &str = "chunk_index";
pub const COL_METADATA: &str = "metadata";
pub const COL_VECTOR: &str = "vector";
pub const COL_DISTANCE: &str = "_distance";

/// Columns that metadata filters can push down as SQL predicates.
pub const FILTER_COLUMNS: [&str; 3] = [COL_DOMAIN, COL_SOURCE, COL_CHUNK_INDEX];

pub fn build_chunk_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new(COL_ID, DataType::Utf8, false),
		Field::new(COL_DOMAIN, DataType::Utf8, false),
		Field::new(COL_SOURCE, DataType::Utf8, false),
		Field::new(COL_CHUNK_INDEX, DataType::Utf8, false),
		Field::new(COL_METADATA, DataType::Utf8, false),
		Field::new(COL_VECTOR, DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
	]))
}
