use tantivy::schema::{IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING};
use tantivy::tokenizer::{LowerCaser, TextAnalyzer, WhitespaceTokenizer};
use tantivy::Index;

pub const TOKENIZER_NAME: &str = "lower_whitespace";

pub const FIELD_ID: &str = "id";
pub const FIELD_DOMAIN: &str = "domain";
pub const FIELD_TEXT: &str = "text";

pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	schema_builder.add_text_field(FIELD_ID, STRING | STORED);
	schema_builder.add_text_field(FIELD_DOMAIN, STRING | STORED);
	let text_field_indexing = TextFieldIndexing::default().set_tokenizer(TOKENIZER_NAME).set_index_option(IndexRecordOption::WithFreqsAndPositions);
	let text_options = TextOptions::default().set_indexing_options(text_field_indexing);
	schema_builder.add_text_field(FIELD_TEXT, text_options);
	schema_builder.build()
}

/// Lowercase + whitespace split. Punctuation stays attached to its word.
pub fn register_tokenizer(index: &Index) {
	let tokenizer = TextAnalyzer::builder(WhitespaceTokenizer::default())
		.filter(LowerCaser)
		.build();
	index.tokenizers().register(TOKENIZER_NAME, tokenizer);
}

/// Query-side twin of the registered analyzer, deduplicated. Splits on ASCII
/// whitespace only, as `WhitespaceTokenizer` does.
pub fn tokenize_query(query: &str) -> Vec<String> {
	let mut terms: Vec<String> = query.split(|c: char| c.is_ascii_whitespace()).filter(|t| !t.is_empty()).map(str::to_lowercase).collect();
	terms.sort();
	terms.dedup();
	terms
}
