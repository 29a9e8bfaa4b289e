use std::sync::LazyLock;

use regex::Regex;

use ragops_core::types::QueryFeatures;

pub const TECHNICAL_TERMS: [&str; 12] = [
    "algorithm",
    "implementation",
    "architecture",
    "deployment",
    "configuration",
    "infrastructure",
    "optimization",
    "integration",
    "compliance",
    "regulation",
    "statute",
    "provision",
];

static WORD_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+|[^\w\s]").expect("static regex"));
static CONDITIONAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(if|when|unless|provided|assuming)\b").expect("static regex"));

/// Words and punctuation marks, each a token.
pub fn word_count(text: &str) -> usize {
    WORD_TOKEN.find_iter(text).count()
}

/// Runs of text closed by `.`, `!` or `?`; an unterminated tail counts too.
pub fn sentence_count(text: &str) -> usize {
    let mut count = 0;
    let mut open = false;
    for c in text.chars() {
        if matches!(c, '.' | '!' | '?') {
            if open {
                count += 1;
                open = false;
            }
        } else if !c.is_whitespace() {
            open = true;
        }
    }
    count + usize::from(open)
}

pub fn has_technical_terms(text: &str) -> bool {
    let lower = text.to_lowercase();
    TECHNICAL_TERMS.iter().any(|t| lower.contains(t))
}

pub fn extract_features(query: &str) -> QueryFeatures {
    QueryFeatures {
        word_count: word_count(query),
        sentence_count: sentence_count(query),
        has_technical_terms: has_technical_terms(query),
        has_multiple_questions: query.matches('?').count() > 1,
        has_conditional_language: CONDITIONAL.is_match(query),
    }
}
