use chrono::{DateTime, Utc};

/// A symbol's indexed text: the columns `fts_symbols` searches over plus
/// the metadata columns carried alongside in `fts_content` (spec §4.7).
#[derive(Debug, Clone, PartialEq)]
pub struct FtsDocument {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub documentation: String,
    pub signature: String,
    pub file_path: String,
    pub language: String,
    pub indexed_at: DateTime<Utc>,
}

/// A single search hit. `rank` reflects which cascade stage matched it
/// (1.0 exact phrase, 0.8 prefix, 0.5 substring fallback), not a BM25
/// score — BM25 only orders candidates within a stage (spec §4.7).
#[derive(Debug, Clone, PartialEq)]
pub struct FtsMatch {
    pub id: String,
    pub name: String,
    pub rank: f64,
    pub match_type: &'static str,
}

/// `{indexed_symbols, estimated_size_bytes}` for `GetStats` (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FtsStats {
    pub indexed_symbols: i64,
    pub estimated_size_bytes: i64,
}
