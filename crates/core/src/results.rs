//! Ranked result variants
//!
//! One struct per content domain, each carrying the fusion fields it owns.
//! Rank fields are present iff the corresponding engine found the item.
//! Merged values are new objects; fusion never mutates its inputs.

use serde::{Deserialize, Serialize};

/// Which engines contributed a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Semantic,
    Keyword,
    Both,
}

/// A ranked book-page result
///
/// Key: `(book_id, page_number)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookRankedResult {
    pub book_id: i64,
    pub page_number: i64,
    /// Plain text snippet of the matched page region
    pub text_snippet: String,
    /// Snippet with engine highlight markup, when the lexical engine found it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlighted_snippet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_score: Option<f32>,
    /// Raw BM25 from the lexical engine (unbounded)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bm25_raw: Option<f32>,
    /// BM25 mapped into [0, 1)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_rank: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_rank: Option<usize>,
    pub fused_score: f32,
    pub rrf_score: f32,
    pub match_type: MatchType,
    /// Translation of the matched paragraph, when requested and found
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_translation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_arabic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_latin: Option<String>,
    #[serde(rename = "author", skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
}

impl BookRankedResult {
    pub fn key(&self) -> (i64, i64) {
        (self.book_id, self.page_number)
    }
}

/// A ranked Quran verse result
///
/// Key: `(surah_number, ayah_number)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AyahRankedResult {
    pub surah_number: i32,
    pub ayah_number: i32,
    /// Last ayah of a multi-verse span (equals ayah_number for single verses)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ayah_end: Option<i32>,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bm25_raw: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_rank: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_rank: Option<usize>,
    pub score: f32,
    pub rrf_score: f32,
    pub match_type: MatchType,
}

impl AyahRankedResult {
    pub fn key(&self) -> (i32, i32) {
        (self.surah_number, self.ayah_number)
    }
}

/// A ranked hadith result
///
/// Key: `(collection, hadith_number)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HadithRankedResult {
    /// Collection slug, e.g. "bukhari"
    #[serde(rename = "collectionSlug")]
    pub collection: String,
    pub hadith_number: String,
    pub book_id: i64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bm25_raw: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_rank: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_rank: Option<usize>,
    pub score: f32,
    pub rrf_score: f32,
    pub match_type: MatchType,
}

impl HadithRankedResult {
    pub fn key(&self) -> (String, String) {
        (self.collection.clone(), self.hadith_number.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(book_id: i64, page: i64) -> BookRankedResult {
        BookRankedResult {
            book_id,
            page_number: page,
            text_snippet: "نص".into(),
            highlighted_snippet: None,
            semantic_score: Some(0.8),
            bm25_raw: None,
            keyword_score: None,
            semantic_rank: Some(1),
            keyword_rank: None,
            fused_score: 0.8,
            rrf_score: 0.016,
            match_type: MatchType::Semantic,
            content_translation: None,
            title_arabic: None,
            title_latin: None,
            author_name: None,
        }
    }

    #[test]
    fn test_book_key() {
        assert_eq!(book(7, 12).key(), (7, 12));
    }

    #[test]
    fn test_optional_fields_omitted() {
        let json = serde_json::to_value(book(1, 2)).unwrap();
        assert!(json.get("keywordScore").is_none());
        assert!(json.get("semanticScore").is_some());
        assert_eq!(json["matchType"], "semantic");
    }
}
