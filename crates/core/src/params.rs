//! Search request parameters
//!
//! Deserialized straight from the HTTP request body. `validate()` is the
//! 400-class gate: anything that fails here never enters the pipeline.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Maximum accepted query length in characters
pub const MAX_QUERY_LEN: usize = 500;

/// Bounds for the book-results limit
pub const BOOK_LIMIT_RANGE: (usize, usize) = (1, 50);
/// Bounds for the ayah/hadith limits
pub const DOMAIN_LIMIT_RANGE: (usize, usize) = (1, 30);

/// Search strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Hybrid,
    Semantic,
    Keyword,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Hybrid => "hybrid",
            SearchMode::Semantic => "semantic",
            SearchMode::Keyword => "keyword",
        }
    }
}

/// Which reranking model to apply, if any
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RerankerChoice {
    #[default]
    None,
    Small,
    Large,
    Fast,
}

impl RerankerChoice {
    pub fn is_none(&self) -> bool {
        matches!(self, RerankerChoice::None)
    }
}

/// Embedding model selection
///
/// Exactly one model is active per request; vector collection names are
/// derived from it so the two models never read each other's index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EmbeddingModel {
    /// text-embedding-3-large, 3072 dimensions
    #[default]
    #[serde(rename = "large", alias = "large3072")]
    Large3072,
    /// jina-embeddings-v3, 1024 dimensions
    #[serde(rename = "jina", alias = "jina1024")]
    Jina1024,
}

impl EmbeddingModel {
    /// Vector dimension of this model
    pub fn dim(&self) -> usize {
        match self {
            EmbeddingModel::Large3072 => 3072,
            EmbeddingModel::Jina1024 => 1024,
        }
    }

    /// Remote model identifier
    pub fn model_id(&self) -> &'static str {
        match self {
            EmbeddingModel::Large3072 => "text-embedding-3-large",
            EmbeddingModel::Jina1024 => "jina-embeddings-v3",
        }
    }

    /// Suffix appended to collection names ("" for the default model)
    pub fn collection_suffix(&self) -> &'static str {
        match self {
            EmbeddingModel::Large3072 => "",
            EmbeddingModel::Jina1024 => "_jina",
        }
    }

    /// Prefix applied to persistent-cache keys ("" for the default model)
    pub fn cache_prefix(&self) -> &'static str {
        match self {
            EmbeddingModel::Large3072 => "",
            EmbeddingModel::Jina1024 => "jina:",
        }
    }
}

/// Parameters of one search request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchParams {
    /// User query text
    pub query: String,
    /// Search strategy
    pub mode: SearchMode,
    /// Include book-page results
    pub include_books: bool,
    /// Include Quran results
    pub include_quran: bool,
    /// Include hadith results
    pub include_hadith: bool,
    /// Maximum book-page results
    pub limit: usize,
    /// Maximum ayah results
    pub ayah_limit: usize,
    /// Maximum hadith results
    pub hadith_limit: usize,
    /// Restrict content search to a single book
    pub book_id: Option<i64>,
    /// Cap results per book (None = no cap)
    pub per_book_limit: Option<usize>,
    /// Base similarity cutoff for semantic hits
    pub similarity_threshold: f32,
    /// Reranker selection
    pub reranker: RerankerChoice,
    /// Enable the refine (query-expansion) pipeline
    pub refine: bool,
    /// Per-domain caps applied by the unified refine rerank
    pub refine_book_limit: usize,
    pub refine_ayah_limit: usize,
    pub refine_hadith_limit: usize,
    /// Quran translation edition slug
    pub quran_edition: Option<String>,
    /// Hadith translation language code
    pub hadith_language: Option<String>,
    /// Language for page-content translations (None = skip)
    pub page_content_language: Option<String>,
    /// Embedding model for the semantic branch
    pub embedding_model: EmbeddingModel,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            query: String::new(),
            mode: SearchMode::Hybrid,
            include_books: true,
            include_quran: true,
            include_hadith: true,
            limit: 20,
            ayah_limit: 10,
            hadith_limit: 10,
            book_id: None,
            per_book_limit: None,
            similarity_threshold: 0.2,
            reranker: RerankerChoice::None,
            refine: false,
            refine_book_limit: 15,
            refine_ayah_limit: 8,
            refine_hadith_limit: 8,
            quran_edition: None,
            hadith_language: None,
            page_content_language: None,
            embedding_model: EmbeddingModel::Large3072,
        }
    }
}

impl SearchParams {
    /// Convenience constructor for a plain hybrid search
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// Validate caller input and clamp limits into their bounds
    pub fn validate(&mut self) -> Result<(), Error> {
        if self.query.trim().is_empty() {
            return Err(Error::Validation("query must not be empty".into()));
        }
        if self.query.chars().count() > MAX_QUERY_LEN {
            return Err(Error::Validation(format!(
                "query exceeds {} characters",
                MAX_QUERY_LEN
            )));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(Error::Validation(
                "similarityThreshold must be within [0, 1]".into(),
            ));
        }

        self.limit = self.limit.clamp(BOOK_LIMIT_RANGE.0, BOOK_LIMIT_RANGE.1);
        self.ayah_limit = self
            .ayah_limit
            .clamp(DOMAIN_LIMIT_RANGE.0, DOMAIN_LIMIT_RANGE.1);
        self.hadith_limit = self
            .hadith_limit
            .clamp(DOMAIN_LIMIT_RANGE.0, DOMAIN_LIMIT_RANGE.1);
        self.refine_book_limit = self
            .refine_book_limit
            .clamp(BOOK_LIMIT_RANGE.0, BOOK_LIMIT_RANGE.1);
        self.refine_ayah_limit = self
            .refine_ayah_limit
            .clamp(DOMAIN_LIMIT_RANGE.0, DOMAIN_LIMIT_RANGE.1);
        self.refine_hadith_limit = self
            .refine_hadith_limit
            .clamp(DOMAIN_LIMIT_RANGE.0, DOMAIN_LIMIT_RANGE.1);
        if let Some(per_book) = self.per_book_limit {
            self.per_book_limit = Some(per_book.clamp(1, self.limit));
        }

        Ok(())
    }

    /// Refine applies only in hybrid mode without a book-scope filter
    pub fn refine_eligible(&self) -> bool {
        self.refine && self.mode == SearchMode::Hybrid && self.book_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_query_rejected() {
        let mut params = SearchParams::new("   ");
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_long_query_rejected() {
        let mut params = SearchParams::new("a".repeat(MAX_QUERY_LEN + 1));
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_limits_clamped() {
        let mut params = SearchParams::new("الصلاة");
        params.limit = 500;
        params.ayah_limit = 0;
        params.validate().unwrap();
        assert_eq!(params.limit, BOOK_LIMIT_RANGE.1);
        assert_eq!(params.ayah_limit, DOMAIN_LIMIT_RANGE.0);
    }

    #[test]
    fn test_refine_eligibility() {
        let mut params = SearchParams::new("q");
        params.refine = true;
        assert!(params.refine_eligible());
        params.book_id = Some(12);
        assert!(!params.refine_eligible());
        params.book_id = None;
        params.mode = SearchMode::Keyword;
        assert!(!params.refine_eligible());
    }

    #[test]
    fn test_mode_deserialization() {
        let params: SearchParams =
            serde_json::from_str(r#"{"query":"test","mode":"semantic"}"#).unwrap();
        assert_eq!(params.mode, SearchMode::Semantic);
        assert!(params.include_books);
    }

    #[test]
    fn test_embedding_model_derivation() {
        assert_eq!(EmbeddingModel::Large3072.dim(), 3072);
        assert_eq!(EmbeddingModel::Jina1024.dim(), 1024);
        assert_eq!(EmbeddingModel::Jina1024.collection_suffix(), "_jina");
        assert_eq!(EmbeddingModel::Large3072.cache_prefix(), "");
    }

    #[test]
    fn test_embedding_model_wire_values() {
        let params: SearchParams =
            serde_json::from_str(r#"{"query":"q","embeddingModel":"jina"}"#).unwrap();
        assert_eq!(params.embedding_model, EmbeddingModel::Jina1024);

        // dimension-suffixed spellings are accepted too
        let params: SearchParams =
            serde_json::from_str(r#"{"query":"q","embeddingModel":"large3072"}"#).unwrap();
        assert_eq!(params.embedding_model, EmbeddingModel::Large3072);

        let json = serde_json::to_value(EmbeddingModel::Jina1024).unwrap();
        assert_eq!(json, "jina");
    }
}
