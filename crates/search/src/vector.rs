//! Vector engine adapter
//!
//! ANN search over the three content collections in Qdrant. Collection
//! names derive from the embedding model so the two vector spaces never
//! mix. Scores are cosine-similarity-like in [0, 1] and pass through
//! untouched.

use async_trait::async_trait;
use qdrant_client::{
    qdrant::{
        r#match::MatchValue, value::Kind, Condition, CountPointsBuilder, FieldCondition, Filter,
        Match, RepeatedIntegers, ScoredPoint, SearchPointsBuilder,
    },
    Qdrant,
};

use maktaba_config::constants::deadlines;
use maktaba_config::VectorConfig;
use maktaba_core::EmbeddingModel;

use crate::SearchError;

const PAGES_COLLECTION: &str = "book_pages";
const AYAHS_COLLECTION: &str = "quran_ayahs";
const HADITHS_COLLECTION: &str = "hadiths";

/// Collection name for a domain under the given embedding model
pub fn collection_name(base: &str, model: EmbeddingModel) -> String {
    format!("{}{}", base, model.collection_suffix())
}

/// A semantic page hit
#[derive(Debug, Clone)]
pub struct SemanticPageHit {
    pub book_id: i64,
    pub page_number: i64,
    pub snippet: String,
    pub score: f32,
}

/// A semantic ayah hit
#[derive(Debug, Clone)]
pub struct SemanticAyahHit {
    pub surah_number: i32,
    pub ayah_number: i32,
    pub ayah_end: Option<i32>,
    pub text: String,
    pub score: f32,
}

/// A semantic hadith hit
#[derive(Debug, Clone)]
pub struct SemanticHadithHit {
    pub collection: String,
    pub hadith_number: String,
    pub book_id: i64,
    pub text: String,
    pub chapter: Option<String>,
    pub score: f32,
}

/// Vector engine access
#[async_trait]
pub trait VectorEngine: Send + Sync {
    async fn search_pages(
        &self,
        embedding: &[f32],
        model: EmbeddingModel,
        limit: usize,
        score_threshold: f32,
        book_filter: Option<&[i64]>,
    ) -> Result<Vec<SemanticPageHit>, SearchError>;

    async fn search_ayahs(
        &self,
        embedding: &[f32],
        model: EmbeddingModel,
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<SemanticAyahHit>, SearchError>;

    async fn search_hadiths(
        &self,
        embedding: &[f32],
        model: EmbeddingModel,
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<SemanticHadithHit>, SearchError>;

    /// Stored point count for one book in the pages collection
    async fn count_pages(&self, model: EmbeddingModel, book_id: i64)
        -> Result<u64, SearchError>;
}

/// Qdrant-backed vector engine
pub struct VectorClient {
    client: Qdrant,
}

impl VectorClient {
    pub fn new(config: &VectorConfig) -> Result<Self, SearchError> {
        let mut builder = Qdrant::from_url(&config.url);
        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
        }

        let client = builder
            .build()
            .map_err(|e| SearchError::VectorStore(e.to_string()))?;

        Ok(Self { client })
    }

    async fn search_collection(
        &self,
        collection: String,
        embedding: &[f32],
        limit: usize,
        score_threshold: f32,
        filter: Option<Filter>,
    ) -> Result<Vec<ScoredPoint>, SearchError> {
        let mut builder =
            SearchPointsBuilder::new(&collection, embedding.to_vec(), limit as u64)
                .with_payload(true)
                .score_threshold(score_threshold);

        if let Some(filter) = filter {
            builder = builder.filter(filter);
        }

        let response = tokio::time::timeout(deadlines::SEMANTIC, self.client.search_points(builder))
            .await
            .map_err(|_| SearchError::VectorStore(format!("{} search timed out", collection)))?
            .map_err(|e| map_qdrant_error(&collection, e))?;

        Ok(response.result)
    }
}

/// Missing collections are the one remote failure promoted to the caller
fn map_qdrant_error(collection: &str, error: qdrant_client::QdrantError) -> SearchError {
    let message = error.to_string();
    let lowered = message.to_lowercase();
    if lowered.contains("not found") || lowered.contains("doesn't exist") {
        tracing::error!(collection, "Vector collection missing");
        SearchError::CollectionNotFound
    } else {
        SearchError::VectorStore(message)
    }
}

fn book_filter_condition(book_ids: &[i64]) -> Filter {
    Filter {
        must: vec![Condition {
            condition_one_of: Some(qdrant_client::qdrant::condition::ConditionOneOf::Field(
                FieldCondition {
                    key: "book_id".to_string(),
                    r#match: Some(Match {
                        match_value: Some(MatchValue::Integers(RepeatedIntegers {
                            integers: book_ids.to_vec(),
                        })),
                    }),
                    ..Default::default()
                },
            )),
        }],
        ..Default::default()
    }
}

fn payload_i64(point: &ScoredPoint, field: &str) -> Option<i64> {
    match point.payload.get(field)?.kind.as_ref()? {
        Kind::IntegerValue(n) => Some(*n),
        Kind::StringValue(s) => s.parse().ok(),
        _ => None,
    }
}

fn payload_str(point: &ScoredPoint, field: &str) -> Option<String> {
    match point.payload.get(field)?.kind.as_ref()? {
        Kind::StringValue(s) => Some(s.clone()),
        _ => None,
    }
}

#[async_trait]
impl VectorEngine for VectorClient {
    async fn search_pages(
        &self,
        embedding: &[f32],
        model: EmbeddingModel,
        limit: usize,
        score_threshold: f32,
        book_filter: Option<&[i64]>,
    ) -> Result<Vec<SemanticPageHit>, SearchError> {
        let filter = book_filter.map(book_filter_condition);
        let points = self
            .search_collection(
                collection_name(PAGES_COLLECTION, model),
                embedding,
                limit,
                score_threshold,
                filter,
            )
            .await?;

        Ok(points
            .into_iter()
            .filter_map(|point| {
                Some(SemanticPageHit {
                    book_id: payload_i64(&point, "book_id")?,
                    page_number: payload_i64(&point, "page_number")?,
                    snippet: payload_str(&point, "text").unwrap_or_default(),
                    score: point.score,
                })
            })
            .collect())
    }

    async fn search_ayahs(
        &self,
        embedding: &[f32],
        model: EmbeddingModel,
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<SemanticAyahHit>, SearchError> {
        let points = self
            .search_collection(
                collection_name(AYAHS_COLLECTION, model),
                embedding,
                limit,
                score_threshold,
                None,
            )
            .await?;

        Ok(points
            .into_iter()
            .filter_map(|point| {
                Some(SemanticAyahHit {
                    surah_number: payload_i64(&point, "surah_number")? as i32,
                    ayah_number: payload_i64(&point, "ayah_number")? as i32,
                    ayah_end: payload_i64(&point, "ayah_end").map(|n| n as i32),
                    text: payload_str(&point, "text").unwrap_or_default(),
                    score: point.score,
                })
            })
            .collect())
    }

    async fn search_hadiths(
        &self,
        embedding: &[f32],
        model: EmbeddingModel,
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<SemanticHadithHit>, SearchError> {
        let points = self
            .search_collection(
                collection_name(HADITHS_COLLECTION, model),
                embedding,
                limit,
                score_threshold,
                None,
            )
            .await?;

        Ok(points
            .into_iter()
            .filter_map(|point| {
                Some(SemanticHadithHit {
                    collection: payload_str(&point, "collection")?,
                    hadith_number: payload_str(&point, "hadith_number")?,
                    book_id: payload_i64(&point, "book_id").unwrap_or(0),
                    text: payload_str(&point, "text").unwrap_or_default(),
                    chapter: payload_str(&point, "chapter"),
                    score: point.score,
                })
            })
            .collect())
    }

    async fn count_pages(
        &self,
        model: EmbeddingModel,
        book_id: i64,
    ) -> Result<u64, SearchError> {
        let collection = collection_name(PAGES_COLLECTION, model);
        let builder = CountPointsBuilder::new(&collection)
            .filter(book_filter_condition(&[book_id]))
            .exact(false);

        let response = tokio::time::timeout(deadlines::SEMANTIC, self.client.count(builder))
            .await
            .map_err(|_| SearchError::VectorStore(format!("{} count timed out", collection)))?
            .map_err(|e| map_qdrant_error(&collection, e))?;

        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_names_derive_from_model() {
        assert_eq!(collection_name(PAGES_COLLECTION, EmbeddingModel::Large3072), "book_pages");
        assert_eq!(collection_name(PAGES_COLLECTION, EmbeddingModel::Jina1024), "book_pages_jina");
        assert_eq!(collection_name(AYAHS_COLLECTION, EmbeddingModel::Jina1024), "quran_ayahs_jina");
    }

    #[test]
    fn test_book_filter_shape() {
        let filter = book_filter_condition(&[3, 7]);
        assert_eq!(filter.must.len(), 1);
    }
}
