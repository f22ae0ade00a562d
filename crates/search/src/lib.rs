//! Hybrid search core
//!
//! Features:
//! - Dense vector search via Qdrant across three content collections
//! - BM25 search via the external inverted-index service
//! - Weighted score fusion with an RRF tie-breaker
//! - Multi-query weighted dedupe for the refine pipeline
//! - Two-tier embedding cache (bounded TTL memory + Postgres)
//! - In-flight request coalescing for expensive translations
//! - LLM listwise reranking (single-domain and unified tri-domain)
//! - LLM query expansion with per-expansion weights
//! - Translation merging with a paragraph-match heuristic for page content
//! - Graph side-channel context with post-hoc ayah boosts

pub mod embedding;
pub mod expand;
pub mod fusion;
pub mod graph;
pub mod indexed_books;
pub mod inflight;
pub mod lexical;
pub mod orchestrator;
pub mod remote_embeddings;
pub mod rerank;
pub mod translate;
pub mod ttl_cache;
pub mod vector;

pub use embedding::{EmbeddingBackend, EmbeddingProvider, TextEmbedder};
pub use expand::QueryExpander;
pub use fusion::{dedupe_weighted, fuse_ayahs, fuse_books, fuse_hadiths, normalize_bm25};
pub use graph::GraphResolver;
pub use indexed_books::IndexedBookSet;
pub use inflight::InflightMap;
pub use lexical::{LexicalClient, LexicalEngine, LexicalOutcome};
pub use orchestrator::{SearchPipeline, SearchPipelineConfig};
pub use remote_embeddings::{JinaEmbeddingBackend, OpenAiEmbeddingBackend};
pub use rerank::{RerankOutcome, Reranker};
pub use translate::TranslationMerger;
pub use ttl_cache::{CacheStats, TtlCache};
pub use vector::{VectorClient, VectorEngine};

use std::time::Duration;

use async_trait::async_trait;
use maktaba_llm::OpenRouterClient;
use thiserror::Error;

/// Search pipeline errors
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    /// The requested vector collection does not exist
    #[error("Collection not found")]
    CollectionNotFound,

    #[error("Lexical engine error: {0}")]
    Lexical(String),

    #[error("LLM error: {0}")]
    Llm(#[from] maktaba_llm::LlmError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] maktaba_persistence::PersistenceError),

    #[error("Graph service error: {0}")]
    Graph(String),
}

impl From<SearchError> for maktaba_core::Error {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::CollectionNotFound => maktaba_core::Error::CollectionNotFound,
            other => maktaba_core::Error::Internal(other.to_string()),
        }
    }
}

/// Chat completion seam used by the reranker and query expander.
///
/// The production implementation is [`maktaba_llm::OpenRouterClient`]; tests
/// substitute canned responses.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        model: &str,
        messages: &[maktaba_llm::ChatMessage],
        temperature: f32,
        deadline: Duration,
    ) -> Result<String, maktaba_llm::LlmError>;
}

#[async_trait]
impl ChatModel for maktaba_llm::OpenRouterClient {
    async fn complete(
        &self,
        model: &str,
        messages: &[maktaba_llm::ChatMessage],
        temperature: f32,
        deadline: Duration,
    ) -> Result<String, maktaba_llm::LlmError> {
        OpenRouterClient::complete(self, model, messages, temperature, deadline).await
    }
}
