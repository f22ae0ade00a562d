//! Centralized constants for the search pipeline
//!
//! Single source of truth for fusion math, cache lifetimes and outbound
//! deadlines. Endpoint defaults live in [`settings`](crate::settings) where
//! they can be overridden per environment.

/// Result fusion tuning
pub mod fusion {
    /// Reciprocal Rank Fusion constant
    pub const RRF_K: f32 = 60.0;

    /// Saturation constant mapping raw BM25 into [0, 1): s / (s + K)
    pub const BM25_NORM_K: f32 = 8.0;

    /// Weight of the semantic score when both engines found an item.
    /// Together with KEYWORD_WEIGHT the sum exceeds 1.0 so dual-engine
    /// hits outrank single-engine hits of equal strength.
    pub const SEMANTIC_WEIGHT: f32 = 0.8;

    /// Weight of the normalized BM25 score when both engines found an item
    pub const KEYWORD_WEIGHT: f32 = 0.3;

    /// Fused scores closer than this are ordered by RRF instead
    pub const TIE_EPSILON: f32 = 0.001;
}

/// Cache lifetimes and bounds
pub mod cache {
    use std::time::Duration;

    /// Memory tier of the embedding cache
    pub const EMBEDDING_TTL: Duration = Duration::from_secs(24 * 60 * 60);
    pub const EMBEDDING_MAX_ENTRIES: usize = 10_000;

    /// Query-expansion cache
    pub const EXPANSION_TTL: Duration = Duration::from_secs(10 * 60);
    pub const EXPANSION_MAX_ENTRIES: usize = 1_000;

    /// Indexed-book-set cache
    pub const INDEXED_BOOKS_TTL: Duration = Duration::from_secs(5 * 60);

    /// Entries evicted together when a cache reaches its bound
    pub const EVICTION_BATCH: usize = 100;
}

/// Outbound call deadlines
pub mod deadlines {
    use std::time::Duration;

    pub const LEXICAL: Duration = Duration::from_secs(5);
    pub const SEMANTIC: Duration = Duration::from_secs(5);
    /// Per attempt; the retry series may run longer
    pub const EMBEDDING: Duration = Duration::from_secs(15);
    pub const RERANK_FAST: Duration = Duration::from_secs(15);
    pub const RERANK: Duration = Duration::from_secs(20);
    pub const RERANK_UNIFIED: Duration = Duration::from_secs(25);
    pub const EXPANSION: Duration = Duration::from_secs(10);
    pub const GRAPH: Duration = Duration::from_secs(3);
    /// Whole-request deadline, enforced at the HTTP layer
    pub const REQUEST: Duration = Duration::from_secs(30);
}

/// Embedding API retry policy (HTTP 429 only)
pub mod backoff {
    /// Base delay in milliseconds; doubles per attempt
    pub const BASE_MS: u64 = 3_000;
    /// Ceiling on a single delay
    pub const MAX_MS: u64 = 60_000;
    /// Attempts before giving up
    pub const MAX_ATTEMPTS: u32 = 8;
}

/// Refine-mode tuning
pub mod refine {
    /// Lexical candidates fetched per query variant per domain
    pub const LEXICAL_PER_VARIANT: usize = 30;
    /// Semantic candidates fetched per query variant per domain
    pub const SEMANTIC_PER_VARIANT: usize = 60;
    /// Similarity cutoff applied before dedupe
    pub const SIMILARITY_CUTOFF: f32 = 0.25;
    /// Maximum paraphrases requested from the expander
    pub const MAX_EXPANSIONS: usize = 4;
}

/// Books whose content is indexed per-hadith rather than per-page.
/// Always eligible for content search regardless of page-count checks.
pub const HADITH_SOURCE_BOOK_IDS: &[i64] = &[1681, 1682, 1683, 1684, 1685, 1686];

/// Batch size for per-book vector-store count queries
pub const VECTOR_COUNT_BATCH: usize = 20;

/// Candidate texts are truncated to this many characters in rerank prompts
pub const RERANK_TEXT_MAX_CHARS: usize = 800;
