//! Indexed-book-set cache
//!
//! Content-level search is only meaningful for books whose pages are fully
//! present in both engines. Every five minutes the set is recomputed as the
//! intersection of books whose lexical page count and vector point count
//! both reach the metadata store's count, plus the hadith-source books
//! (indexed per hadith, always eligible). Any failure yields None, which
//! callers read as "do not filter".

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;

use maktaba_config::constants::{cache, HADITH_SOURCE_BOOK_IDS, VECTOR_COUNT_BATCH};
use maktaba_core::EmbeddingModel;
use maktaba_persistence::BookStore;

use crate::lexical::LexicalEngine;
use crate::ttl_cache::TtlCache;
use crate::vector::VectorEngine;

const CACHE_KEY: &str = "indexed_books";

/// Cached set of fully indexed book ids
pub struct IndexedBookSet {
    lexical: Arc<dyn LexicalEngine>,
    vector: Arc<dyn VectorEngine>,
    books: Arc<dyn BookStore>,
    cache: TtlCache<String, Arc<Vec<i64>>>,
}

impl IndexedBookSet {
    pub fn new(
        lexical: Arc<dyn LexicalEngine>,
        vector: Arc<dyn VectorEngine>,
        books: Arc<dyn BookStore>,
    ) -> Self {
        Self {
            lexical,
            vector,
            books,
            cache: TtlCache::new(cache::INDEXED_BOOKS_TTL, 4, 1),
        }
    }

    /// The current set, recomputing on cache expiry. None means the
    /// computation failed and content search should run unfiltered.
    pub async fn current(&self) -> Option<Arc<Vec<i64>>> {
        if let Some(cached) = self.cache.get(CACHE_KEY) {
            return Some(cached);
        }

        let set = self.compute().await?;
        let set = Arc::new(set);
        self.cache.set(CACHE_KEY.to_string(), Arc::clone(&set));
        Some(set)
    }

    async fn compute(&self) -> Option<Vec<i64>> {
        let stored_counts = match self.books.page_counts().await {
            Ok(counts) => counts,
            Err(e) => {
                tracing::warn!(error = %e, "Metadata page counts unavailable");
                return None;
            }
        };

        let lexical_counts = self.lexical.page_counts().await?;

        // Books the lexical index fully covers
        let mut candidates: Vec<i64> = stored_counts
            .iter()
            .filter(|(book_id, stored)| {
                lexical_counts.get(book_id).copied().unwrap_or(0) >= **stored
            })
            .map(|(book_id, _)| *book_id)
            .collect();
        candidates.sort_unstable();

        // Vector coverage, checked in concurrent batches
        let mut indexed: HashSet<i64> = HashSet::new();
        for batch in candidates.chunks(VECTOR_COUNT_BATCH) {
            let counts = join_all(batch.iter().map(|&book_id| {
                let vector = Arc::clone(&self.vector);
                async move {
                    vector
                        .count_pages(EmbeddingModel::Large3072, book_id)
                        .await
                        .map(|count| (book_id, count))
                }
            }))
            .await;

            for result in counts {
                match result {
                    Ok((book_id, count)) => {
                        let stored = stored_counts.get(&book_id).copied().unwrap_or(0);
                        if count as i64 >= stored {
                            indexed.insert(book_id);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Vector page count failed");
                        return None;
                    }
                }
            }
        }

        // Hadith-source books are always eligible
        indexed.extend(HADITH_SOURCE_BOOK_IDS.iter().copied());

        let mut set: Vec<i64> = indexed.into_iter().collect();
        set.sort_unstable();
        tracing::debug!(count = set.len(), "Indexed-book set refreshed");
        Some(set)
    }
}
