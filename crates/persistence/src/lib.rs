//! Postgres persistence layer for the search service
//!
//! Provides typed repository access to:
//! - Book and author metadata (including the SQL LIKE fallback used when
//!   the lexical engine is unavailable)
//! - Translations (ayah, hadith, per-paragraph page content)
//! - The persistent tier of the embedding cache
//! - Fire-and-forget search analytics events

pub mod analytics;
pub mod books;
pub mod client;
pub mod embedding_cache;
pub mod error;
pub mod schema;
pub mod translations;

pub use analytics::{AnalyticsSink, PgAnalyticsSink, SearchEvent};
pub use books::{AuthorRecord, BookMeta, BookStore, PgBookStore};
pub use client::{connect, PgClient};
pub use embedding_cache::{EmbeddingCacheStore, PgEmbeddingCache};
pub use error::PersistenceError;
pub use translations::{
    PageTranslation, ParagraphTranslation, PgTranslationStore, TranslationStore,
};

/// Combined persistence layer with all repositories
pub struct PersistenceLayer {
    pub books: PgBookStore,
    pub translations: PgTranslationStore,
    pub embedding_cache: PgEmbeddingCache,
    pub analytics: PgAnalyticsSink,
}

/// Initialize the persistence layer against a connected pool
pub async fn init(
    config: &maktaba_config::DatabaseConfig,
) -> Result<PersistenceLayer, PersistenceError> {
    let client = connect(config).await?;
    schema::ensure_tables(&client).await?;

    Ok(PersistenceLayer {
        books: PgBookStore::new(client.clone()),
        translations: PgTranslationStore::new(client.clone()),
        embedding_cache: PgEmbeddingCache::new(client.clone()),
        analytics: PgAnalyticsSink::new(client),
    })
}
