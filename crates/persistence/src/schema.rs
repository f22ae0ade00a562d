//! Schema for the tables this service owns
//!
//! Book, page and translation tables are populated by the import pipeline
//! and assumed present. Only the embedding cache and the analytics sink
//! belong to the search service itself.

use crate::{PersistenceError, PgClient};

/// Create the service-owned tables if they do not exist
pub async fn ensure_tables(client: &PgClient) -> Result<(), PersistenceError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS embedding_cache (
            key TEXT PRIMARY KEY,
            vector BYTEA NOT NULL
        )
        "#,
    )
    .execute(client.pool())
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS search_events (
            id UUID PRIMARY KEY,
            query TEXT NOT NULL,
            mode TEXT NOT NULL,
            refined BOOLEAN NOT NULL DEFAULT FALSE,
            result_count BIGINT NOT NULL,
            ayah_count BIGINT NOT NULL,
            hadith_count BIGINT NOT NULL,
            duration_ms BIGINT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(client.pool())
    .await?;

    tracing::info!("Service-owned tables ensured");
    Ok(())
}
