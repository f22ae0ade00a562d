//! Persistent tier of the embedding cache
//!
//! A keyed blob store: key = text (model-prefixed for the secondary
//! back-end), value = the packed little-endian f32 vector. The cache is a
//! hint only; recomputation on miss is always correct, so decode failures
//! degrade to misses.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::Row;

use crate::{PersistenceError, PgClient};

/// Persistent embedding storage
#[async_trait]
pub trait EmbeddingCacheStore: Send + Sync {
    /// Fetch stored vectors for the given keys in one call
    async fn get_many(
        &self,
        keys: &[String],
    ) -> Result<HashMap<String, Vec<f32>>, PersistenceError>;

    /// Store vectors; existing keys are overwritten
    async fn set_many(&self, entries: &[(String, Vec<f32>)]) -> Result<(), PersistenceError>;
}

/// Pack a vector as little-endian f32 bytes
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Unpack a little-endian f32 byte blob; None if the length is not a
/// multiple of four
pub fn decode_vector(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

/// Postgres-backed embedding cache
pub struct PgEmbeddingCache {
    client: PgClient,
}

impl PgEmbeddingCache {
    pub fn new(client: PgClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EmbeddingCacheStore for PgEmbeddingCache {
    async fn get_many(
        &self,
        keys: &[String],
    ) -> Result<HashMap<String, Vec<f32>>, PersistenceError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query(
            "SELECT key, vector FROM embedding_cache WHERE key = ANY($1)",
        )
        .bind(keys)
        .fetch_all(self.client.pool())
        .await?;

        let mut hits = HashMap::with_capacity(rows.len());
        for row in rows {
            let key: String = row.get("key");
            let blob: Vec<u8> = row.get("vector");
            match decode_vector(&blob) {
                Some(vector) => {
                    hits.insert(key, vector);
                }
                None => {
                    tracing::warn!(key = %key, "Corrupt embedding blob, treating as miss");
                }
            }
        }
        Ok(hits)
    }

    async fn set_many(&self, entries: &[(String, Vec<f32>)]) -> Result<(), PersistenceError> {
        if entries.is_empty() {
            return Ok(());
        }

        let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
        let blobs: Vec<Vec<u8>> = entries.iter().map(|(_, v)| encode_vector(v)).collect();

        sqlx::query(
            r#"
            INSERT INTO embedding_cache (key, vector)
            SELECT * FROM UNNEST($1::text[], $2::bytea[])
            ON CONFLICT (key) DO UPDATE SET vector = EXCLUDED.vector
            "#,
        )
        .bind(&keys)
        .bind(&blobs)
        .execute(self.client.pool())
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_round_trip() {
        let vector = vec![0.25f32, -1.5, 3.125, 0.0];
        let decoded = decode_vector(&encode_vector(&vector)).unwrap();
        assert_eq!(decoded, vector);
    }

    #[test]
    fn test_truncated_blob_is_miss() {
        assert!(decode_vector(&[0, 1, 2]).is_none());
    }

    #[test]
    fn test_empty_blob_decodes_empty() {
        assert_eq!(decode_vector(&[]).unwrap(), Vec::<f32>::new());
    }
}
