//! Translation repositories
//!
//! Each lookup is a single batched call: the merger collects every key in
//! the ranked result set and asks once.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::Row;

use crate::{PersistenceError, PgClient};

/// One translated paragraph of a stored page translation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParagraphTranslation {
    /// Paragraph position in the page HTML
    pub index: usize,
    pub translation: String,
}

/// A language-specific translation of one book page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageTranslation {
    pub book_id: i64,
    pub page_number: i64,
    pub language: String,
    /// Ordered by paragraph index
    pub paragraphs: Vec<ParagraphTranslation>,
}

/// Translation access
#[async_trait]
pub trait TranslationStore: Send + Sync {
    /// Ayah translations for the given (surah, ayah) pairs in one edition
    async fn ayah_translations(
        &self,
        pairs: &[(i32, i32)],
        edition: &str,
    ) -> Result<HashMap<(i32, i32), String>, PersistenceError>;

    /// Hadith translations for the given (book_id, hadith_number) pairs
    async fn hadith_translations(
        &self,
        pairs: &[(i64, String)],
        language: &str,
    ) -> Result<HashMap<(i64, String), String>, PersistenceError>;

    /// The stored translation of one page in one language, if any
    async fn page_translation(
        &self,
        book_id: i64,
        page_number: i64,
        language: &str,
    ) -> Result<Option<PageTranslation>, PersistenceError>;
}

/// Postgres-backed translation store
pub struct PgTranslationStore {
    client: PgClient,
}

impl PgTranslationStore {
    pub fn new(client: PgClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TranslationStore for PgTranslationStore {
    async fn ayah_translations(
        &self,
        pairs: &[(i32, i32)],
        edition: &str,
    ) -> Result<HashMap<(i32, i32), String>, PersistenceError> {
        if pairs.is_empty() {
            return Ok(HashMap::new());
        }

        let surahs: Vec<i32> = pairs.iter().map(|(s, _)| *s).collect();
        let ayahs: Vec<i32> = pairs.iter().map(|(_, a)| *a).collect();

        let rows = sqlx::query(
            r#"
            SELECT t.surah_number, t.ayah_number, t.text
            FROM quran_translations t
            JOIN UNNEST($1::int4[], $2::int4[]) AS k(surah, ayah)
              ON t.surah_number = k.surah AND t.ayah_number = k.ayah
            WHERE t.edition = $3
            "#,
        )
        .bind(&surahs)
        .bind(&ayahs)
        .bind(edition)
        .fetch_all(self.client.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    (row.get::<i32, _>("surah_number"), row.get::<i32, _>("ayah_number")),
                    row.get::<String, _>("text"),
                )
            })
            .collect())
    }

    async fn hadith_translations(
        &self,
        pairs: &[(i64, String)],
        language: &str,
    ) -> Result<HashMap<(i64, String), String>, PersistenceError> {
        if pairs.is_empty() {
            return Ok(HashMap::new());
        }

        let book_ids: Vec<i64> = pairs.iter().map(|(b, _)| *b).collect();
        let numbers: Vec<String> = pairs.iter().map(|(_, n)| n.clone()).collect();

        let rows = sqlx::query(
            r#"
            SELECT t.book_id, t.hadith_number, t.text
            FROM hadith_translations t
            JOIN UNNEST($1::int8[], $2::text[]) AS k(book_id, hadith_number)
              ON t.book_id = k.book_id AND t.hadith_number = k.hadith_number
            WHERE t.language = $3
            "#,
        )
        .bind(&book_ids)
        .bind(&numbers)
        .bind(language)
        .fetch_all(self.client.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    (row.get::<i64, _>("book_id"), row.get::<String, _>("hadith_number")),
                    row.get::<String, _>("text"),
                )
            })
            .collect())
    }

    async fn page_translation(
        &self,
        book_id: i64,
        page_number: i64,
        language: &str,
    ) -> Result<Option<PageTranslation>, PersistenceError> {
        let row = sqlx::query(
            r#"
            SELECT paragraphs
            FROM page_translations
            WHERE book_id = $1 AND page_number = $2 AND language = $3
            "#,
        )
        .bind(book_id)
        .bind(page_number)
        .bind(language)
        .fetch_optional(self.client.pool())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let raw: serde_json::Value = row.get("paragraphs");
        let paragraphs: Vec<ParagraphTranslation> = serde_json::from_value(raw)
            .map_err(|e| PersistenceError::Decode(format!("page_translations.paragraphs: {}", e)))?;

        Ok(Some(PageTranslation {
            book_id,
            page_number,
            language: language.to_string(),
            paragraphs,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paragraph_translation_decoding() {
        let raw = serde_json::json!([
            {"index": 0, "translation": "In the name of God"},
            {"index": 2, "translation": "Praise be to God"}
        ]);
        let decoded: Vec<ParagraphTranslation> = serde_json::from_value(raw).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[1].index, 2);
    }
}
