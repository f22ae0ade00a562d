//! Book and author metadata repository
//!
//! Also carries the SQL LIKE fallback the orchestrator uses when the
//! lexical engine reports itself unavailable.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::Row;

use crate::{PersistenceError, PgClient};

/// Metadata of one book
#[derive(Debug, Clone)]
pub struct BookMeta {
    pub book_id: i64,
    pub title_arabic: String,
    pub title_latin: Option<String>,
    pub author_name: Option<String>,
    pub page_count: i64,
}

/// Metadata of one author
#[derive(Debug, Clone)]
pub struct AuthorRecord {
    pub author_id: i64,
    pub name_arabic: String,
    pub name_latin: Option<String>,
    pub death_year: Option<i32>,
}

/// Book metadata access
#[async_trait]
pub trait BookStore: Send + Sync {
    /// Metadata for a set of books, keyed by book id
    async fn book_meta(&self, book_ids: &[i64]) -> Result<HashMap<i64, BookMeta>, PersistenceError>;

    /// Stored page count per book, for the indexed-book-set comparison
    async fn page_counts(&self) -> Result<HashMap<i64, i64>, PersistenceError>;

    /// Raw HTML content of one page, used for paragraph matching
    async fn page_content(
        &self,
        book_id: i64,
        page_number: i64,
    ) -> Result<Option<String>, PersistenceError>;

    /// LIKE-based book title search (lexical-engine fallback)
    async fn search_books_like(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<BookMeta>, PersistenceError>;

    /// LIKE-based author name search (lexical-engine fallback)
    async fn search_authors_like(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<AuthorRecord>, PersistenceError>;
}

/// Postgres-backed book store
pub struct PgBookStore {
    client: PgClient,
}

impl PgBookStore {
    pub fn new(client: PgClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BookStore for PgBookStore {
    async fn book_meta(
        &self,
        book_ids: &[i64],
    ) -> Result<HashMap<i64, BookMeta>, PersistenceError> {
        if book_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT b.id, b.title_arabic, b.title_latin, a.name_arabic AS author_name,
                   b.page_count
            FROM books b
            LEFT JOIN authors a ON a.id = b.author_id
            WHERE b.id = ANY($1)
            "#,
        )
        .bind(book_ids)
        .fetch_all(self.client.pool())
        .await?;

        let mut meta = HashMap::with_capacity(rows.len());
        for row in rows {
            let book_id: i64 = row.get("id");
            meta.insert(
                book_id,
                BookMeta {
                    book_id,
                    title_arabic: row.get("title_arabic"),
                    title_latin: row.get("title_latin"),
                    author_name: row.get("author_name"),
                    page_count: row.get("page_count"),
                },
            );
        }
        Ok(meta)
    }

    async fn page_counts(&self) -> Result<HashMap<i64, i64>, PersistenceError> {
        let rows = sqlx::query("SELECT id, page_count FROM books WHERE page_count > 0")
            .fetch_all(self.client.pool())
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get::<i64, _>("id"), row.get::<i64, _>("page_count")))
            .collect())
    }

    async fn page_content(
        &self,
        book_id: i64,
        page_number: i64,
    ) -> Result<Option<String>, PersistenceError> {
        let row = sqlx::query(
            "SELECT content FROM pages WHERE book_id = $1 AND page_number = $2",
        )
        .bind(book_id)
        .bind(page_number)
        .fetch_optional(self.client.pool())
        .await?;

        Ok(row.map(|row| row.get::<String, _>("content")))
    }

    async fn search_books_like(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<BookMeta>, PersistenceError> {
        let pattern = format!("%{}%", query.trim());
        let rows = sqlx::query(
            r#"
            SELECT b.id, b.title_arabic, b.title_latin, a.name_arabic AS author_name,
                   b.page_count
            FROM books b
            LEFT JOIN authors a ON a.id = b.author_id
            WHERE b.title_arabic ILIKE $1 OR b.title_latin ILIKE $1
            ORDER BY b.id
            LIMIT $2
            "#,
        )
        .bind(&pattern)
        .bind(limit as i64)
        .fetch_all(self.client.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| BookMeta {
                book_id: row.get("id"),
                title_arabic: row.get("title_arabic"),
                title_latin: row.get("title_latin"),
                author_name: row.get("author_name"),
                page_count: row.get("page_count"),
            })
            .collect())
    }

    async fn search_authors_like(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<AuthorRecord>, PersistenceError> {
        let pattern = format!("%{}%", query.trim());
        let rows = sqlx::query(
            r#"
            SELECT id, name_arabic, name_latin, death_year
            FROM authors
            WHERE name_arabic ILIKE $1 OR name_latin ILIKE $1
            ORDER BY id
            LIMIT $2
            "#,
        )
        .bind(&pattern)
        .bind(limit as i64)
        .fetch_all(self.client.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| AuthorRecord {
                author_id: row.get("id"),
                name_arabic: row.get("name_arabic"),
                name_latin: row.get("name_latin"),
                death_year: row.get("death_year"),
            })
            .collect())
    }
}
