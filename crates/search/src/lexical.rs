//! Lexical engine adapter
//!
//! BM25 queries against the external inverted-index service, one index per
//! content domain plus the book/author metadata indexes. A back-end failure
//! is not an error here: it degrades to [`LexicalOutcome::Unavailable`] so
//! callers can fall back to the metadata store, and the pipeline proceeds.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use maktaba_config::constants::deadlines;
use maktaba_config::LexicalConfig;
use maktaba_core::{Query, Script};

use crate::SearchError;

/// Result of a lexical call: a hit list, or a signal that the engine could
/// not answer and the caller should fall back
#[derive(Debug, Clone)]
pub enum LexicalOutcome<T> {
    Available(Vec<T>),
    Unavailable,
}

impl<T> LexicalOutcome<T> {
    /// Hits, treating an unavailable engine as empty
    pub fn into_hits(self) -> Vec<T> {
        match self {
            LexicalOutcome::Available(hits) => hits,
            LexicalOutcome::Unavailable => Vec::new(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, LexicalOutcome::Unavailable)
    }
}

/// A BM25 page hit
#[derive(Debug, Clone)]
pub struct PageHit {
    pub book_id: i64,
    pub page_number: i64,
    pub snippet: String,
    pub highlight: Option<String>,
    pub bm25: f32,
}

/// A BM25 ayah hit
#[derive(Debug, Clone)]
pub struct AyahHit {
    pub surah_number: i32,
    pub ayah_number: i32,
    pub ayah_end: Option<i32>,
    pub text: String,
    pub bm25: f32,
}

/// A BM25 hadith hit
#[derive(Debug, Clone)]
pub struct HadithHit {
    pub collection: String,
    pub hadith_number: String,
    pub book_id: i64,
    pub text: String,
    pub chapter: Option<String>,
    pub bm25: f32,
}

/// A book metadata hit
#[derive(Debug, Clone)]
pub struct BookMetaHit {
    pub book_id: i64,
    pub title_arabic: String,
    pub title_latin: Option<String>,
    pub author_name: Option<String>,
    pub score: f32,
}

/// An author metadata hit
#[derive(Debug, Clone)]
pub struct AuthorMetaHit {
    pub author_id: i64,
    pub name_arabic: String,
    pub name_latin: Option<String>,
    pub death_year: Option<i32>,
    pub score: f32,
}

/// Lexical engine access
#[async_trait]
pub trait LexicalEngine: Send + Sync {
    async fn search_pages(
        &self,
        query: &Query,
        limit: usize,
        book_filter: Option<&[i64]>,
    ) -> LexicalOutcome<PageHit>;

    async fn search_ayahs(&self, query: &Query, limit: usize) -> LexicalOutcome<AyahHit>;

    async fn search_hadiths(&self, query: &Query, limit: usize) -> LexicalOutcome<HadithHit>;

    async fn search_books(&self, query: &Query, limit: usize) -> LexicalOutcome<BookMetaHit>;

    async fn search_authors(&self, query: &Query, limit: usize) -> LexicalOutcome<AuthorMetaHit>;

    /// Per-book page counts in the content index; None when the engine
    /// cannot answer
    async fn page_counts(&self) -> Option<HashMap<i64, i64>>;
}

// =============================================================================
// Query body construction (pure, unit-tested)
// =============================================================================

/// Exact-id boost union prefix-id match for numeric queries
fn numeric_meta_query(query: &str) -> Value {
    json!({
        "bool": {
            "should": [
                { "term": { "id": { "value": query, "boost": 100.0 } } },
                { "prefix": { "id": { "value": query, "boost": 10.0 } } }
            ]
        }
    })
}

fn book_meta_query(query: &Query) -> Value {
    match query.script {
        Script::Numeric => numeric_meta_query(&query.normalized),
        Script::Arabic => json!({
            "multi_match": {
                "query": query.normalized,
                "fields": ["title_arabic^3", "title_arabic.exact^2", "author_name_arabic"],
                "fuzziness": "AUTO"
            }
        }),
        Script::Latin => json!({
            "multi_match": {
                "query": query.normalized,
                "fields": ["title_latin^3", "author_name_latin"],
                "fuzziness": "AUTO"
            }
        }),
    }
}

fn author_meta_query(query: &Query) -> Value {
    match query.script {
        Script::Numeric => numeric_meta_query(&query.normalized),
        Script::Arabic => json!({
            "multi_match": {
                "query": query.normalized,
                "fields": [
                    "name_arabic^3", "name_arabic.exact^2",
                    "kunya^2", "nasab", "nisba^2", "laqab"
                ],
                "fuzziness": "AUTO"
            }
        }),
        Script::Latin => json!({
            "multi_match": {
                "query": query.normalized,
                "fields": ["name_latin^3", "author_name_latin"],
                "fuzziness": "AUTO"
            }
        }),
    }
}

/// Content query over a text field; quoted phrases force phrase-exact
/// matching, everything else gets best-match with fuzzy fallback
fn content_query(query: &Query, field: &str) -> Value {
    if query.has_quoted_phrase {
        let phrases: Vec<Value> = query
            .phrases
            .iter()
            .map(|phrase| json!({ "match_phrase": { field: phrase } }))
            .collect();
        json!({ "bool": { "must": phrases } })
    } else {
        json!({
            "match": {
                field: {
                    "query": query.normalized,
                    "fuzziness": "AUTO"
                }
            }
        })
    }
}

fn page_search_body(query: &Query, limit: usize, book_filter: Option<&[i64]>) -> Value {
    let mut bool_query = json!({ "must": [content_query(query, "text")] });
    if let Some(book_ids) = book_filter {
        bool_query["filter"] = json!([{ "terms": { "book_id": book_ids } }]);
    }
    json!({
        "query": { "bool": bool_query },
        "size": limit,
        "highlight": { "fields": { "text": {} } }
    })
}

// =============================================================================
// HTTP client
// =============================================================================

#[derive(Debug, Deserialize)]
struct EsResponse {
    hits: EsHits,
    #[serde(default)]
    aggregations: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct EsHits {
    hits: Vec<EsHit>,
}

#[derive(Debug, Deserialize)]
struct EsHit {
    #[serde(rename = "_score")]
    score: Option<f32>,
    #[serde(rename = "_source")]
    source: Value,
    highlight: Option<HashMap<String, Vec<String>>>,
}

/// reqwest-backed lexical engine client
pub struct LexicalClient {
    client: Client,
    config: LexicalConfig,
}

impl LexicalClient {
    pub fn new(config: LexicalConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    async fn search_raw(&self, index: &str, body: Value) -> Result<EsResponse, SearchError> {
        let url = format!("{}/{}/_search", self.config.url.trim_end_matches('/'), index);

        let mut request = self.client.post(&url).json(&body);
        if let Some(ref api_key) = self.config.api_key {
            request = request.header("authorization", format!("ApiKey {}", api_key));
        }

        let response = tokio::time::timeout(deadlines::LEXICAL, request.send())
            .await
            .map_err(|_| SearchError::Lexical(format!("{} search timed out", index)))?
            .map_err(|e| SearchError::Lexical(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SearchError::Lexical(format!("HTTP {}: {}", status, error_text)));
        }

        response
            .json()
            .await
            .map_err(|e| SearchError::Lexical(format!("bad response: {}", e)))
    }

    /// Run a search, folding any failure into Unavailable
    async fn search_index<T>(
        &self,
        index: &str,
        body: Value,
        map_hit: impl Fn(EsHit) -> Option<T>,
    ) -> LexicalOutcome<T> {
        match self.search_raw(index, body).await {
            Ok(response) => LexicalOutcome::Available(
                response.hits.hits.into_iter().filter_map(map_hit).collect(),
            ),
            Err(e) => {
                tracing::warn!(index, error = %e, "Lexical engine unavailable");
                LexicalOutcome::Unavailable
            }
        }
    }
}

fn field_i64(source: &Value, field: &str) -> Option<i64> {
    source.get(field)?.as_i64()
}

fn field_str(source: &Value, field: &str) -> Option<String> {
    source.get(field)?.as_str().map(str::to_string)
}

#[async_trait]
impl LexicalEngine for LexicalClient {
    async fn search_pages(
        &self,
        query: &Query,
        limit: usize,
        book_filter: Option<&[i64]>,
    ) -> LexicalOutcome<PageHit> {
        if query.normalized.is_empty() {
            return LexicalOutcome::Available(Vec::new());
        }

        let body = page_search_body(query, limit, book_filter);
        self.search_index(&self.config.pages_index, body, |hit| {
            Some(PageHit {
                book_id: field_i64(&hit.source, "book_id")?,
                page_number: field_i64(&hit.source, "page_number")?,
                snippet: field_str(&hit.source, "text").unwrap_or_default(),
                highlight: hit
                    .highlight
                    .as_ref()
                    .and_then(|h| h.get("text"))
                    .and_then(|fragments| fragments.first().cloned()),
                bm25: hit.score.unwrap_or(0.0),
            })
        })
        .await
    }

    async fn search_ayahs(&self, query: &Query, limit: usize) -> LexicalOutcome<AyahHit> {
        if query.normalized.is_empty() {
            return LexicalOutcome::Available(Vec::new());
        }

        let body = json!({
            "query": content_query(query, "text"),
            "size": limit
        });
        self.search_index(&self.config.ayahs_index, body, |hit| {
            Some(AyahHit {
                surah_number: field_i64(&hit.source, "surah_number")? as i32,
                ayah_number: field_i64(&hit.source, "ayah_number")? as i32,
                ayah_end: field_i64(&hit.source, "ayah_end").map(|n| n as i32),
                text: field_str(&hit.source, "text").unwrap_or_default(),
                bm25: hit.score.unwrap_or(0.0),
            })
        })
        .await
    }

    async fn search_hadiths(&self, query: &Query, limit: usize) -> LexicalOutcome<HadithHit> {
        if query.normalized.is_empty() {
            return LexicalOutcome::Available(Vec::new());
        }

        let body = json!({
            "query": content_query(query, "text"),
            "size": limit
        });
        self.search_index(&self.config.hadiths_index, body, |hit| {
            Some(HadithHit {
                collection: field_str(&hit.source, "collection")?,
                hadith_number: field_str(&hit.source, "hadith_number")?,
                book_id: field_i64(&hit.source, "book_id").unwrap_or(0),
                text: field_str(&hit.source, "text").unwrap_or_default(),
                chapter: field_str(&hit.source, "chapter"),
                bm25: hit.score.unwrap_or(0.0),
            })
        })
        .await
    }

    async fn search_books(&self, query: &Query, limit: usize) -> LexicalOutcome<BookMetaHit> {
        if query.normalized.is_empty() {
            return LexicalOutcome::Available(Vec::new());
        }

        let body = json!({ "query": book_meta_query(query), "size": limit });
        self.search_index(&self.config.books_index, body, |hit| {
            Some(BookMetaHit {
                book_id: field_i64(&hit.source, "id")?,
                title_arabic: field_str(&hit.source, "title_arabic").unwrap_or_default(),
                title_latin: field_str(&hit.source, "title_latin"),
                author_name: field_str(&hit.source, "author_name_arabic"),
                score: hit.score.unwrap_or(0.0),
            })
        })
        .await
    }

    async fn search_authors(&self, query: &Query, limit: usize) -> LexicalOutcome<AuthorMetaHit> {
        if query.normalized.is_empty() {
            return LexicalOutcome::Available(Vec::new());
        }

        let body = json!({ "query": author_meta_query(query), "size": limit });
        self.search_index(&self.config.authors_index, body, |hit| {
            Some(AuthorMetaHit {
                author_id: field_i64(&hit.source, "id")?,
                name_arabic: field_str(&hit.source, "name_arabic").unwrap_or_default(),
                name_latin: field_str(&hit.source, "name_latin"),
                death_year: field_i64(&hit.source, "death_year").map(|y| y as i32),
                score: hit.score.unwrap_or(0.0),
            })
        })
        .await
    }

    async fn page_counts(&self) -> Option<HashMap<i64, i64>> {
        let body = json!({
            "size": 0,
            "aggs": { "by_book": { "terms": { "field": "book_id", "size": 20000 } } }
        });

        match self.search_raw(&self.config.pages_index, body).await {
            Ok(response) => {
                let buckets = response
                    .aggregations
                    .as_ref()?
                    .get("by_book")?
                    .get("buckets")?
                    .as_array()?
                    .clone();

                let mut counts = HashMap::with_capacity(buckets.len());
                for bucket in buckets {
                    if let (Some(key), Some(count)) = (
                        bucket.get("key").and_then(Value::as_i64),
                        bucket.get("doc_count").and_then(Value::as_i64),
                    ) {
                        counts.insert(key, count);
                    }
                }
                Some(counts)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Page-count aggregation failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maktaba_text::analyze;

    #[test]
    fn test_numeric_query_boosts() {
        let body = numeric_meta_query("1681");
        let should = &body["bool"]["should"];
        assert_eq!(should[0]["term"]["id"]["boost"], 100.0);
        assert_eq!(should[1]["prefix"]["id"]["boost"], 10.0);
    }

    #[test]
    fn test_arabic_book_fields() {
        let query = analyze("صحيح البخاري");
        let body = book_meta_query(&query);
        let fields = body["multi_match"]["fields"].as_array().unwrap();
        assert_eq!(fields[0], "title_arabic^3");
        assert_eq!(fields[1], "title_arabic.exact^2");
        assert_eq!(body["multi_match"]["fuzziness"], "AUTO");
    }

    #[test]
    fn test_author_fields_include_kunya_and_nisba() {
        let query = analyze("ابن تيمية");
        let body = author_meta_query(&query);
        let fields = body["multi_match"]["fields"].as_array().unwrap();
        assert!(fields.iter().any(|f| f == "kunya^2"));
        assert!(fields.iter().any(|f| f == "nisba^2"));
        assert!(fields.iter().any(|f| f == "nasab"));
    }

    #[test]
    fn test_latin_book_fields() {
        let query = analyze("sahih bukhari");
        let body = book_meta_query(&query);
        let fields = body["multi_match"]["fields"].as_array().unwrap();
        assert_eq!(fields[0], "title_latin^3");
    }

    #[test]
    fn test_quoted_phrase_forces_phrase_match() {
        let query = analyze("\"بسم الله الرحمن الرحيم\"");
        let body = content_query(&query, "text");
        assert!(body["bool"]["must"][0]["match_phrase"]["text"].is_string());
    }

    #[test]
    fn test_unquoted_uses_fuzzy_match() {
        let query = analyze("الصلاة");
        let body = content_query(&query, "text");
        assert_eq!(body["match"]["text"]["fuzziness"], "AUTO");
    }

    #[test]
    fn test_page_body_carries_book_filter() {
        let query = analyze("الصلاة");
        let body = page_search_body(&query, 20, Some(&[3, 7]));
        assert_eq!(body["query"]["bool"]["filter"][0]["terms"]["book_id"][1], 7);
        assert_eq!(body["size"], 20);
    }

    #[test]
    fn test_outcome_into_hits() {
        let available: LexicalOutcome<u32> = LexicalOutcome::Available(vec![1, 2]);
        assert_eq!(available.into_hits(), vec![1, 2]);
        let unavailable: LexicalOutcome<u32> = LexicalOutcome::Unavailable;
        assert!(unavailable.is_unavailable());
        assert!(unavailable.into_hits().is_empty());
    }
}
