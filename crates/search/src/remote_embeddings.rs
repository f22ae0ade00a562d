//! Remote embedding back-ends
//!
//! Both services expose the OpenAI-style `/embeddings` surface: a JSON body
//! with `model` and `input`, a response carrying `data[].{index, embedding}`.
//! Responses may arrive out of input order, so rows are realigned by their
//! `index` before use.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use maktaba_config::constants::backoff;
use maktaba_config::constants::deadlines;
use maktaba_core::EmbeddingModel;

use crate::embedding::EmbeddingBackend;
use crate::SearchError;

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedRow>,
}

#[derive(Debug, Deserialize)]
struct EmbedRow {
    index: usize,
    embedding: Vec<f32>,
}

/// Delay before retry `attempt` (0-based), capped
fn backoff_delay(attempt: u32) -> Duration {
    let ms = backoff::BASE_MS
        .saturating_mul(1u64 << attempt.min(16))
        .min(backoff::MAX_MS);
    Duration::from_millis(ms)
}

/// POST one embeddings request with the shared retry policy.
///
/// HTTP 429 backs off exponentially up to the attempt cap; any other
/// non-2xx fails fast. The deadline bounds a single attempt, not the
/// retry series.
async fn post_embeddings(
    client: &Client,
    url: &str,
    api_key: &str,
    model_id: &str,
    texts: &[String],
) -> Result<Vec<Vec<f32>>, SearchError> {
    let request = EmbedRequest {
        model: model_id,
        input: texts,
    };

    let mut attempt: u32 = 0;
    loop {
        let call = client
            .post(url)
            .header("authorization", format!("Bearer {}", api_key))
            .header("content-type", "application/json")
            .json(&request)
            .send();

        let response = tokio::time::timeout(deadlines::EMBEDDING, call)
            .await
            .map_err(|_| {
                SearchError::Embedding(format!("embedding request timed out ({})", model_id))
            })?
            .map_err(|e| SearchError::Embedding(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            attempt += 1;
            if attempt >= backoff::MAX_ATTEMPTS {
                return Err(SearchError::Embedding(format!(
                    "rate limited after {} attempts ({})",
                    attempt, model_id
                )));
            }
            let delay = backoff_delay(attempt - 1);
            tracing::warn!(model = model_id, attempt, delay_ms = delay.as_millis() as u64,
                "Embedding API rate limited, backing off");
            tokio::time::sleep(delay).await;
            continue;
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SearchError::Embedding(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Embedding(format!("bad embedding response: {}", e)))?;

        if parsed.data.len() != texts.len() {
            return Err(SearchError::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        // Rows may be out of order
        let mut rows = parsed.data;
        rows.sort_by_key(|row| row.index);
        return Ok(rows.into_iter().map(|row| row.embedding).collect());
    }
}

/// OpenAI-compatible embeddings back-end (text-embedding-3-large, 3072-d)
pub struct OpenAiEmbeddingBackend {
    client: Client,
    url: String,
    api_key: String,
    max_batch: usize,
}

impl OpenAiEmbeddingBackend {
    pub fn new(endpoint: &str, api_key: impl Into<String>, max_batch: usize) -> Self {
        Self {
            client: Client::new(),
            url: format!("{}/embeddings", endpoint.trim_end_matches('/')),
            api_key: api_key.into(),
            max_batch,
        }
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAiEmbeddingBackend {
    fn model(&self) -> EmbeddingModel {
        EmbeddingModel::Large3072
    }

    fn max_batch(&self) -> usize {
        self.max_batch
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
        post_embeddings(
            &self.client,
            &self.url,
            &self.api_key,
            self.model().model_id(),
            texts,
        )
        .await
    }
}

/// Jina embeddings back-end (jina-embeddings-v3, 1024-d)
pub struct JinaEmbeddingBackend {
    client: Client,
    url: String,
    api_key: String,
    max_batch: usize,
}

impl JinaEmbeddingBackend {
    pub fn new(endpoint: &str, api_key: impl Into<String>, max_batch: usize) -> Self {
        Self {
            client: Client::new(),
            url: format!("{}/embeddings", endpoint.trim_end_matches('/')),
            api_key: api_key.into(),
            max_batch,
        }
    }
}

#[async_trait]
impl EmbeddingBackend for JinaEmbeddingBackend {
    fn model(&self) -> EmbeddingModel {
        EmbeddingModel::Jina1024
    }

    fn max_batch(&self) -> usize {
        self.max_batch
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
        post_embeddings(
            &self.client,
            &self.url,
            &self.api_key,
            self.model().model_id(),
            texts,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedule() {
        assert_eq!(backoff_delay(0), Duration::from_millis(3_000));
        assert_eq!(backoff_delay(1), Duration::from_millis(6_000));
        assert_eq!(backoff_delay(2), Duration::from_millis(12_000));
        // capped at the ceiling
        assert_eq!(backoff_delay(5), Duration::from_millis(60_000));
        assert_eq!(backoff_delay(7), Duration::from_millis(60_000));
    }

    #[test]
    fn test_response_realignment() {
        let json = r#"{"data": [
            {"index": 1, "embedding": [0.2]},
            {"index": 0, "embedding": [0.1]}
        ]}"#;
        let mut parsed: EmbedResponse = serde_json::from_str(json).unwrap();
        parsed.data.sort_by_key(|row| row.index);
        assert_eq!(parsed.data[0].embedding, vec![0.1]);
        assert_eq!(parsed.data[1].embedding, vec![0.2]);
    }
}
