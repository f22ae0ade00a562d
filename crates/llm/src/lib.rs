//! LLM access for the search pipeline
//!
//! A thin OpenRouter chat-completions client. The pipeline uses it for two
//! one-shot jobs: listwise reranking and query expansion. No streaming, no
//! tool use, no retries — callers either get a completion within their
//! deadline or fall back.

pub mod openrouter;

pub use openrouter::{ChatMessage, OpenRouterClient, OpenRouterConfig};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The call exceeded its deadline
    #[error("Deadline exceeded after {0:?}")]
    Timeout(std::time::Duration),
}

impl LlmError {
    /// Whether the failure was a deadline expiry (callers treat timeouts
    /// differently from hard errors when deciding what to surface)
    pub fn is_timeout(&self) -> bool {
        matches!(self, LlmError::Timeout(_))
    }
}
