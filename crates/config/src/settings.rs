//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Detect from the process environment. Honors APP_ENV and, for
    /// compatibility with the deployment tooling, NODE_ENV.
    pub fn detect() -> Self {
        let raw = std::env::var("APP_ENV")
            .or_else(|_| std::env::var("NODE_ENV"))
            .unwrap_or_default();
        match raw.to_lowercase().as_str() {
            "production" => Self::Production,
            "staging" => Self::Staging,
            _ => Self::Development,
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub lexical: LexicalConfig,

    #[serde(default)]
    pub vector: VectorConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub graph: GraphConfig,

    /// Shared secret guarding internal endpoints
    #[serde(default = "default_internal_secret")]
    pub internal_api_secret: String,
}

fn default_internal_secret() -> String {
    std::env::var("INTERNAL_API_SECRET").unwrap_or_default()
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

/// Pipeline tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Base similarity cutoff before the dynamic threshold is applied
    #[serde(default = "default_base_threshold")]
    pub base_similarity_threshold: f32,
}

fn default_base_threshold() -> f32 {
    0.2
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_similarity_threshold: default_base_threshold(),
        }
    }
}

/// Embedding back-end endpoints and credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// OpenAI-compatible embeddings endpoint
    #[serde(default = "default_openai_endpoint")]
    pub openai_endpoint: String,
    #[serde(default = "default_openrouter_key")]
    pub openai_api_key: String,
    #[serde(default = "default_jina_endpoint")]
    pub jina_endpoint: String,
    #[serde(default = "default_jina_key")]
    pub jina_api_key: String,
    /// Largest batch a single back-end call may carry
    #[serde(default = "default_embed_batch")]
    pub max_batch: usize,
}

fn default_openai_endpoint() -> String {
    std::env::var("OPENAI_API_BASE").unwrap_or_else(|_| "https://api.openai.com/v1".to_string())
}

fn default_openrouter_key() -> String {
    std::env::var("OPENROUTER_API_KEY").unwrap_or_default()
}

fn default_jina_endpoint() -> String {
    "https://api.jina.ai/v1".to_string()
}

fn default_jina_key() -> String {
    std::env::var("JINA_API_KEY").unwrap_or_default()
}

fn default_embed_batch() -> usize {
    96
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            openai_endpoint: default_openai_endpoint(),
            openai_api_key: default_openrouter_key(),
            jina_endpoint: default_jina_endpoint(),
            jina_api_key: default_jina_key(),
            max_batch: default_embed_batch(),
        }
    }
}

/// Lexical (inverted index) engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LexicalConfig {
    #[serde(default = "default_es_url")]
    pub url: String,
    #[serde(default = "default_es_key")]
    pub api_key: Option<String>,
    #[serde(default = "default_pages_index")]
    pub pages_index: String,
    #[serde(default = "default_ayahs_index")]
    pub ayahs_index: String,
    #[serde(default = "default_hadiths_index")]
    pub hadiths_index: String,
    #[serde(default = "default_books_index")]
    pub books_index: String,
    #[serde(default = "default_authors_index")]
    pub authors_index: String,
}

fn default_es_url() -> String {
    std::env::var("ES_URL").unwrap_or_else(|_| "http://127.0.0.1:9200".to_string())
}

fn default_es_key() -> Option<String> {
    std::env::var("ES_API_KEY").ok()
}

fn default_pages_index() -> String {
    "book_pages".to_string()
}

fn default_ayahs_index() -> String {
    "quran_ayahs".to_string()
}

fn default_hadiths_index() -> String {
    "hadiths".to_string()
}

fn default_books_index() -> String {
    "books".to_string()
}

fn default_authors_index() -> String {
    "authors".to_string()
}

impl Default for LexicalConfig {
    fn default() -> Self {
        Self {
            url: default_es_url(),
            api_key: default_es_key(),
            pages_index: default_pages_index(),
            ayahs_index: default_ayahs_index(),
            hadiths_index: default_hadiths_index(),
            books_index: default_books_index(),
            authors_index: default_authors_index(),
        }
    }
}

/// Vector store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    #[serde(default = "default_qdrant_url")]
    pub url: String,
    #[serde(default = "default_qdrant_key")]
    pub api_key: Option<String>,
}

fn default_qdrant_url() -> String {
    std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://127.0.0.1:6334".to_string())
}

fn default_qdrant_key() -> Option<String> {
    std::env::var("QDRANT_API_KEY").ok()
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            url: default_qdrant_url(),
            api_key: default_qdrant_key(),
        }
    }
}

/// Relational metadata store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_pool_size")]
    pub max_connections: u32,
}

fn default_database_url() -> String {
    std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/maktaba".to_string())
}

fn default_pool_size() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_pool_size(),
        }
    }
}

/// LLM (reranking and query expansion) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_openrouter_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_openrouter_key")]
    pub api_key: String,
    #[serde(default = "default_small_model")]
    pub small_model: String,
    #[serde(default = "default_large_model")]
    pub large_model: String,
    #[serde(default = "default_fast_model")]
    pub fast_model: String,
}

fn default_openrouter_endpoint() -> String {
    std::env::var("OPENROUTER_API_BASE")
        .unwrap_or_else(|_| "https://openrouter.ai/api/v1".to_string())
}

fn default_small_model() -> String {
    "openai/gpt-4o-mini".to_string()
}

fn default_large_model() -> String {
    "openai/gpt-4o".to_string()
}

fn default_fast_model() -> String {
    "google/gemini-2.0-flash-001".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_openrouter_endpoint(),
            api_key: default_openrouter_key(),
            small_model: default_small_model(),
            large_model: default_large_model(),
            fast_model: default_fast_model(),
        }
    }
}

/// Graph side-channel service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// None disables the graph context resolver
    #[serde(default = "default_graph_url")]
    pub url: Option<String>,
}

fn default_graph_url() -> Option<String> {
    std::env::var("GRAPH_URL").ok()
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            url: default_graph_url(),
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self {
            environment: RuntimeEnvironment::detect(),
            ..Self::default()
        }
    }

    /// Validate settings; production additionally requires credentials
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.search.base_similarity_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "search.base_similarity_threshold".to_string(),
                message: format!(
                    "Must be between 0.0 and 1.0, got {}",
                    self.search.base_similarity_threshold
                ),
            });
        }

        if self.embedding.max_batch == 0 {
            return Err(ConfigError::InvalidValue {
                field: "embedding.max_batch".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if self.environment.is_production() {
            if self.llm.api_key.is_empty() {
                return Err(ConfigError::Missing("OPENROUTER_API_KEY".to_string()));
            }
            if self.embedding.jina_api_key.is_empty() {
                tracing::warn!("JINA_API_KEY not set; the Jina embedding model is unavailable");
            }
        }

        Ok(())
    }
}

/// Load settings from files and the environment
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("MAKTABA")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let mut settings: Settings = config.try_deserialize()?;

    // The environment wins over file-configured values
    settings.environment = RuntimeEnvironment::detect();

    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.search.base_similarity_threshold, 0.2);
        assert!(!settings.environment.is_production());
    }

    #[test]
    fn test_threshold_validation() {
        let mut settings = Settings::default();
        settings.search.base_similarity_threshold = 1.5;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_zero_batch_rejected() {
        let mut settings = Settings::default();
        settings.embedding.max_batch = 0;
        assert!(settings.validate().is_err());
    }
}
