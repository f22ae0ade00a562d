//! Configuration management for the search service
//!
//! Supports loading configuration from:
//! - TOML files (config/default.toml, config/{env}.toml)
//! - Environment variables (MAKTABA_ prefix, plus the conventional
//!   service variables: ES_URL, QDRANT_URL, DATABASE_URL, ...)

pub mod constants;
pub mod settings;

pub use settings::{
    load_settings, DatabaseConfig, EmbeddingConfig, GraphConfig, LexicalConfig, LlmConfig,
    RuntimeEnvironment, SearchConfig, ServerConfig, Settings, VectorConfig,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Missing required setting: {0}")]
    Missing(String),

    #[error("Configuration error: {0}")]
    Load(#[from] config::ConfigError),
}
