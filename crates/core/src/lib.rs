//! Core types for the hybrid Arabic search service
//!
//! This crate provides the types shared across all other crates:
//! - Query analysis types (script, phrases, tokens)
//! - Search parameters and validation
//! - Ranked result variants for the three content domains
//! - The wire-level search response
//! - Error types

pub mod error;
pub mod params;
pub mod query;
pub mod response;
pub mod results;

pub use error::{Error, Result};
pub use params::{EmbeddingModel, RerankerChoice, SearchMode, SearchParams};
pub use query::{Query, Script};
pub use response::{
    AuthorHit, AyahBoost, DebugStats, ExpandedQuery, GraphContext, GraphEntity, SearchResponse,
};
pub use results::{AyahRankedResult, BookRankedResult, HadithRankedResult, MatchType};
