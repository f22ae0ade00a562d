//! Analyzed query types
//!
//! A [`Query`] is produced once per request by the text crate and never
//! mutated afterwards.

use serde::{Deserialize, Serialize};

/// Dominant script of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Script {
    /// Contains at least one Arabic codepoint
    Arabic,
    /// Latin or mixed non-Arabic text
    Latin,
    /// Entirely ASCII digits (an id lookup)
    Numeric,
}

/// An analyzed user query
///
/// `normalized` carries no diacritics, variant alefs or teh marbuta, and has
/// collapsed whitespace. `phrases` holds the contents of matched quote pairs
/// that span at least two tokens.
#[derive(Debug, Clone)]
pub struct Query {
    /// Raw text as received
    pub raw: String,
    /// Normalized form (see maktaba-text)
    pub normalized: String,
    /// Detected script
    pub script: Script,
    /// Whether the query carried a quoted phrase
    pub has_quoted_phrase: bool,
    /// Whitespace tokens of the normalized text
    pub tokens: Vec<String>,
    /// Quoted phrases (normalized)
    pub phrases: Vec<String>,
}

impl Query {
    /// Length of the normalized text with spaces removed
    pub fn compact_len(&self) -> usize {
        self.normalized.chars().filter(|c| !c.is_whitespace()).count()
    }
}
