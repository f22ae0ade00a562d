//! Wire-level search response
//!
//! Serialized exactly as the HTTP layer returns it (camelCase, optional
//! fields omitted when absent).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::params::SearchMode;
use crate::results::{AyahRankedResult, BookRankedResult, HadithRankedResult};

/// An author record matched by the metadata lookup
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorHit {
    pub author_id: i64,
    pub name_arabic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_latin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub death_year: Option<i32>,
    pub score: f32,
}

/// A related entity surfaced by the graph side channel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEntity {
    pub id: String,
    pub name: String,
    pub entity_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
}

/// Post-hoc score boost for an ayah suggested by the graph service
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AyahBoost {
    pub surah_number: i32,
    pub ayah_number: i32,
    pub boost: f32,
}

/// Optional graph context attached to a response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphContext {
    pub entities: Vec<GraphEntity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ayah_boosts: Vec<AyahBoost>,
}

/// One query paraphrase produced by the expander
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpandedQuery {
    pub text: String,
    /// Contribution weight in [0.3, 1.0]
    pub weight: f32,
    /// Human-readable rationale from the model
    pub reason: String,
}

/// Per-request timing and branch-failure record, emitted outside production
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugStats {
    /// Stage name -> elapsed milliseconds
    pub timings_ms: BTreeMap<String, u64>,
    /// Branches that failed and were swallowed to empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_branches: Vec<String>,
}

impl DebugStats {
    pub fn record(&mut self, stage: &str, ms: u64) {
        self.timings_ms.insert(stage.to_string(), ms);
    }

    pub fn record_failure(&mut self, branch: &str) {
        self.failed_branches.push(branch.to_string());
    }
}

/// The assembled search response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    /// Echo of the query text
    pub query: String,
    pub mode: SearchMode,
    /// Length of `results`
    pub count: usize,
    pub results: Vec<BookRankedResult>,
    pub authors: Vec<AuthorHit>,
    pub ayahs: Vec<AyahRankedResult>,
    pub hadiths: Vec<HadithRankedResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_context: Option<GraphContext>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub refined: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expanded_queries: Vec<ExpandedQuery>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_stats: Option<DebugStats>,
}

impl SearchResponse {
    /// Empty response for a query that matched nothing
    pub fn empty(query: impl Into<String>, mode: SearchMode) -> Self {
        Self {
            query: query.into(),
            mode,
            count: 0,
            results: Vec::new(),
            authors: Vec::new(),
            ayahs: Vec::new(),
            hadiths: Vec::new(),
            graph_context: None,
            refined: false,
            expanded_queries: Vec::new(),
            debug_stats: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_response_shape() {
        let resp = SearchResponse::empty("test", SearchMode::Hybrid);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["count"], 0);
        assert_eq!(json["mode"], "hybrid");
        // refined and expandedQueries are omitted when not in refine mode
        assert!(json.get("refined").is_none());
        assert!(json.get("expandedQueries").is_none());
        assert!(json.get("debugStats").is_none());
    }

    #[test]
    fn test_refined_response_carries_expansions() {
        let mut resp = SearchResponse::empty("q", SearchMode::Hybrid);
        resp.refined = true;
        resp.expanded_queries.push(ExpandedQuery {
            text: "paraphrase".into(),
            weight: 0.9,
            reason: "synonym".into(),
        });
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["refined"], true);
        assert_eq!(json["expandedQueries"].as_array().unwrap().len(), 1);
    }
}
