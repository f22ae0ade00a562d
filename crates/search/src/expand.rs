//! Query expansion
//!
//! On refine requests the original query is expanded into up to four
//! paraphrases, each with a contribution weight. Expansions are cached by
//! query text for ten minutes. A failed or unparseable LLM call produces
//! zero expansions; the original query always runs regardless.

use std::sync::Arc;

use serde::Deserialize;

use maktaba_config::constants::{cache, deadlines, refine};
use maktaba_core::ExpandedQuery;
use maktaba_llm::ChatMessage;

use crate::ttl_cache::TtlCache;
use crate::ChatModel;

const WEIGHT_RANGE: (f32, f32) = (0.3, 1.0);

#[derive(Debug, Deserialize)]
struct RawExpansion {
    text: String,
    #[serde(default = "default_weight")]
    weight: f32,
    #[serde(default)]
    reason: String,
}

fn default_weight() -> f32 {
    0.7
}

/// Pull the first JSON array out of the response and parse it.
///
/// Weights are clamped into [0.3, 1.0]; blank texts and echoes of the
/// original query are dropped; at most four expansions survive.
fn parse_expansions(response: &str, original: &str) -> Vec<ExpandedQuery> {
    let Some(start) = response.find('[') else {
        return Vec::new();
    };
    let Some(end) = response.rfind(']') else {
        return Vec::new();
    };
    if end <= start {
        return Vec::new();
    }

    let parsed: Vec<RawExpansion> = match serde_json::from_str(&response[start..=end]) {
        Ok(parsed) => parsed,
        Err(_) => return Vec::new(),
    };

    parsed
        .into_iter()
        .filter(|raw| {
            let text = raw.text.trim();
            !text.is_empty() && text != original
        })
        .take(refine::MAX_EXPANSIONS)
        .map(|raw| ExpandedQuery {
            text: raw.text.trim().to_string(),
            weight: raw.weight.clamp(WEIGHT_RANGE.0, WEIGHT_RANGE.1),
            reason: raw.reason,
        })
        .collect()
}

/// LLM-backed query expander with a per-query-text cache
pub struct QueryExpander {
    chat: Arc<dyn ChatModel>,
    model: String,
    cache: TtlCache<String, Vec<ExpandedQuery>>,
}

impl QueryExpander {
    pub fn new(chat: Arc<dyn ChatModel>, model: impl Into<String>) -> Self {
        Self {
            chat,
            model: model.into(),
            cache: TtlCache::new(
                cache::EXPANSION_TTL,
                cache::EXPANSION_MAX_ENTRIES,
                cache::EVICTION_BATCH,
            ),
        }
    }

    /// Expansions for one query; empty on any failure
    pub async fn expand(&self, query: &str) -> Vec<ExpandedQuery> {
        if let Some(cached) = self.cache.get(query) {
            return cached;
        }

        let messages = vec![
            ChatMessage::system(
                "You expand Arabic and Islamic-studies search queries. Produce up to 4 \
                 paraphrases or closely related reformulations that would retrieve relevant \
                 passages the original wording might miss: synonyms, classical phrasing, \
                 the underlying concept. Answer with ONLY a JSON array of objects \
                 {\"text\": string, \"weight\": number between 0.3 and 1.0, \
                 \"reason\": short string}. Higher weight means closer to the original \
                 meaning.",
            ),
            ChatMessage::user(query.to_string()),
        ];

        let expansions = match self
            .chat
            .complete(&self.model, &messages, 0.0, deadlines::EXPANSION)
            .await
        {
            Ok(response) => parse_expansions(&response, query),
            Err(e) => {
                tracing::warn!(error = %e, "Query expansion failed, continuing unexpanded");
                Vec::new()
            }
        };

        // Failures are cached too: a flaky expander must not be retried on
        // every keystroke
        self.cache.set(query.to_string(), expansions.clone());
        expansions
    }
}
