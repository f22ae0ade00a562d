//! Graph context side channel
//!
//! Runs alongside the main pipeline and attaches "related entities" to the
//! response, plus optional post-hoc score boosts for matching ayahs. It may
//! only ever add: failure or timeout silently yields nothing, and the
//! response never waits past the short graph deadline.

use std::cmp::Ordering;

use reqwest::Client;
use serde_json::json;

use maktaba_config::constants::deadlines;
use maktaba_core::{AyahRankedResult, GraphContext};

/// Client for the graph service
pub struct GraphResolver {
    client: Client,
    url: String,
}

impl GraphResolver {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }

    /// Related-entity context for a query, or None
    pub async fn resolve(&self, query: &str) -> Option<GraphContext> {
        let call = self
            .client
            .post(format!("{}/context", self.url.trim_end_matches('/')))
            .json(&json!({ "query": query }))
            .send();

        let response = match tokio::time::timeout(deadlines::GRAPH, call).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "Graph service unreachable");
                return None;
            }
            Err(_) => {
                tracing::debug!("Graph service deadline expired");
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::debug!(status = %response.status(), "Graph service error");
            return None;
        }

        match response.json::<GraphContext>().await {
            Ok(context) if context.entities.is_empty() && context.ayah_boosts.is_empty() => None,
            Ok(context) => Some(context),
            Err(e) => {
                tracing::debug!(error = %e, "Bad graph response");
                None
            }
        }
    }
}

/// Raise the scores of ayahs the graph flagged, then restore score order
pub fn apply_ayah_boosts(ayahs: &mut Vec<AyahRankedResult>, context: &GraphContext) {
    if context.ayah_boosts.is_empty() {
        return;
    }

    for ayah in ayahs.iter_mut() {
        if let Some(boost) = context
            .ayah_boosts
            .iter()
            .find(|b| b.surah_number == ayah.surah_number && b.ayah_number == ayah.ayah_number)
        {
            ayah.score *= boost.boost.max(1.0);
        }
    }

    ayahs.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
}

#[cfg(test)]
mod tests {
    use super::*;
    use maktaba_core::{AyahBoost, MatchType};

    fn ayah(surah: i32, number: i32, score: f32) -> AyahRankedResult {
        AyahRankedResult {
            surah_number: surah,
            ayah_number: number,
            ayah_end: None,
            text: "نص".into(),
            translation: None,
            semantic_score: Some(score),
            bm25_raw: None,
            semantic_rank: Some(1),
            keyword_rank: None,
            score,
            rrf_score: 0.01,
            match_type: MatchType::Semantic,
        }
    }

    #[test]
    fn test_boost_reorders() {
        let mut ayahs = vec![ayah(1, 1, 0.6), ayah(2, 255, 0.5)];
        let context = GraphContext {
            entities: Vec::new(),
            ayah_boosts: vec![AyahBoost {
                surah_number: 2,
                ayah_number: 255,
                boost: 1.5,
            }],
        };

        apply_ayah_boosts(&mut ayahs, &context);
        assert_eq!(ayahs[0].key(), (2, 255));
        assert!((ayahs[0].score - 0.75).abs() < 1e-6);
        // the unboosted ayah is untouched
        assert!((ayahs[1].score - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_sub_unity_boost_never_lowers() {
        let mut ayahs = vec![ayah(3, 3, 0.4)];
        let context = GraphContext {
            entities: Vec::new(),
            ayah_boosts: vec![AyahBoost {
                surah_number: 3,
                ayah_number: 3,
                boost: 0.2,
            }],
        };
        apply_ayah_boosts(&mut ayahs, &context);
        assert!((ayahs[0].score - 0.4).abs() < 1e-6);
    }
}
