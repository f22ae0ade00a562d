//! LLM listwise reranking
//!
//! One prompt carries the query and the numbered candidate texts; the model
//! answers with a bare JSON array of 1-based indices. Anything that goes
//! wrong — timeout, API failure, unparseable or invalid output — degrades
//! to the original order. Reranking can reorder results but never lose or
//! invent them.

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use maktaba_config::constants::{deadlines, RERANK_TEXT_MAX_CHARS};
use maktaba_config::LlmConfig;
use maktaba_core::{
    AyahRankedResult, BookRankedResult, HadithRankedResult, RerankerChoice,
};
use maktaba_llm::ChatMessage;

use crate::ChatModel;

/// Result of a rerank attempt
#[derive(Debug)]
pub struct RerankOutcome<T> {
    pub items: Vec<T>,
    /// True when the model call failed and the original order was kept
    pub timed_out: bool,
}

static INDEX_ARRAY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[0-9,\s]*\]").unwrap());

/// Find the first `[…]` of digits and commas and parse it as 1-based
/// indices. Out-of-range or duplicate indices invalidate the whole answer.
fn parse_indices(response: &str, len: usize) -> Option<Vec<usize>> {
    let matched = INDEX_ARRAY.find(response)?;
    let parsed: Vec<usize> = serde_json::from_str(matched.as_str()).ok()?;
    if parsed.is_empty() {
        return None;
    }

    let mut seen = vec![false; len];
    let mut zero_based = Vec::with_capacity(parsed.len());
    for index in parsed {
        if index == 0 || index > len || seen[index - 1] {
            return None;
        }
        seen[index - 1] = true;
        zero_based.push(index - 1);
    }
    Some(zero_based)
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// LLM reranker
pub struct Reranker {
    chat: Arc<dyn ChatModel>,
    config: LlmConfig,
}

impl Reranker {
    pub fn new(chat: Arc<dyn ChatModel>, config: LlmConfig) -> Self {
        Self { chat, config }
    }

    fn model_for(&self, choice: RerankerChoice) -> Option<(&str, Duration)> {
        match choice {
            RerankerChoice::None => None,
            RerankerChoice::Small => Some((&self.config.small_model, deadlines::RERANK)),
            RerankerChoice::Large => Some((&self.config.large_model, deadlines::RERANK)),
            RerankerChoice::Fast => Some((&self.config.fast_model, deadlines::RERANK_FAST)),
        }
    }

    fn build_prompt(query: &str, entries: &[String]) -> Vec<ChatMessage> {
        let mut listing = String::new();
        for (i, text) in entries.iter().enumerate() {
            listing.push_str(&format!("[{}] {}\n", i + 1, text));
        }

        vec![
            ChatMessage::system(
                "You are a relevance judge for a classical Arabic and Islamic text search \
                 engine. Judge each passage by how directly it answers the query's intent: \
                 a passage stating a ruling, definition or narration about the queried topic \
                 outranks one that merely mentions its words.",
            ),
            ChatMessage::user(format!(
                "Query: {}\n\nPassages:\n{}\nReturn ONLY a JSON array of the passage numbers, \
                 most relevant first, e.g. [3, 1, 2]. No other text.",
                query, listing
            )),
        ]
    }

    /// Rerank candidates, keeping the first `top_n`.
    ///
    /// `RerankerChoice::None` passes the input through untouched.
    pub async fn rerank<T: Send>(
        &self,
        query: &str,
        items: Vec<T>,
        get_text: impl Fn(&T) -> String + Send + Sync,
        top_n: usize,
        choice: RerankerChoice,
    ) -> RerankOutcome<T> {
        let Some((model, deadline)) = self.model_for(choice) else {
            return RerankOutcome {
                items: items.into_iter().take(top_n).collect(),
                timed_out: false,
            };
        };

        if items.len() < 2 {
            return RerankOutcome {
                items,
                timed_out: false,
            };
        }

        let entries: Vec<String> = items
            .iter()
            .map(|item| truncate_chars(&get_text(item), RERANK_TEXT_MAX_CHARS))
            .collect();
        let messages = Self::build_prompt(query, &entries);

        match self.chat.complete(model, &messages, 0.0, deadline).await {
            Ok(response) => match parse_indices(&response, items.len()) {
                Some(order) => {
                    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
                    let mut ranked: Vec<T> = order
                        .iter()
                        .filter_map(|&i| slots[i].take())
                        .collect();
                    // indices the model left out keep their original order
                    ranked.extend(slots.into_iter().flatten());
                    RerankOutcome {
                        items: ranked.into_iter().take(top_n).collect(),
                        timed_out: false,
                    }
                }
                None => {
                    tracing::warn!(model, "Unparseable rerank response, keeping original order");
                    RerankOutcome {
                        items: items.into_iter().take(top_n).collect(),
                        timed_out: false,
                    }
                }
            },
            Err(e) => {
                tracing::warn!(model, error = %e, "Rerank call failed, keeping original order");
                RerankOutcome {
                    items: items.into_iter().take(top_n).collect(),
                    timed_out: true,
                }
            }
        }
    }

    /// Unified tri-domain rerank for refine mode.
    ///
    /// Packs the three capped lists into one numbered, type-tagged prompt
    /// and distributes the answer back per type. Ranked items receive the
    /// synthetic monotone score `1 − rank/100` so downstream sorting stays
    /// stable. Fewer than three candidates in total skips the call.
    pub async fn rerank_unified(
        &self,
        query: &str,
        books: Vec<BookRankedResult>,
        ayahs: Vec<AyahRankedResult>,
        hadiths: Vec<HadithRankedResult>,
        caps: (usize, usize, usize),
        choice: RerankerChoice,
    ) -> (
        Vec<BookRankedResult>,
        Vec<AyahRankedResult>,
        Vec<HadithRankedResult>,
        bool,
    ) {
        let books: Vec<_> = books.into_iter().take(caps.0).collect();
        let ayahs: Vec<_> = ayahs.into_iter().take(caps.1).collect();
        let hadiths: Vec<_> = hadiths.into_iter().take(caps.2).collect();

        let total = books.len() + ayahs.len() + hadiths.len();
        let Some((model, _)) = self.model_for(choice) else {
            return (books, ayahs, hadiths, false);
        };
        if total < 3 {
            return (books, ayahs, hadiths, false);
        }

        enum Tagged {
            Book(BookRankedResult),
            Ayah(AyahRankedResult),
            Hadith(HadithRankedResult),
        }

        let mut combined: Vec<Tagged> = Vec::with_capacity(total);
        let mut entries: Vec<String> = Vec::with_capacity(total);
        for book in books {
            entries.push(format!(
                "(book) {}",
                truncate_chars(&book.text_snippet, RERANK_TEXT_MAX_CHARS)
            ));
            combined.push(Tagged::Book(book));
        }
        for ayah in ayahs {
            entries.push(format!(
                "(ayah) {}",
                truncate_chars(&ayah.text, RERANK_TEXT_MAX_CHARS)
            ));
            combined.push(Tagged::Ayah(ayah));
        }
        for hadith in hadiths {
            entries.push(format!(
                "(hadith) {}",
                truncate_chars(&hadith.text, RERANK_TEXT_MAX_CHARS)
            ));
            combined.push(Tagged::Hadith(hadith));
        }

        let messages = Self::build_prompt(query, &entries);
        let model = model.to_string();

        let (order, timed_out) = match self
            .chat
            .complete(&model, &messages, 0.0, deadlines::RERANK_UNIFIED)
            .await
        {
            Ok(response) => match parse_indices(&response, combined.len()) {
                Some(order) => (Some(order), false),
                None => {
                    tracing::warn!(model = %model, "Unparseable unified rerank response");
                    (None, false)
                }
            },
            Err(e) => {
                tracing::warn!(model = %model, error = %e, "Unified rerank call failed");
                (None, true)
            }
        };

        let mut slots: Vec<Option<Tagged>> = combined.into_iter().map(Some).collect();
        let visit_order: Vec<usize> = match order {
            Some(ranked) => {
                let mut full = ranked.clone();
                // unranked leftovers keep their original relative order
                full.extend((0..slots.len()).filter(|i| !ranked.contains(i)));
                full
            }
            None => (0..slots.len()).collect(),
        };

        let mut out_books = Vec::new();
        let mut out_ayahs = Vec::new();
        let mut out_hadiths = Vec::new();

        for (rank, index) in visit_order.into_iter().enumerate() {
            let Some(item) = slots[index].take() else {
                continue;
            };
            let synthetic = 1.0 - (rank as f32 / 100.0);
            match item {
                Tagged::Book(mut book) => {
                    if out_books.len() < caps.0 {
                        book.fused_score = synthetic;
                        out_books.push(book);
                    }
                }
                Tagged::Ayah(mut ayah) => {
                    if out_ayahs.len() < caps.1 {
                        ayah.score = synthetic;
                        out_ayahs.push(ayah);
                    }
                }
                Tagged::Hadith(mut hadith) => {
                    if out_hadiths.len() < caps.2 {
                        hadith.score = synthetic;
                        out_hadiths.push(hadith);
                    }
                }
            }
        }

        (out_books, out_ayahs, out_hadiths, timed_out)
    }
}
