//! Translation merging
//!
//! Joins translations onto ranked results after fusion. Ayah and hadith
//! translations arrive in one batched repository call each. Page-content
//! translations are stored per paragraph, so each ranked snippet is matched
//! against the page's extracted paragraphs and the translation of the
//! nearest one is attached. Lookup failures leave the result untranslated;
//! they never remove it.

use std::sync::Arc;

use futures::future::join_all;

use maktaba_core::{AyahRankedResult, BookRankedResult, HadithRankedResult};
use maktaba_persistence::{BookStore, PageTranslation, TranslationStore};
use maktaba_text::{extract_paragraphs, normalize, Paragraph};

use crate::inflight::InflightMap;

/// Shortest prefix the fallback accepts as a real match
const MIN_PREFIX_CHARS: usize = 4;

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.chars()
        .zip(b.chars())
        .take_while(|(x, y)| x == y)
        .count()
}

/// Pick the paragraph whose text is nearest the ranked snippet.
///
/// Token-overlap (Jaccard) over normalized text; when no paragraph shares
/// a token (word joins and snippet truncation can defeat tokenization),
/// fall back to the longest common prefix of the normalized texts. Ties
/// go to the earlier paragraph.
fn best_paragraph_index(snippet: &str, paragraphs: &[Paragraph]) -> Option<usize> {
    let normalized_snippet = normalize(snippet);
    let snippet_tokens: std::collections::HashSet<&str> =
        normalized_snippet.split_whitespace().collect();
    if snippet_tokens.is_empty() {
        return None;
    }

    let mut best: Option<(usize, f32)> = None;
    for paragraph in paragraphs {
        let normalized = normalize(&paragraph.text);
        let tokens: std::collections::HashSet<&str> = normalized.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }
        let intersection = snippet_tokens.intersection(&tokens).count() as f32;
        let union = (snippet_tokens.len() + tokens.len()) as f32 - intersection;
        let overlap = if union > 0.0 { intersection / union } else { 0.0 };

        let better = match best {
            Some((_, best_overlap)) => overlap > best_overlap,
            None => overlap > 0.0,
        };
        if better {
            best = Some((paragraph.index, overlap));
        }
    }
    if let Some((index, _)) = best {
        return Some(index);
    }

    // No shared tokens anywhere; take the longest common prefix instead
    let mut best_prefix: Option<(usize, usize)> = None;
    for paragraph in paragraphs {
        let prefix = common_prefix_len(&normalized_snippet, &normalize(&paragraph.text));
        let better = match best_prefix {
            Some((_, best_len)) => prefix > best_len,
            None => prefix >= MIN_PREFIX_CHARS,
        };
        if better {
            best_prefix = Some((paragraph.index, prefix));
        }
    }

    best_prefix.map(|(index, _)| index)
}

/// Joins translations onto ranked results
pub struct TranslationMerger {
    store: Arc<dyn TranslationStore>,
    books: Arc<dyn BookStore>,
    /// Coalesces concurrent page-translation fetches per (page, language)
    inflight: InflightMap<Option<PageTranslation>>,
}

impl TranslationMerger {
    pub fn new(store: Arc<dyn TranslationStore>, books: Arc<dyn BookStore>) -> Self {
        Self {
            store,
            books,
            inflight: InflightMap::new(),
        }
    }

    /// Attach ayah translations in the requested edition
    pub async fn merge_ayahs(&self, ayahs: &mut [AyahRankedResult], edition: &str) {
        if ayahs.is_empty() {
            return;
        }

        let pairs: Vec<(i32, i32)> = ayahs.iter().map(|a| a.key()).collect();
        match self.store.ayah_translations(&pairs, edition).await {
            Ok(translations) => {
                for ayah in ayahs.iter_mut() {
                    ayah.translation = translations.get(&ayah.key()).cloned();
                }
            }
            Err(e) => {
                tracing::warn!(edition, error = %e, "Ayah translation lookup failed");
            }
        }
    }

    /// Attach hadith translations in the requested language
    pub async fn merge_hadiths(&self, hadiths: &mut [HadithRankedResult], language: &str) {
        if hadiths.is_empty() {
            return;
        }

        let pairs: Vec<(i64, String)> = hadiths
            .iter()
            .map(|h| (h.book_id, h.hadith_number.clone()))
            .collect();
        match self.store.hadith_translations(&pairs, language).await {
            Ok(translations) => {
                for hadith in hadiths.iter_mut() {
                    hadith.translation = translations
                        .get(&(hadith.book_id, hadith.hadith_number.clone()))
                        .cloned();
                }
            }
            Err(e) => {
                tracing::warn!(language, error = %e, "Hadith translation lookup failed");
            }
        }
    }

    /// Attach the matching paragraph translation to each page result
    pub async fn merge_pages(&self, results: &mut [BookRankedResult], language: &str) {
        let lookups = results.iter().map(|result| {
            let book_id = result.book_id;
            let page_number = result.page_number;
            let snippet = result.text_snippet.clone();
            async move {
                self.page_paragraph_translation(book_id, page_number, language, &snippet)
                    .await
            }
        });

        let translations: Vec<Option<String>> = join_all(lookups).await;
        for (result, translation) in results.iter_mut().zip(translations) {
            result.content_translation = translation;
        }
    }

    async fn page_paragraph_translation(
        &self,
        book_id: i64,
        page_number: i64,
        language: &str,
        snippet: &str,
    ) -> Option<String> {
        let document_id = format!("{}:{}", book_id, page_number);
        let key = InflightMap::<Option<PageTranslation>>::key(&document_id, language);

        let store = Arc::clone(&self.store);
        let language_owned = language.to_string();
        let stored = self
            .inflight
            .fetch(key, move || async move {
                match store
                    .page_translation(book_id, page_number, &language_owned)
                    .await
                {
                    Ok(found) => found,
                    Err(e) => {
                        tracing::warn!(book_id, page_number, error = %e,
                            "Page translation lookup failed");
                        None
                    }
                }
            })
            .await?;

        if stored.paragraphs.is_empty() {
            return None;
        }
        if stored.paragraphs.len() == 1 {
            return Some(stored.paragraphs[0].translation.clone());
        }

        let html = match self.books.page_content(book_id, page_number).await {
            Ok(Some(html)) => html,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(book_id, page_number, error = %e, "Page content lookup failed");
                return None;
            }
        };

        let paragraphs = extract_paragraphs(&html);
        let index = best_paragraph_index(snippet, &paragraphs)?;
        stored
            .paragraphs
            .iter()
            .find(|p| p.index == index)
            .map(|p| p.translation.clone())
    }
}
