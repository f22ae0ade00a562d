//! Result fusion
//!
//! Weighted score fusion with an RRF tie-breaker, plus the multi-query
//! weighted dedupe used by the refine pipeline. Everything here is pure:
//! no suspension, no shared state, inputs are never mutated in place.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::Hash;

use maktaba_config::constants::fusion::{
    BM25_NORM_K, KEYWORD_WEIGHT, RRF_K, SEMANTIC_WEIGHT, TIE_EPSILON,
};
use maktaba_core::{AyahRankedResult, BookRankedResult, HadithRankedResult, MatchType};

use crate::lexical::{AyahHit, HadithHit, PageHit};
use crate::vector::{SemanticAyahHit, SemanticHadithHit, SemanticPageHit};

/// Monotone map of raw BM25 into [0, 1)
pub fn normalize_bm25(raw: f32) -> f32 {
    if raw <= 0.0 {
        return 0.0;
    }
    raw / (raw + BM25_NORM_K)
}

/// RRF contribution of a 1-based rank
fn rrf_contribution(rank: usize) -> f32 {
    1.0 / (RRF_K + rank as f32)
}

/// Fused score from the per-engine signals.
///
/// Dual-engine hits are rewarded: the weights deliberately sum past 1.0.
fn fused_score(semantic: Option<f32>, keyword_norm: Option<f32>) -> f32 {
    match (semantic, keyword_norm) {
        (Some(s), Some(k)) => SEMANTIC_WEIGHT * s + KEYWORD_WEIGHT * k,
        (Some(s), None) => s,
        (None, Some(k)) => k,
        (None, None) => 0.0,
    }
}

/// Order by fused score, breaking near-ties by RRF, then by key for
/// determinism
fn rank_order<T>(
    a: &T,
    b: &T,
    fused: impl Fn(&T) -> f32,
    rrf: impl Fn(&T) -> f32,
    key: impl Fn(&T) -> String,
) -> Ordering {
    let (fa, fb) = (fused(a), fused(b));
    if (fa - fb).abs() >= TIE_EPSILON {
        return fb.partial_cmp(&fa).unwrap_or(Ordering::Equal);
    }
    let (ra, rb) = (rrf(a), rrf(b));
    rb.partial_cmp(&ra)
        .unwrap_or(Ordering::Equal)
        .then_with(|| key(a).cmp(&key(b)))
}

// =============================================================================
// Book pages
// =============================================================================

fn book_from_semantic(hit: SemanticPageHit, rank: usize) -> BookRankedResult {
    BookRankedResult {
        book_id: hit.book_id,
        page_number: hit.page_number,
        text_snippet: hit.snippet,
        highlighted_snippet: None,
        semantic_score: Some(hit.score),
        bm25_raw: None,
        keyword_score: None,
        semantic_rank: Some(rank),
        keyword_rank: None,
        fused_score: hit.score,
        rrf_score: rrf_contribution(rank),
        match_type: MatchType::Semantic,
        content_translation: None,
        title_arabic: None,
        title_latin: None,
        author_name: None,
    }
}

fn book_from_keyword(hit: PageHit, rank: usize) -> BookRankedResult {
    let keyword_score = normalize_bm25(hit.bm25);
    BookRankedResult {
        book_id: hit.book_id,
        page_number: hit.page_number,
        text_snippet: hit.snippet,
        highlighted_snippet: hit.highlight,
        semantic_score: None,
        bm25_raw: Some(hit.bm25),
        keyword_score: Some(keyword_score),
        semantic_rank: None,
        keyword_rank: Some(rank),
        fused_score: keyword_score,
        rrf_score: rrf_contribution(rank),
        match_type: MatchType::Keyword,
        content_translation: None,
        title_arabic: None,
        title_latin: None,
        author_name: None,
    }
}

/// Weighted-score fusion of the two book-page result lists.
///
/// Passing an empty list for one engine reproduces the single-engine
/// orderings exactly, so the keyword and semantic merge modes reuse this.
pub fn fuse_books(
    semantic: Vec<SemanticPageHit>,
    keyword: Vec<PageHit>,
) -> Vec<BookRankedResult> {
    let mut by_key: HashMap<(i64, i64), BookRankedResult> = HashMap::new();

    for (i, hit) in semantic.into_iter().enumerate() {
        let result = book_from_semantic(hit, i + 1);
        by_key.insert(result.key(), result);
    }

    for (i, hit) in keyword.into_iter().enumerate() {
        let rank = i + 1;
        let key = (hit.book_id, hit.page_number);
        match by_key.get_mut(&key) {
            Some(existing) => {
                let keyword_score = normalize_bm25(hit.bm25);
                existing.bm25_raw = Some(hit.bm25);
                existing.keyword_score = Some(keyword_score);
                existing.keyword_rank = Some(rank);
                existing.rrf_score += rrf_contribution(rank);
                existing.match_type = MatchType::Both;
                existing.fused_score = fused_score(existing.semantic_score, Some(keyword_score));
                if existing.highlighted_snippet.is_none() {
                    existing.highlighted_snippet = hit.highlight;
                }
                if existing.text_snippet.is_empty() {
                    existing.text_snippet = hit.snippet;
                }
            }
            None => {
                by_key.insert(key, book_from_keyword(hit, rank));
            }
        }
    }

    let mut results: Vec<BookRankedResult> = by_key.into_values().collect();
    results.sort_by(|a, b| {
        rank_order(a, b, |r| r.fused_score, |r| r.rrf_score, |r| format!("{:?}", r.key()))
    });
    results
}

// =============================================================================
// Ayahs
// =============================================================================

fn ayah_from_semantic(hit: SemanticAyahHit, rank: usize) -> AyahRankedResult {
    AyahRankedResult {
        surah_number: hit.surah_number,
        ayah_number: hit.ayah_number,
        ayah_end: hit.ayah_end,
        text: hit.text,
        translation: None,
        semantic_score: Some(hit.score),
        bm25_raw: None,
        semantic_rank: Some(rank),
        keyword_rank: None,
        score: hit.score,
        rrf_score: rrf_contribution(rank),
        match_type: MatchType::Semantic,
    }
}

fn ayah_from_keyword(hit: AyahHit, rank: usize) -> AyahRankedResult {
    let keyword_score = normalize_bm25(hit.bm25);
    AyahRankedResult {
        surah_number: hit.surah_number,
        ayah_number: hit.ayah_number,
        ayah_end: hit.ayah_end,
        text: hit.text,
        translation: None,
        semantic_score: None,
        bm25_raw: Some(hit.bm25),
        semantic_rank: None,
        keyword_rank: Some(rank),
        score: keyword_score,
        rrf_score: rrf_contribution(rank),
        match_type: MatchType::Keyword,
    }
}

/// Weighted-score fusion for ayah results
pub fn fuse_ayahs(semantic: Vec<SemanticAyahHit>, keyword: Vec<AyahHit>) -> Vec<AyahRankedResult> {
    let mut by_key: HashMap<(i32, i32), AyahRankedResult> = HashMap::new();

    for (i, hit) in semantic.into_iter().enumerate() {
        let result = ayah_from_semantic(hit, i + 1);
        by_key.insert(result.key(), result);
    }

    for (i, hit) in keyword.into_iter().enumerate() {
        let rank = i + 1;
        let key = (hit.surah_number, hit.ayah_number);
        match by_key.get_mut(&key) {
            Some(existing) => {
                let keyword_score = normalize_bm25(hit.bm25);
                existing.bm25_raw = Some(hit.bm25);
                existing.keyword_rank = Some(rank);
                existing.rrf_score += rrf_contribution(rank);
                existing.match_type = MatchType::Both;
                existing.score = fused_score(existing.semantic_score, Some(keyword_score));
            }
            None => {
                by_key.insert(key, ayah_from_keyword(hit, rank));
            }
        }
    }

    let mut results: Vec<AyahRankedResult> = by_key.into_values().collect();
    results.sort_by(|a, b| {
        rank_order(a, b, |r| r.score, |r| r.rrf_score, |r| format!("{:?}", r.key()))
    });
    results
}

// =============================================================================
// Hadiths
// =============================================================================

fn hadith_from_semantic(hit: SemanticHadithHit, rank: usize) -> HadithRankedResult {
    HadithRankedResult {
        collection: hit.collection,
        hadith_number: hit.hadith_number,
        book_id: hit.book_id,
        text: hit.text,
        translation: None,
        chapter: hit.chapter,
        semantic_score: Some(hit.score),
        bm25_raw: None,
        semantic_rank: Some(rank),
        keyword_rank: None,
        score: hit.score,
        rrf_score: rrf_contribution(rank),
        match_type: MatchType::Semantic,
    }
}

fn hadith_from_keyword(hit: HadithHit, rank: usize) -> HadithRankedResult {
    let keyword_score = normalize_bm25(hit.bm25);
    HadithRankedResult {
        collection: hit.collection,
        hadith_number: hit.hadith_number,
        book_id: hit.book_id,
        text: hit.text,
        translation: None,
        chapter: hit.chapter,
        semantic_score: None,
        bm25_raw: Some(hit.bm25),
        semantic_rank: None,
        keyword_rank: Some(rank),
        score: keyword_score,
        rrf_score: rrf_contribution(rank),
        match_type: MatchType::Keyword,
    }
}

/// Weighted-score fusion for hadith results.
///
/// A hit with no usable key is dropped and logged rather than crashing
/// the request.
pub fn fuse_hadiths(
    semantic: Vec<SemanticHadithHit>,
    keyword: Vec<HadithHit>,
) -> Vec<HadithRankedResult> {
    let mut by_key: HashMap<(String, String), HadithRankedResult> = HashMap::new();

    for (i, hit) in semantic.into_iter().enumerate() {
        if hit.collection.is_empty() || hit.hadith_number.is_empty() {
            tracing::warn!("Dropping semantic hadith hit with missing key");
            continue;
        }
        let result = hadith_from_semantic(hit, i + 1);
        by_key.insert(result.key(), result);
    }

    for (i, hit) in keyword.into_iter().enumerate() {
        if hit.collection.is_empty() || hit.hadith_number.is_empty() {
            tracing::warn!("Dropping keyword hadith hit with missing key");
            continue;
        }
        let rank = i + 1;
        let key = (hit.collection.clone(), hit.hadith_number.clone());
        match by_key.get_mut(&key) {
            Some(existing) => {
                let keyword_score = normalize_bm25(hit.bm25);
                existing.bm25_raw = Some(hit.bm25);
                existing.keyword_rank = Some(rank);
                existing.rrf_score += rrf_contribution(rank);
                existing.match_type = MatchType::Both;
                existing.score = fused_score(existing.semantic_score, Some(keyword_score));
                if existing.chapter.is_none() {
                    existing.chapter = hit.chapter;
                }
            }
            None => {
                by_key.insert(key, hadith_from_keyword(hit, rank));
            }
        }
    }

    let mut results: Vec<HadithRankedResult> = by_key.into_values().collect();
    results.sort_by(|a, b| {
        rank_order(a, b, |r| r.score, |r| r.rrf_score, |r| format!("{:?}", r.key()))
    });
    results
}

// =============================================================================
// Multi-query weighted dedupe (refine mode)
// =============================================================================

/// Merge result lists from several query variants into one ranking.
///
/// An item at 0-based rank `r` in a variant with weight `w` contributes
/// `w / (K + r + 1)`. Duplicate keys are merged with `keep_best`, which
/// must preserve the maximum of each numeric signal; `finish` receives the
/// accumulated weighted RRF so the item can record it.
pub fn dedupe_weighted<T, K>(
    variants: Vec<(f32, Vec<T>)>,
    key_of: impl Fn(&T) -> K,
    mut keep_best: impl FnMut(&mut T, &T),
    mut finish: impl FnMut(&mut T, f32),
) -> Vec<T>
where
    K: Eq + Hash + Clone + Ord,
{
    let mut merged: HashMap<K, (f32, T)> = HashMap::new();
    let mut insertion: Vec<K> = Vec::new();

    for (weight, items) in variants {
        for (rank, item) in items.into_iter().enumerate() {
            let contribution = weight / (RRF_K + rank as f32 + 1.0);
            let key = key_of(&item);
            match merged.get_mut(&key) {
                Some((total, existing)) => {
                    *total += contribution;
                    keep_best(existing, &item);
                }
                None => {
                    insertion.push(key.clone());
                    merged.insert(key, (contribution, item));
                }
            }
        }
    }

    let mut scored: Vec<(K, f32, T)> = insertion
        .into_iter()
        .filter_map(|key| {
            merged
                .remove(&key)
                .map(|(total, item)| (key, total, item))
        })
        .collect();

    scored.sort_by(|(ka, sa, _), (kb, sb, _)| {
        sb.partial_cmp(sa)
            .unwrap_or(Ordering::Equal)
            .then_with(|| ka.cmp(kb))
    });

    scored
        .into_iter()
        .map(|(_, total, mut item)| {
            finish(&mut item, total);
            item
        })
        .collect()
}

/// keep_best policy for book results: keep the maximum of every numeric
/// signal and the most informative snippet
pub fn keep_best_book(existing: &mut BookRankedResult, other: &BookRankedResult) {
    existing.semantic_score = max_opt(existing.semantic_score, other.semantic_score);
    existing.keyword_score = max_opt(existing.keyword_score, other.keyword_score);
    existing.bm25_raw = max_opt(existing.bm25_raw, other.bm25_raw);
    existing.fused_score = existing.fused_score.max(other.fused_score);
    existing.semantic_rank = min_opt(existing.semantic_rank, other.semantic_rank);
    existing.keyword_rank = min_opt(existing.keyword_rank, other.keyword_rank);
    if other.text_snippet.len() > existing.text_snippet.len() {
        existing.text_snippet = other.text_snippet.clone();
    }
    if existing.highlighted_snippet.is_none() {
        existing.highlighted_snippet = other.highlighted_snippet.clone();
    }
    if existing.match_type != other.match_type {
        existing.match_type = MatchType::Both;
    }
}

/// keep_best policy for ayah results
pub fn keep_best_ayah(existing: &mut AyahRankedResult, other: &AyahRankedResult) {
    existing.semantic_score = max_opt(existing.semantic_score, other.semantic_score);
    existing.bm25_raw = max_opt(existing.bm25_raw, other.bm25_raw);
    existing.score = existing.score.max(other.score);
    existing.semantic_rank = min_opt(existing.semantic_rank, other.semantic_rank);
    existing.keyword_rank = min_opt(existing.keyword_rank, other.keyword_rank);
    if existing.match_type != other.match_type {
        existing.match_type = MatchType::Both;
    }
}

/// keep_best policy for hadith results
pub fn keep_best_hadith(existing: &mut HadithRankedResult, other: &HadithRankedResult) {
    existing.semantic_score = max_opt(existing.semantic_score, other.semantic_score);
    existing.bm25_raw = max_opt(existing.bm25_raw, other.bm25_raw);
    existing.score = existing.score.max(other.score);
    existing.semantic_rank = min_opt(existing.semantic_rank, other.semantic_rank);
    existing.keyword_rank = min_opt(existing.keyword_rank, other.keyword_rank);
    if existing.chapter.is_none() {
        existing.chapter = other.chapter.clone();
    }
    if existing.match_type != other.match_type {
        existing.match_type = MatchType::Both;
    }
}

fn max_opt(a: Option<f32>, b: Option<f32>) -> Option<f32> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (Some(x), None) | (None, Some(x)) => Some(x),
        (None, None) => None,
    }
}

fn min_opt(a: Option<usize>, b: Option<usize>) -> Option<usize> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (Some(x), None) | (None, Some(x)) => Some(x),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sem_page(book: i64, page: i64, score: f32) -> SemanticPageHit {
        SemanticPageHit {
            book_id: book,
            page_number: page,
            snippet: format!("snippet {}:{}", book, page),
            score,
        }
    }

    fn kw_page(book: i64, page: i64, bm25: f32) -> PageHit {
        PageHit {
            book_id: book,
            page_number: page,
            snippet: format!("snippet {}:{}", book, page),
            highlight: Some(format!("<em>hit</em> {}:{}", book, page)),
            bm25,
        }
    }

    #[test]
    fn test_bm25_normalization_monotone_and_bounded() {
        assert_eq!(normalize_bm25(0.0), 0.0);
        assert!(normalize_bm25(4.0) < normalize_bm25(8.0));
        assert!(normalize_bm25(1000.0) < 1.0);
        // s / (s + 8)
        assert!((normalize_bm25(8.0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_semantic_only_preserves_order() {
        let semantic = vec![sem_page(1, 1, 0.9), sem_page(1, 2, 0.7), sem_page(2, 5, 0.5)];
        let fused = fuse_books(semantic.clone(), Vec::new());
        assert_eq!(fused.len(), 3);
        for (result, hit) in fused.iter().zip(&semantic) {
            assert_eq!(result.key(), (hit.book_id, hit.page_number));
            assert_eq!(result.fused_score, hit.score);
            assert_eq!(result.match_type, MatchType::Semantic);
            assert!(result.keyword_rank.is_none());
        }
    }

    #[test]
    fn test_keyword_only_normalizes_scores() {
        let keyword = vec![kw_page(1, 1, 24.0), kw_page(1, 2, 8.0)];
        let fused = fuse_books(Vec::new(), keyword);
        assert_eq!(fused[0].key(), (1, 1));
        assert!((fused[0].fused_score - 0.75).abs() < 1e-6);
        assert!((fused[1].fused_score - 0.5).abs() < 1e-6);
        assert_eq!(fused[0].match_type, MatchType::Keyword);
        assert_eq!(fused[0].bm25_raw, Some(24.0));
    }

    #[test]
    fn test_dual_engine_hit_rewarded() {
        // (1,1) found by both engines with modest scores; (2,2) semantic-only
        // with a higher semantic score
        let semantic = vec![sem_page(2, 2, 0.85), sem_page(1, 1, 0.8)];
        let keyword = vec![kw_page(1, 1, 24.0)];
        let fused = fuse_books(semantic, keyword);

        let both = fused.iter().find(|r| r.key() == (1, 1)).unwrap();
        assert_eq!(both.match_type, MatchType::Both);
        // 0.8 * 0.8 + 0.3 * 0.75 = 0.865 > 0.85
        assert!((both.fused_score - 0.865).abs() < 1e-4);
        assert_eq!(fused[0].key(), (1, 1));
        assert!(both.semantic_rank.is_some() && both.keyword_rank.is_some());
    }

    #[test]
    fn test_every_hybrid_item_has_a_rank() {
        let fused = fuse_books(
            vec![sem_page(1, 1, 0.9)],
            vec![kw_page(2, 2, 10.0)],
        );
        for result in fused {
            assert!(result.semantic_rank.is_some() || result.keyword_rank.is_some());
        }
    }

    #[test]
    fn test_near_tie_broken_by_rrf() {
        // Fused scores land exactly equal: (1,1) gives
        // 0.8 * 0.55 + 0.3 * (2 / (2 + 8)) = 0.5, matching (2,2)'s 0.5.
        // (1,1) appears in both engines so its RRF is higher and wins.
        let semantic = vec![sem_page(1, 1, 0.55), sem_page(2, 2, 0.5)];
        let keyword = vec![kw_page(1, 1, 2.0)];
        let fused = fuse_books(semantic, keyword);

        let both = fused.iter().find(|r| r.key() == (1, 1)).unwrap();
        let single = fused.iter().find(|r| r.key() == (2, 2)).unwrap();
        assert!((both.fused_score - single.fused_score).abs() < TIE_EPSILON);
        assert!(both.rrf_score > single.rrf_score);
        assert_eq!(fused[0].key(), (1, 1));
    }

    #[test]
    fn test_highlight_taken_from_keyword_engine() {
        let fused = fuse_books(vec![sem_page(1, 1, 0.9)], vec![kw_page(1, 1, 10.0)]);
        assert!(fused[0].highlighted_snippet.is_some());
    }

    #[test]
    fn test_fuse_ayahs_modes_agree_with_books() {
        let semantic = vec![SemanticAyahHit {
            surah_number: 2,
            ayah_number: 255,
            ayah_end: None,
            text: "آية الكرسي".into(),
            score: 0.9,
        }];
        let keyword = vec![AyahHit {
            surah_number: 2,
            ayah_number: 255,
            ayah_end: None,
            text: "آية الكرسي".into(),
            bm25: 8.0,
        }];
        let fused = fuse_ayahs(semantic, keyword);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].match_type, MatchType::Both);
        assert!((fused[0].score - (0.8 * 0.9 + 0.3 * 0.5)).abs() < 1e-4);
    }

    #[test]
    fn test_hadith_missing_key_dropped() {
        let semantic = vec![SemanticHadithHit {
            collection: String::new(),
            hadith_number: "1".into(),
            book_id: 1,
            text: "نص".into(),
            chapter: None,
            score: 0.9,
        }];
        assert!(fuse_hadiths(semantic, Vec::new()).is_empty());
    }

    fn ranked(book: i64, page: i64, fused: f32) -> BookRankedResult {
        let mut result = book_from_semantic(sem_page(book, page, fused), 1);
        result.fused_score = fused;
        result
    }

    #[test]
    fn test_dedupe_weighted_prefers_items_in_every_variant() {
        // (1,1) appears at rank 0 in both variants; (2,2) at rank 0 in one
        let variants = vec![
            (1.0, vec![ranked(1, 1, 0.8), ranked(3, 3, 0.5)]),
            (0.8, vec![ranked(1, 1, 0.7), ranked(2, 2, 0.9)]),
        ];
        let merged = dedupe_weighted(
            variants,
            |r| r.key(),
            keep_best_book,
            |r, weighted| r.rrf_score = weighted,
        );

        assert_eq!(merged[0].key(), (1, 1));
        // keep_best kept the maximum fused score
        assert!((merged[0].fused_score - 0.8).abs() < 1e-6);
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn test_dedupe_weight_scales_contribution() {
        let variants = vec![
            (1.0, vec![ranked(1, 1, 0.5)]),
            (0.5, vec![ranked(2, 2, 0.5)]),
        ];
        let merged = dedupe_weighted(
            variants,
            |r| r.key(),
            keep_best_book,
            |r, weighted| r.rrf_score = weighted,
        );
        // same rank, double the weight, double the contribution
        assert_eq!(merged[0].key(), (1, 1));
        assert!((merged[0].rrf_score - 2.0 * merged[1].rrf_score).abs() < 1e-6);
    }

    #[test]
    fn test_keep_best_book_merges_signals() {
        let mut a = ranked(1, 1, 0.6);
        a.keyword_score = Some(0.2);
        let mut b = ranked(1, 1, 0.4);
        b.keyword_score = Some(0.7);
        b.text_snippet = "a much longer and more informative snippet".into();

        keep_best_book(&mut a, &b);
        assert_eq!(a.keyword_score, Some(0.7));
        assert!((a.fused_score - 0.6).abs() < 1e-6);
        assert!(a.text_snippet.starts_with("a much longer"));
    }
}
