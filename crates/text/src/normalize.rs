//! Arabic query normalization and analysis

use once_cell::sync::Lazy;
use regex::Regex;

use maktaba_core::{Query, Script};

/// Queries whose normalized no-space length falls below this skip the
/// semantic branch entirely.
const MIN_SEMANTIC_LEN: usize = 4;

/// Normalize Arabic text for matching.
///
/// Strips tashkeel (U+064B–U+065F) and the dagger alef (U+0670), folds the
/// alef variants and alef wasla to bare alef, drops standalone hamza, folds
/// alef maqsura to yeh and teh marbuta to heh, then collapses whitespace.
/// Idempotent: `normalize(normalize(s)) == normalize(s)`.
pub fn normalize(text: &str) -> String {
    let folded: String = text
        .chars()
        .filter_map(|c| match c {
            '\u{064B}'..='\u{065F}' | '\u{0670}' => None,
            '\u{0621}' => None,
            '\u{0622}' | '\u{0623}' | '\u{0625}' | '\u{0671}' => Some('\u{0627}'),
            '\u{0649}' => Some('\u{064A}'),
            '\u{0629}' => Some('\u{0647}'),
            other => Some(other),
        })
        .collect();

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Detect the dominant script of a query.
///
/// Any Arabic codepoint wins; otherwise a non-empty all-digit query is
/// numeric; everything else is latin.
pub fn detect_script(text: &str) -> Script {
    let mut has_digit = false;
    let mut has_other = false;
    let mut non_space = 0usize;

    for c in text.chars() {
        if c.is_whitespace() {
            continue;
        }
        non_space += 1;
        if is_arabic_char(c) {
            return Script::Arabic;
        }
        if c.is_ascii_digit() {
            has_digit = true;
        } else {
            has_other = true;
        }
    }

    if non_space > 0 && has_digit && !has_other {
        Script::Numeric
    } else {
        Script::Latin
    }
}

fn is_arabic_char(c: char) -> bool {
    matches!(
        c,
        '\u{0600}'..='\u{06FF}'
            | '\u{0750}'..='\u{077F}'
            | '\u{08A0}'..='\u{08FF}'
            | '\u{FB50}'..='\u{FDFF}'
            | '\u{FE70}'..='\u{FEFF}'
    )
}

static QUOTE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r#""([^"]+)""#).unwrap(),
        Regex::new(r"«([^»]+)»").unwrap(),
        Regex::new(r#"„([^“”"]+)["“”]"#).unwrap(),
        Regex::new(r"“([^”]+)”").unwrap(),
    ]
});

/// Extract quoted phrases.
///
/// A matched pair only counts as a phrase when its content spans at least
/// two tokens; single quoted words behave like plain terms.
pub fn extract_phrases(text: &str) -> Vec<String> {
    let mut phrases = Vec::new();
    for pattern in QUOTE_PATTERNS.iter() {
        for cap in pattern.captures_iter(text) {
            let content = normalize(&cap[1]);
            if content.split_whitespace().count() >= 2 {
                phrases.push(content);
            }
        }
    }
    phrases
}

/// Analyze a raw query into its immutable [`Query`] form
pub fn analyze(raw: &str) -> Query {
    let normalized = normalize(raw);
    let phrases = extract_phrases(raw);
    let tokens = normalized
        .split_whitespace()
        .map(str::to_string)
        .collect::<Vec<_>>();

    Query {
        raw: raw.to_string(),
        script: detect_script(raw),
        has_quoted_phrase: !phrases.is_empty(),
        normalized,
        tokens,
        phrases,
    }
}

/// Similarity cutoff adjusted for query length.
///
/// Short queries produce noisy neighborhoods in the vector space, so the
/// cutoff rises as the query shrinks. Single-word queries are treated as at
/// most six characters long regardless of their actual length.
pub fn dynamic_threshold(base: f32, normalized: &str) -> f32 {
    let chars = normalized.chars().filter(|c| !c.is_whitespace()).count();
    let words = normalized.split_whitespace().count();
    let effective = if words == 1 { chars.min(6) } else { chars };

    let by_length = match effective {
        0..=3 => 0.55,
        4..=6 => 0.40,
        7..=12 => 0.30,
        _ => base,
    };

    base.max(by_length)
}

/// Whether the semantic branch should be skipped for this query
pub fn skip_semantic(query: &Query) -> bool {
    query.has_quoted_phrase || query.compact_len() < MIN_SEMANTIC_LEN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_diacritics() {
        // "الصَّلَاةُ" with fatha, shadda, damma
        let normalized = normalize("الصَّلَاةُ");
        assert!(!normalized.chars().any(|c| ('\u{064B}'..='\u{065F}').contains(&c)));
        assert_eq!(normalized, "الصلاه");
    }

    #[test]
    fn test_normalize_folds_alef_variants() {
        assert_eq!(normalize("أحمد"), "احمد");
        assert_eq!(normalize("إسلام"), "اسلام");
        assert_eq!(normalize("آية"), "ايه");
    }

    #[test]
    fn test_normalize_folds_maqsura_and_marbuta() {
        assert_eq!(normalize("مصطفى"), "مصطفي");
        assert_eq!(normalize("مدينة"), "مدينه");
    }

    #[test]
    fn test_normalize_drops_standalone_hamza() {
        assert_eq!(normalize("شيء"), "شي");
    }

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize("  كتاب   الصلاة  "), "كتاب الصلاه");
    }

    #[test]
    fn test_normalize_idempotent() {
        for s in ["الصَّلَاةُ", "  أَحْمَد  بن   حنبل ", "patience", "«بسم الله»"] {
            let once = normalize(s);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn test_script_detection() {
        assert_eq!(detect_script("الصلاة"), Script::Arabic);
        assert_eq!(detect_script("patience in Islam"), Script::Latin);
        assert_eq!(detect_script("1681"), Script::Numeric);
        assert_eq!(detect_script("12 34"), Script::Numeric);
        assert_eq!(detect_script("page 12"), Script::Latin);
        // Mixed script counts as Arabic
        assert_eq!(detect_script("tafsir التفسير"), Script::Arabic);
    }

    #[test]
    fn test_phrase_extraction() {
        let phrases = extract_phrases("\"بسم الله الرحمن الرحيم\"");
        assert_eq!(phrases.len(), 1);
        assert!(phrases[0].starts_with("بسم"));

        // Guillemets
        assert_eq!(extract_phrases("«صحيح البخاري»").len(), 1);

        // Single quoted word is not a phrase
        assert!(extract_phrases("\"الصلاة\"").is_empty());
        assert!(extract_phrases("no quotes here").is_empty());
    }

    #[test]
    fn test_analyze() {
        let query = analyze("\"بسم الله\" أحكام");
        assert!(query.has_quoted_phrase);
        assert_eq!(query.script, Script::Arabic);
        assert_eq!(query.phrases.len(), 1);
        assert!(query.tokens.len() >= 2);
    }

    #[test]
    fn test_dynamic_threshold_table() {
        // <= 3 chars
        assert_eq!(dynamic_threshold(0.2, "ال"), 0.55);
        // 4-6 chars
        assert_eq!(dynamic_threshold(0.2, "الصلاه"), 0.40);
        // single long word is capped at 6 effective chars
        assert_eq!(dynamic_threshold(0.2, "الاستغفار"), 0.40);
        // 7-12 chars over multiple words
        assert_eq!(dynamic_threshold(0.2, "كتاب الصلاه"), 0.30);
        // long multi-word query falls back to base
        assert_eq!(dynamic_threshold(0.2, "احكام الصيام في المذاهب الاربعه"), 0.2);
        // base wins when higher than the lookup
        assert_eq!(dynamic_threshold(0.6, "ال"), 0.6);
    }

    #[test]
    fn test_skip_semantic() {
        assert!(skip_semantic(&analyze("\"بسم الله الرحمن الرحيم\"")));
        assert!(skip_semantic(&analyze("ال")));
        assert!(!skip_semantic(&analyze("الصلاة")));
    }
}
