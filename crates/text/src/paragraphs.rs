//! HTML paragraph extraction
//!
//! Page content is stored as loose HTML. Translations are stored per
//! paragraph index, so the extractor must report each paragraph's position
//! in the original document, not in the filtered output.

use once_cell::sync::Lazy;
use regex::Regex;

/// One extracted paragraph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paragraph {
    /// Sequential position in the original HTML
    pub index: usize,
    pub text: String,
}

static P_ELEMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<p[^>]*>(.*?)</p>").unwrap());

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

static TITLE_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)<span[^>]*class="[^"]*title[^"]*"[^>]*>(.*?)</span>"#).unwrap());

/// Extract paragraphs from an HTML fragment.
///
/// Prefers `<p>` elements; pages without them fall back to newline
/// splitting of the tag-stripped text, after title spans that wrap across
/// lines are joined so a heading does not shatter into fragments.
pub fn extract_paragraphs(html: &str) -> Vec<Paragraph> {
    let from_elements: Vec<Paragraph> = P_ELEMENT
        .captures_iter(html)
        .enumerate()
        .filter_map(|(index, cap)| {
            let text = strip_tags(&cap[1]);
            if text.is_empty() {
                None
            } else {
                Some(Paragraph { index, text })
            }
        })
        .collect();

    if !from_elements.is_empty() {
        return from_elements;
    }

    // Join title spans that wrap across lines before splitting
    let joined = TITLE_SPAN.replace_all(html, |cap: &regex::Captures| {
        let inner: String = cap[1].split_whitespace().collect::<Vec<_>>().join(" ");
        format!("<span class=\"title\">{}</span>", inner)
    });

    strip_tags_keep_lines(&joined)
        .lines()
        .enumerate()
        .filter_map(|(index, line)| {
            let text = line.trim();
            if text.is_empty() {
                None
            } else {
                Some(Paragraph {
                    index,
                    text: text.to_string(),
                })
            }
        })
        .collect()
}

fn strip_tags(html: &str) -> String {
    let stripped = TAG.replace_all(html, " ");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_tags_keep_lines(html: &str) -> String {
    // <br> acts as a line break, other tags vanish
    let with_breaks = html.replace("<br>", "\n").replace("<br/>", "\n").replace("<br />", "\n");
    TAG.replace_all(&with_breaks, "").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_p_elements() {
        let html = "<p>الحمد لله</p><p>رب العالمين</p>";
        let paragraphs = extract_paragraphs(html);
        assert_eq!(paragraphs.len(), 2);
        assert_eq!(paragraphs[0].index, 0);
        assert_eq!(paragraphs[0].text, "الحمد لله");
        assert_eq!(paragraphs[1].index, 1);
    }

    #[test]
    fn test_empty_p_keeps_original_indices() {
        let html = "<p>first</p><p>  </p><p>third</p>";
        let paragraphs = extract_paragraphs(html);
        assert_eq!(paragraphs.len(), 2);
        assert_eq!(paragraphs[0].index, 0);
        // the blank middle element still occupies index 1
        assert_eq!(paragraphs[1].index, 2);
        assert_eq!(paragraphs[1].text, "third");
    }

    #[test]
    fn test_inner_markup_stripped() {
        let html = "<p>قال <b>النبي</b> صلى الله عليه وسلم</p>";
        let paragraphs = extract_paragraphs(html);
        assert_eq!(paragraphs[0].text, "قال النبي صلى الله عليه وسلم");
    }

    #[test]
    fn test_newline_fallback() {
        let text = "السطر الاول\n\nالسطر الثاني";
        let paragraphs = extract_paragraphs(text);
        assert_eq!(paragraphs.len(), 2);
        assert_eq!(paragraphs[0].index, 0);
        // blank line occupies index 1
        assert_eq!(paragraphs[1].index, 2);
    }

    #[test]
    fn test_title_span_joined_in_fallback() {
        let html = "<span class=\"chapter-title\">باب\nصلاة الجماعة</span>\nنص الباب";
        let paragraphs = extract_paragraphs(html);
        assert_eq!(paragraphs[0].text, "باب صلاة الجماعة");
        assert_eq!(paragraphs[1].text, "نص الباب");
    }

    #[test]
    fn test_empty_input() {
        assert!(extract_paragraphs("").is_empty());
    }
}
