//! Text normalization for extracted article content.
//!
//! Extractors hand back text with non-breaking spaces, typographic quotes,
//! runs of blank lines and stray zero-width characters. Everything that is
//! persisted passes through [`normalize`] first. [`extract_keywords`] and
//! [`summarize`] are the fallbacks used when no extraction strategy supplied
//! keywords or a summary.

use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w+\b").unwrap());

/// Words never reported as keywords.
const STOPWORDS: [&str; 17] = [
    "and", "the", "is", "in", "of", "to", "a", "for", "was", "that", "on", "as", "with", "it",
    "this", "are", "by",
];

/// Values some publishers emit in place of a missing field.
const SENTINELS: [&str; 5] = ["n/a", "na", "unknown", "none", "null"];

/// Collapse every whitespace run to one space and trim both ends.
pub fn clean_text(s: &str) -> String {
    WHITESPACE.replace_all(s.trim(), " ").into_owned()
}

/// Map common non-ASCII punctuation to its closest ASCII form.
///
/// Letters are left alone; only quotes, dashes, ellipses, bullets and
/// exotic spaces are rewritten. Zero-width characters are dropped.
pub fn to_ascii_punctuation(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}' | '\u{2039}'
            | '\u{203A}' => out.push('\''),
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2033}' | '\u{00AB}'
            | '\u{00BB}' => out.push('"'),
            '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}' | '\u{2015}'
            | '\u{2212}' => out.push('-'),
            '\u{2026}' => out.push_str("..."),
            '\u{2022}' | '\u{00B7}' => out.push('*'),
            '\u{00A0}' | '\u{2002}' | '\u{2003}' | '\u{2007}' | '\u{2008}' | '\u{2009}'
            | '\u{200A}' | '\u{202F}' | '\u{205F}' | '\u{3000}' => out.push(' '),
            '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}' => {}
            _ => out.push(c),
        }
    }
    out
}

/// Full normalization applied to headline, body and summary.
pub fn normalize(s: &str) -> String {
    clean_text(&to_ascii_punctuation(s))
}

/// Whether a value is a placeholder for "no data" rather than real content.
pub fn is_sentinel(s: &str) -> bool {
    let lowered = s.trim().to_lowercase();
    SENTINELS.contains(&lowered.as_str())
}

/// Normalize a candidate field value; `None` when nothing usable remains.
pub fn usable(s: &str) -> Option<String> {
    let normalized = normalize(s);
    if normalized.is_empty() || is_sentinel(&normalized) {
        None
    } else {
        Some(normalized)
    }
}

/// Most frequent non-stopword tokens, most frequent first.
///
/// Ties keep first-occurrence order so the result is deterministic. Purely
/// numeric tokens are skipped.
///
/// # Arguments
///
/// * `text` - The text to mine
/// * `max` - Maximum number of keywords to return
pub fn extract_keywords(text: &str, max: usize) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (position, m) in WORD.find_iter(&lowered).enumerate() {
        let word = m.as_str();
        if STOPWORDS.contains(&word) || word.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        counts.entry(word).or_insert((0, position)).0 += 1;
    }

    counts
        .into_iter()
        .sorted_by(|(_, (ca, pa)), (_, (cb, pb))| cb.cmp(ca).then(pa.cmp(pb)))
        .take(max)
        .map(|(word, _)| word.to_string())
        .collect()
}

/// Split text into sentences after `.`, `!` or `?` followed by spaces.
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') && chars.peek().is_some_and(|(_, next)| *next == ' ') {
            let end = i + c.len_utf8();
            out.push(text[start..end].trim());
            while chars.peek().is_some_and(|(_, next)| *next == ' ') {
                chars.next();
            }
            start = chars.peek().map_or(text.len(), |(j, _)| *j);
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out.retain(|s| !s.is_empty());
    out
}

/// The first `max_sentences` sentences of `text`, whitespace-normalized.
pub fn summarize(text: &str, max_sentences: usize) -> String {
    let cleaned = normalize(text);
    sentences(&cleaned).into_iter().take(max_sentences).join(" ")
}

/// Split a raw byline into individual author names.
///
/// Handles `By A and B`, comma, ampersand and pipe separated lists; drops
/// URLs, sentinels and implausibly long fragments.
pub fn split_authors(raw: &str) -> Vec<String> {
    let cleaned = normalize(raw);
    let without_by = cleaned
        .strip_prefix("By ")
        .or_else(|| cleaned.strip_prefix("by "))
        .unwrap_or(&cleaned);

    without_by
        .split([',', '&', '|', ';'])
        .flat_map(|part| part.split(" and "))
        .map(str::trim)
        .filter(|name| {
            !name.is_empty()
                && name.len() <= 60
                && !name.starts_with("http")
                && !is_sentinel(name)
        })
        .map(str::to_string)
        .unique()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  Sensex \n\n  rallies\t 500 points  "), "Sensex rallies 500 points");
    }

    #[test]
    fn test_normalize_maps_punctuation() {
        let raw = "\u{201C}Guidance\u{201D} \u{2014} it\u{2019}s raised\u{2026}\u{00A0}again";
        assert_eq!(normalize(raw), "\"Guidance\" - it's raised... again");
    }

    #[test]
    fn test_normalize_drops_zero_width() {
        assert_eq!(normalize("Nif\u{200B}ty"), "Nifty");
        assert_eq!(normalize("\u{200B}\u{FEFF}"), "");
    }

    #[test]
    fn test_usable_rejects_sentinels() {
        assert_eq!(usable("  N/A "), None);
        assert_eq!(usable("unknown"), None);
        assert_eq!(usable("NULL"), None);
        assert_eq!(usable("   "), None);
        assert_eq!(usable(" Infosys "), Some("Infosys".to_string()));
    }

    #[test]
    fn test_extract_keywords_by_frequency() {
        let text = "Infosys shares rose. Infosys results beat estimates. Shares of Infosys and TCS rose in 2025.";
        let keywords = extract_keywords(text, 3);
        assert_eq!(keywords, vec!["infosys", "shares", "rose"]);
    }

    #[test]
    fn test_extract_keywords_skips_stopwords_and_numbers() {
        let keywords = extract_keywords("The the the of 2025 2025 bank", 5);
        assert_eq!(keywords, vec!["bank"]);
    }

    #[test]
    fn test_summarize_takes_leading_sentences() {
        let text = "First point. Second point! Third point? Fourth point.";
        assert_eq!(summarize(text, 3), "First point. Second point! Third point?");
    }

    #[test]
    fn test_summarize_keeps_decimal_numbers_intact() {
        let text = "Sensex rose 1.5 per cent today. Banks led.";
        assert_eq!(summarize(text, 1), "Sensex rose 1.5 per cent today.");
    }

    #[test]
    fn test_summarize_without_terminal_punctuation() {
        assert_eq!(summarize("Only one fragment", 3), "Only one fragment");
        assert_eq!(summarize("", 3), "");
    }

    #[test]
    fn test_split_authors() {
        assert_eq!(
            split_authors("By Priya Sharma and Rahul Mehta"),
            vec!["Priya Sharma", "Rahul Mehta"]
        );
        assert_eq!(
            split_authors("PTI, Reuters | PTI"),
            vec!["PTI", "Reuters"]
        );
        assert!(split_authors("https://example.com/author/x").is_empty());
    }
}
