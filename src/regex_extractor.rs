//! Regex-based phone candidate extraction from cleaned page text.
//!
//! Locates phone-shaped substrings, carries a bounded context window for
//! each, caps identical (digits, page) occurrences, and emits candidates
//! in page order for the model stage.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::debug;

use crate::schemas::PhoneCandidateItem;

/// Phone-shaped patterns: an international prefix (`+NN` or `00NN`)
/// followed by grouped digits, a parenthesized regional prefix, or a
/// leading-zero regional number with separated groups. Separators may be
/// spaces, dots, slashes, or hyphens.
static PHONE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // +49 30 123456, 0049-30-123456, +41 (0)44 123 45 67
        Regex::new(r"(?:\+|00)\d{1,3}[ \-./]?(?:\(0?\d{1,5}\)[ \-./]?)?\d(?:[ \-./]?\d){4,12}")
            .unwrap(),
        // (030) 123456, (0 30) 12 34 56
        Regex::new(r"\(0[\d ]{1,6}\)[ \-./]?\d(?:[ \-./]?\d){3,10}").unwrap(),
        // 030/123456, 030-123456, 030 123 456 (requires a separator so
        // bare long digit runs like order numbers stay out)
        Regex::new(r"\b0\d{1,5}[ \-./]\d(?:[ \-./]?\d){3,10}").unwrap(),
    ]
});

/// Digits-only dedup key; a leading international `00` collapses so that
/// `+49…` and `0049…` occurrences of one number share a key.
fn digits_key(number: &str) -> String {
    let digits: String = number.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.strip_prefix("00").unwrap_or(&digits).to_string()
}

/// Clamp a byte offset to the nearest char boundary at or below it.
fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Clamp a byte offset to the nearest char boundary at or above it.
fn ceil_char_boundary(text: &str, mut index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index
}

/// Extract phone candidates with context snippets from one page's cleaned
/// text. `snippet_chars` is the total window size, split evenly per side.
pub fn extract_candidates_from_text(
    text: &str,
    source_url: &str,
    company_name: &str,
    country_hints: &[String],
    snippet_chars: usize,
    max_identical_per_page: usize,
) -> Vec<PhoneCandidateItem> {
    // (start, end, match text) collected across all patterns, in page order
    let mut matches: Vec<(usize, usize, String)> = Vec::new();
    for pattern in PHONE_PATTERNS.iter() {
        for m in pattern.find_iter(text) {
            matches.push((m.start(), m.end(), m.as_str().trim().to_string()));
        }
    }
    matches.sort_by_key(|(start, end, _)| (*start, *end));

    // Overlapping matches from different patterns collapse to the earliest
    // widest one.
    let mut spans: Vec<(usize, usize, String)> = Vec::new();
    for (start, end, matched) in matches {
        if let Some((_, last_end, _)) = spans.last() {
            if start < *last_end {
                continue;
            }
        }
        spans.push((start, end, matched));
    }

    let half_window = snippet_chars / 2;
    let mut identical_counts: HashMap<String, usize> = HashMap::new();
    let mut candidates = Vec::new();

    for (start, end, matched) in spans {
        let key = digits_key(&matched);
        // Too few digits is noise (postcodes, years)
        if key.len() < 6 {
            continue;
        }
        let count = identical_counts.entry(key).or_insert(0);
        if *count >= max_identical_per_page {
            debug!(
                "Dropping further occurrence of '{}' on {} (cap {})",
                matched, source_url, max_identical_per_page
            );
            continue;
        }
        *count += 1;

        let snippet_start = floor_char_boundary(text, start.saturating_sub(half_window));
        let snippet_end = ceil_char_boundary(text, (end + half_window).min(text.len()));
        let snippet = text[snippet_start..snippet_end].to_string();

        candidates.push(PhoneCandidateItem {
            number: matched,
            snippet,
            source_url: source_url.to_string(),
            company_name: company_name.to_string(),
            country_hints: country_hints.to_vec(),
        });
    }

    debug!(
        "Regex extraction found {} candidate(s) on {}",
        candidates.len(),
        source_url
    );
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(text: &str) -> Vec<PhoneCandidateItem> {
        extract_candidates_from_text(text, "http://example.com/kontakt", "Muster GmbH", &[], 300, 3)
    }

    #[test]
    fn test_international_plus_prefix() {
        let items = extract("Rufen Sie uns an: +49 30 12345678 oder schreiben Sie.");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].number, "+49 30 12345678");
    }

    #[test]
    fn test_double_zero_prefix() {
        let items = extract("Zentrale: 0049 30 1234567");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].number, "0049 30 1234567");
    }

    #[test]
    fn test_parenthesized_area_code() {
        let items = extract("Telefon (030) 123 45 67 erreichbar");
        assert_eq!(items.len(), 1);
        assert!(items[0].number.starts_with("(030)"));
    }

    #[test]
    fn test_regional_with_separator() {
        let items = extract("Tel. 030/1234567");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].number, "030/1234567");
    }

    #[test]
    fn test_short_digit_runs_ignored() {
        let items = extract("Im Jahr 2024 waren wir in Halle 12-34 vertreten.");
        assert!(items.is_empty(), "got: {:?}", items);
    }

    #[test]
    fn test_snippet_window_bounds() {
        let prefix = "a".repeat(400);
        let text = format!("{} Telefon +49 30 12345678 Ende", prefix);
        let items = extract_candidates_from_text(&text, "u", "c", &[], 100, 3);
        assert_eq!(items.len(), 1);
        let snippet = &items[0].snippet;
        assert!(snippet.contains("+49 30 12345678"));
        // 50 chars each side plus the match itself
        assert!(snippet.len() <= 100 + items[0].number.len() + 2);
        assert!(snippet.ends_with("Ende"));
    }

    #[test]
    fn test_snippet_respects_char_boundaries() {
        let text = "ÄÖÜäöü ßßß Telefon +49 30 12345678 Grüße aus München";
        let items = extract_candidates_from_text(text, "u", "c", &[], 20, 3);
        assert_eq!(items.len(), 1);
        assert!(items[0].snippet.contains("+49 30 12345678"));
    }

    #[test]
    fn test_identical_number_cap_per_page() {
        let text = "+49 30 12345678 und +49 30 12345678 und +49 30 12345678 und +49 30 12345678";
        let items = extract_candidates_from_text(text, "u", "c", &[], 50, 3);
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn test_plus_and_double_zero_share_dedup_key() {
        let text = "+49 30 1234567 oder 0049 30 1234567 oder +49 30 1234567";
        let items = extract_candidates_from_text(text, "u", "c", &[], 50, 2);
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_candidates_in_page_order() {
        let items = extract("Fax 030/9999999 kommt vor Telefon +49 30 1111111.");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].number, "030/9999999");
        assert_eq!(items[1].number, "+49 30 1111111");
    }

    #[test]
    fn test_provenance_carried() {
        let items = extract("Tel +49 30 12345678");
        assert_eq!(items[0].source_url, "http://example.com/kontakt");
        assert_eq!(items[0].company_name, "Muster GmbH");
    }
}
