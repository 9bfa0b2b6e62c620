//! Outbound link discovery and tiered scoring.
//!
//! Only same-host links survive. A link must pass the general-keyword gate
//! and the hard-exclusion patterns, then receives the score of the highest
//! matching tier; tiers are max-combined, never additive.

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use crate::config::ScraperConfig;
use crate::url_normalizer::normalize_url;

static ANCHOR_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());

/// A candidate internal link with its score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredLink {
    pub url: String,
    pub score: i32,
}

/// Extract and score same-host links from a fetched page.
///
/// Returned links are deduplicated by normalized URL (highest score wins)
/// and ordered by descending score, with ties broken by shorter URL then
/// lexicographically.
pub fn score_internal_links(
    html: &str,
    base_url: &str,
    config: &ScraperConfig,
) -> Vec<ScoredLink> {
    let Ok(parsed_base) = Url::parse(&normalize_url(base_url)) else {
        return Vec::new();
    };
    let base_host = parsed_base.host_str().unwrap_or_default().to_string();

    let document = Html::parse_document(html);
    let mut best: std::collections::HashMap<String, i32> = std::collections::HashMap::new();

    for anchor in document.select(&ANCHOR_SELECTOR) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if href.is_empty() {
            continue;
        }

        let Ok(absolute) = parsed_base.join(href) else {
            continue;
        };
        let normalized = normalize_url(absolute.as_str());
        let Ok(link) = Url::parse(&normalized) else {
            continue;
        };
        if link.scheme() != "http" && link.scheme() != "https" {
            continue;
        }
        if link.host_str().unwrap_or_default() != base_host {
            continue;
        }

        let anchor_text = anchor.text().collect::<String>().to_lowercase();
        let anchor_text = anchor_text.trim().to_string();
        let href_lower = normalized.to_lowercase();

        if let Some(score) = score_link(&link, &anchor_text, &href_lower, config) {
            best.entry(normalized)
                .and_modify(|s| *s = (*s).max(score))
                .or_insert(score);
        }
    }

    let mut links: Vec<ScoredLink> = best
        .into_iter()
        .map(|(url, score)| ScoredLink { url, score })
        .collect();
    links.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then(a.url.len().cmp(&b.url.len()))
            .then(a.url.cmp(&b.url))
    });
    debug!("Scored {} candidate links from {}", links.len(), base_url);
    links
}

fn score_link(
    link: &Url,
    anchor_text: &str,
    href_lower: &str,
    config: &ScraperConfig,
) -> Option<i32> {
    let path_lower = link.path().to_lowercase();

    // Hard exclusion beats everything else
    if config
        .exclude_link_path_patterns
        .iter()
        .any(|p| !p.is_empty() && path_lower.contains(p.as_str()))
    {
        debug!("Link '{}' hard-excluded by path pattern", href_lower);
        return None;
    }

    // Initial gate: some general keyword must appear in text or href
    let gate = config
        .target_link_keywords
        .iter()
        .any(|kw| anchor_text.contains(kw.as_str()) || href_lower.contains(kw.as_str()));
    if !gate {
        return None;
    }

    let segments: Vec<&str> = path_lower
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    let num_segments = segments.len();
    let excess = num_segments.saturating_sub(config.max_keyword_path_segments) as i32;

    let mut score = 0i32;

    // T1: critical keyword as exact path segment
    if config
        .critical_priority_keywords
        .iter()
        .any(|kw| segments.iter().any(|seg| *seg == kw.as_str()))
    {
        score = score.max(100 - (excess * 5).min(20));
    }

    // T2: high-priority keyword as exact path segment
    if score < 90
        && config
            .high_priority_keywords
            .iter()
            .any(|kw| segments.iter().any(|seg| *seg == kw.as_str()))
    {
        score = score.max(90 - (excess * 5).min(20));
    }

    // T3: any priority keyword as an exact segment, weighted by position
    if score < 80 {
        for kw in config
            .critical_priority_keywords
            .iter()
            .chain(config.high_priority_keywords.iter())
        {
            if let Some(idx) = segments.iter().position(|seg| *seg == kw.as_str()) {
                score = score.max(80 - (idx as i32 * 5) - (excess * 5).min(15));
            }
        }
    }

    // T4: general keyword as substring of a segment
    if score < 50
        && config
            .target_link_keywords
            .iter()
            .any(|kw| segments.iter().any(|seg| seg.contains(kw.as_str())))
    {
        score = score.max(50);
    }

    // T5: general keyword in the anchor text only
    if score < 40
        && config
            .target_link_keywords
            .iter()
            .any(|kw| anchor_text.contains(kw.as_str()))
    {
        score = score.max(40);
    }

    Some(score)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ScraperConfig {
        ScraperConfig::default()
    }

    fn score_of(links: &[ScoredLink], url: &str) -> Option<i32> {
        links.iter().find(|l| l.url == url).map(|l| l.score)
    }

    #[test]
    fn test_critical_segment_scores_100() {
        let html = r#"<a href="/kontakt">Kontakt</a>"#;
        let links = score_internal_links(html, "http://example.com/", &config());
        assert_eq!(score_of(&links, "http://example.com/kontakt"), Some(100));
    }

    #[test]
    fn test_high_priority_segment_scores_90() {
        let html = r#"<a href="/datenschutz">Datenschutz</a>"#;
        let links = score_internal_links(html, "http://example.com/", &config());
        assert_eq!(score_of(&links, "http://example.com/datenschutz"), Some(90));
    }

    #[test]
    fn test_depth_penalty_applies_beyond_max_segments() {
        // Four segments, max is 3: one excess segment costs 5 points
        let html = r#"<a href="/a/b/c/kontakt">Kontakt</a>"#;
        let links = score_internal_links(html, "http://example.com/", &config());
        assert_eq!(score_of(&links, "http://example.com/a/b/c/kontakt"), Some(95));
    }

    #[test]
    fn test_substring_match_scores_50() {
        let html = r#"<a href="/kontaktformular-x">Formular</a>"#;
        let links = score_internal_links(html, "http://example.com/", &config());
        assert_eq!(
            score_of(&links, "http://example.com/kontaktformular-x"),
            Some(50)
        );
    }

    #[test]
    fn test_anchor_text_only_scores_40() {
        let html = r#"<a href="/seite-neun">Unser Kontakt</a>"#;
        let links = score_internal_links(html, "http://example.com/", &config());
        assert_eq!(score_of(&links, "http://example.com/seite-neun"), Some(40));
    }

    #[test]
    fn test_offsite_links_rejected() {
        let html = r#"<a href="http://other.example/kontakt">Kontakt</a>"#;
        let links = score_internal_links(html, "http://example.com/", &config());
        assert!(links.is_empty());
    }

    #[test]
    fn test_excluded_path_rejected_even_with_keyword() {
        let html = r#"<a href="/blog/kontakt">Kontakt</a>"#;
        let links = score_internal_links(html, "http://example.com/", &config());
        assert!(links.is_empty());
    }

    #[test]
    fn test_gate_rejects_links_without_any_keyword() {
        let html = r#"<a href="/produkte">Produkte</a>"#;
        let links = score_internal_links(html, "http://example.com/", &config());
        assert!(links.is_empty());
    }

    #[test]
    fn test_tier_is_max_combined_not_additive() {
        // "kontakt" is critical (T1) and also a general target keyword (T4);
        // the link scores 100, not 150.
        let html = r#"<a href="/kontakt">Kontakt</a>"#;
        let links = score_internal_links(html, "http://example.com/", &config());
        assert_eq!(score_of(&links, "http://example.com/kontakt"), Some(100));
    }

    #[test]
    fn test_ordering_score_then_length_then_lexicographic() {
        let html = concat!(
            r#"<a href="/about">about</a>"#,
            r#"<a href="/kontakt">kontakt</a>"#,
            r#"<a href="/legal">legal</a>"#,
        );
        let links = score_internal_links(html, "http://example.com/", &config());
        let urls: Vec<&str> = links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "http://example.com/kontakt",
                "http://example.com/about",
                "http://example.com/legal",
            ]
        );
        // about and legal both score 90; about wins on length
        assert_eq!(links[1].score, links[2].score);
    }

    #[test]
    fn test_duplicate_hrefs_keep_best_score() {
        let html = concat!(
            r#"<a href="/kontakt/">Kontakt</a>"#,
            r#"<a href="/kontakt">mehr</a>"#,
        );
        let links = score_internal_links(html, "http://example.com/", &config());
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].score, 100);
    }
}
