//! Page-type classification from a landed URL.
//!
//! Deterministic and pure: ordered keyword lists over the URL path, with a
//! whole-URL fallback for sites that put the telling keyword in the query
//! or host, homepage detection for bare roots, and `unknown` otherwise.

use url::Url;

use crate::config::ScraperConfig;
use crate::schemas::PageType;

pub fn classify_page(url_str: &str, config: &ScraperConfig) -> PageType {
    if url_str.is_empty() {
        return PageType::Unknown;
    }
    let url_lower = url_str.to_lowercase();
    let path_lower = Url::parse(&url_lower)
        .ok()
        .map(|u| u.path().to_string())
        .unwrap_or_default();

    let ordered: [(&[String], PageType); 4] = [
        (&config.page_type_keywords_contact, PageType::Contact),
        (&config.page_type_keywords_imprint, PageType::Imprint),
        (&config.page_type_keywords_legal, PageType::Legal),
        (&config.page_type_keywords_general, PageType::GeneralContent),
    ];

    for (keywords, page_type) in &ordered {
        if keywords.iter().any(|kw| path_lower.contains(kw.as_str())) {
            return *page_type;
        }
    }
    // The path carries no keyword; a hit anywhere else in the URL still
    // counts, matched in the same order.
    for (keywords, page_type) in &ordered {
        if keywords.iter().any(|kw| url_lower.contains(kw.as_str())) {
            return *page_type;
        }
    }

    if path_lower.is_empty() || path_lower == "/" {
        return PageType::Homepage;
    }

    PageType::Unknown
}
