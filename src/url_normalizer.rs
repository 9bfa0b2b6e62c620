//! Input URL canonicalization.
//!
//! Produces the two canonical forms the pipeline keys on: the pathful
//! canonical URL (scheme + host + path + query) used for caching and
//! per-page recording, and the base canonical URL (scheme + host) used
//! for consolidation and domain-level reporting.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};
use url::Url;

use crate::dns::DnsProber;

/// Index files stripped from path tails during normalization.
const COMMON_INDEX_FILES: [&str; 7] = [
    "index.html",
    "index.htm",
    "index.php",
    "default.html",
    "default.htm",
    "index.asp",
    "default.asp",
];

/// Query parameters dropped during normalization.
const IGNORED_QUERY_PARAMS: [&str; 1] = ["fallback"];

static TLD_SUFFIX_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.[a-zA-Z]{2,}$").unwrap());
static IPV4_SHAPE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}$").unwrap());

/// Why an input URL could not be turned into a canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlNormalizationError {
    EmptyAfterCleaning,
    InvalidUrl(String),
    UnsupportedScheme(String),
}

impl std::fmt::Display for UrlNormalizationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UrlNormalizationError::EmptyAfterCleaning => write!(f, "URL empty after cleaning"),
            UrlNormalizationError::InvalidUrl(u) => write!(f, "invalid URL: {}", u),
            UrlNormalizationError::UnsupportedScheme(s) => write!(f, "unsupported scheme: {}", s),
        }
    }
}

/// Outcome of preparing one input URL for the scraper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedUrl {
    /// Normalized pathful canonical form, ready to seed a crawl.
    pub pathful: String,
    /// Scheme + host only.
    pub base: String,
    /// Set when TLD probing ran and every candidate failed DNS.
    pub tld_probe_exhausted: bool,
}

/// Normalize any absolute URL to its pathful canonical form.
///
/// Lowercases scheme and host, strips `www.`, drops the fragment and
/// default ports, removes common index-file tails, normalizes the
/// trailing slash on empty paths only, drops ignored query parameters
/// and sorts the rest. Percent-encoding in the path is left untouched.
pub fn normalize_url(raw: &str) -> String {
    let parsed = match Url::parse(raw) {
        Ok(u) => u,
        Err(e) => {
            debug!("Could not parse URL '{}' for normalization: {}", raw, e);
            return raw.to_string();
        }
    };

    let scheme = parsed.scheme().to_lowercase();
    let host = match parsed.host_str() {
        Some(h) => h.to_lowercase(),
        None => return raw.to_string(),
    };
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();

    let mut path = parsed.path().to_string();
    for index_file in COMMON_INDEX_FILES {
        let suffix = format!("/{}", index_file);
        if path.ends_with(&suffix) {
            path.truncate(path.len() - index_file.len());
            break;
        }
    }
    if path.len() > 1 && path.ends_with('/') {
        path.pop();
    }
    if path.is_empty() {
        path.push('/');
    }

    let query = parsed.query().map(|q| {
        let mut params: Vec<&str> = q
            .split('&')
            .filter(|p| {
                let key = p.split('=').next().unwrap_or(p).to_lowercase();
                !IGNORED_QUERY_PARAMS.contains(&key.as_str())
            })
            .collect();
        params.sort_unstable();
        params.join("&")
    });

    let mut out = format!("{}://{}", scheme, host);
    if let Some(port) = parsed.port() {
        out.push_str(&format!(":{}", port));
    }
    out.push_str(&path);
    if let Some(q) = query {
        if !q.is_empty() {
            out.push('?');
            out.push_str(&q);
        }
    }
    out
}

/// Extract the base canonical URL (scheme + host, `www.` stripped) from any
/// URL string, defaulting the scheme to http when missing.
pub fn canonical_base_url(url_string: &str) -> Option<String> {
    if url_string.trim().is_empty() {
        return None;
    }
    let mut candidate = url_string.trim().to_string();
    if !candidate.starts_with("http://") && !candidate.starts_with("https://") {
        // A bare path fragment is not a domain
        if !candidate.split('/').next().unwrap_or("").contains('.') {
            return None;
        }
        candidate = format!("http://{}", candidate);
    }
    let parsed = Url::parse(&candidate).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    if host.is_empty() {
        return None;
    }
    Some(format!("{}://{}", parsed.scheme(), host))
}

/// Host part of an input URL after normalization; the key used for
/// input-duplicate pre-computation. None for unusable inputs.
pub fn input_canonical_host(url_string: &str) -> Option<String> {
    canonical_base_url(url_string).and_then(|base| {
        Url::parse(&base)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
    })
}

/// Clean and canonicalize one raw input URL, probing TLDs when the host
/// lacks one. This is the pipeline's entry point for C1.
pub async fn prepare_input_url(
    raw: &str,
    prober: &DnsProber,
    probing_tlds: &[String],
) -> Result<PreparedUrl, UrlNormalizationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(UrlNormalizationError::EmptyAfterCleaning);
    }

    let mut candidate = trimmed.to_string();
    if !candidate.contains("://") {
        candidate = format!("http://{}", candidate);
    }

    // Collapse whitespace inside the authority before parsing; inputs
    // pasted from spreadsheets sometimes carry stray blanks in the host.
    if let Some(scheme_end) = candidate.find("://") {
        let (scheme_part, rest) = candidate.split_at(scheme_end + 3);
        let (authority, tail) = match rest.find('/') {
            Some(i) => rest.split_at(i),
            None => (rest, ""),
        };
        if authority.contains(' ') {
            candidate = format!("{}{}{}", scheme_part, authority.replace(' ', ""), tail);
        }
    }

    let mut parsed = Url::parse(&candidate)
        .map_err(|_| UrlNormalizationError::InvalidUrl(trimmed.to_string()))?;

    let scheme = parsed.scheme().to_lowercase();
    if scheme != "http" && scheme != "https" {
        return Err(UrlNormalizationError::UnsupportedScheme(scheme));
    }

    let host_raw = parsed
        .host_str()
        .ok_or_else(|| UrlNormalizationError::InvalidUrl(trimmed.to_string()))?
        .to_string();

    // Whitespace inside the host label collapses away; the url crate will
    // have rejected most of these already, but inputs pasted from
    // spreadsheets sometimes carry encoded blanks.
    let mut host = host_raw.replace(' ', "").replace("%20", "").to_lowercase();
    if host.is_empty() {
        return Err(UrlNormalizationError::InvalidUrl(trimmed.to_string()));
    }
    if host == "localhost" {
        return Err(UrlNormalizationError::InvalidUrl(trimmed.to_string()));
    }
    if IPV4_SHAPE_REGEX.is_match(&host) && host.parse::<std::net::Ipv4Addr>().is_err() {
        return Err(UrlNormalizationError::InvalidUrl(trimmed.to_string()));
    }

    let mut tld_probe_exhausted = false;
    let looks_like_ip = host.parse::<std::net::Ipv4Addr>().is_ok();
    if !looks_like_ip && !TLD_SUFFIX_REGEX.is_match(&host) && !host.ends_with('.') {
        info!("Input host '{}' lacks a TLD, probing {:?}", host, probing_tlds);
        let mut probed = false;
        for tld in probing_tlds {
            let candidate_host = format!("{}.{}", host, tld);
            if prober.resolves(&candidate_host).await {
                info!("TLD probe succeeded: '{}' -> '{}'", host, candidate_host);
                host = candidate_host;
                probed = true;
                break;
            }
            debug!("TLD probe DNS lookup failed for '{}'", candidate_host);
        }
        if !probed {
            warn!(
                "TLD probing exhausted for host '{}'; the scraper may still fail on it",
                host
            );
            tld_probe_exhausted = true;
        }
    }

    parsed
        .set_host(Some(&host))
        .map_err(|_| UrlNormalizationError::InvalidUrl(trimmed.to_string()))?;

    let pathful = normalize_url(parsed.as_str());
    let base = canonical_base_url(&pathful)
        .ok_or_else(|| UrlNormalizationError::InvalidUrl(trimmed.to_string()))?;

    Ok(PreparedUrl {
        pathful,
        base,
        tld_probe_exhausted,
    })
}

/// Sanitize a company name for use in artifact filenames.
pub fn safe_company_filename(name: &str, max_len: usize) -> String {
    let sanitized: String = name
        .trim_start_matches("http://")
        .trim_start_matches("https://")
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    sanitized.chars().take(max_len).collect()
}

/// Stable short filename stem for a URL: sanitized host prefix plus a
/// 64-bit FNV-1a hash of the full normalized URL in hex.
pub fn safe_url_filename(url: &str) -> String {
    let host_part = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_default();
    let host_part: String = host_part
        .trim_start_matches("www.")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-')
        .take(15)
        .collect();

    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in url.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    format!("{}_{:016x}", host_part, hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_lowercases_and_strips_www() {
        assert_eq!(
            normalize_url("HTTP://WWW.Example.COM/Contact/"),
            "http://example.com/Contact"
        );
    }

    #[test]
    fn test_normalize_trailing_slash_on_empty_path_only() {
        assert_eq!(normalize_url("http://example.com"), "http://example.com/");
        assert_eq!(
            normalize_url("http://example.com/contact/"),
            "http://example.com/contact"
        );
    }

    #[test]
    fn test_normalize_strips_fragment_and_index_files() {
        assert_eq!(
            normalize_url("http://example.com/about/index.html#team"),
            "http://example.com/about"
        );
        assert_eq!(
            normalize_url("http://example.com/index.php"),
            "http://example.com/"
        );
    }

    #[test]
    fn test_normalize_drops_default_port_keeps_custom() {
        assert_eq!(normalize_url("http://example.com:80/"), "http://example.com/");
        assert_eq!(
            normalize_url("http://example.com:8080/x"),
            "http://example.com:8080/x"
        );
    }

    #[test]
    fn test_normalize_query_sorted_and_filtered() {
        assert_eq!(
            normalize_url("http://example.com/p?b=2&a=1&fallback=x"),
            "http://example.com/p?a=1&b=2"
        );
    }

    #[test]
    fn test_canonical_base_url() {
        assert_eq!(
            canonical_base_url("http://www.example.com/path?query").as_deref(),
            Some("http://example.com")
        );
        assert_eq!(
            canonical_base_url("example.com/path").as_deref(),
            Some("http://example.com")
        );
        assert_eq!(canonical_base_url("not a url"), None);
        assert_eq!(canonical_base_url(""), None);
    }

    #[test]
    fn test_input_canonical_host() {
        assert_eq!(
            input_canonical_host("https://www.shop.example/home").as_deref(),
            Some("shop.example")
        );
        assert_eq!(input_canonical_host("garbage"), None);
    }

    #[test]
    fn test_safe_company_filename() {
        assert_eq!(safe_company_filename("Müller & Co. GmbH", 25), "Müller___Co._GmbH");
        assert_eq!(safe_company_filename("LongName Ltd", 4), "Long");
    }

    #[test]
    fn test_safe_url_filename_is_stable() {
        let a = safe_url_filename("http://example.com/contact");
        let b = safe_url_filename("http://example.com/contact");
        let c = safe_url_filename("http://example.com/about");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("example"));
    }

    #[tokio::test]
    async fn test_prepare_rejects_invalid_inputs() {
        let prober = DnsProber::disabled();
        let tlds = vec!["de".to_string()];
        assert_eq!(
            prepare_input_url("   ", &prober, &tlds).await,
            Err(UrlNormalizationError::EmptyAfterCleaning)
        );
        assert_eq!(
            prepare_input_url("http://localhost/x", &prober, &tlds).await,
            Err(UrlNormalizationError::InvalidUrl("http://localhost/x".to_string()))
        );
        assert!(matches!(
            prepare_input_url("ftp://example.com", &prober, &tlds).await,
            Err(UrlNormalizationError::UnsupportedScheme(_))
        ));
    }

    #[tokio::test]
    async fn test_prepare_flags_exhausted_probe() {
        // The disabled prober fails every lookup, so a TLD-less host keeps
        // its original form with the exhausted flag raised.
        let prober = DnsProber::disabled();
        let tlds = vec!["de".to_string(), "com".to_string()];
        let prepared = prepare_input_url("acme", &prober, &tlds).await.unwrap();
        assert!(prepared.tld_probe_exhausted);
        assert_eq!(prepared.pathful, "http://acme/");
    }

    #[tokio::test]
    async fn test_prepare_collapses_host_whitespace() {
        let prober = DnsProber::disabled();
        let prepared = prepare_input_url("http://exa mple.com/kontakt", &prober, &[])
            .await
            .unwrap();
        assert_eq!(prepared.pathful, "http://example.com/kontakt");
    }

    #[tokio::test]
    async fn test_prepare_normalizes_scheme_and_host() {
        let prober = DnsProber::disabled();
        let prepared = prepare_input_url("  WWW.Example.COM/Kontakt ", &prober, &[])
            .await
            .unwrap();
        assert_eq!(prepared.pathful, "http://example.com/Kontakt");
        assert_eq!(prepared.base, "http://example.com");
        assert!(!prepared.tld_probe_exhausted);
    }
}
