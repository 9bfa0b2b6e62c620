//! Per-site crawling: scoring-priority queue, page budgets with a
//! high-priority bypass, landed-URL deduplication, cleaned-text
//! persistence, and DNS-error fallbacks for the seed URL.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::AppConfig;
use crate::fetcher::{FetchOutcome, PageFetcher};
use crate::link_scorer::score_internal_links;
use crate::page_classifier::classify_page;
use crate::schemas::{ScrapedPage, ScraperStatus, SiteScrapeResult};
use crate::url_normalizer::{normalize_url, safe_company_filename, safe_url_filename};

/// One crawl attempt record: the seed pathful that was tried and how it ended.
#[derive(Debug, Clone)]
pub struct SeedAttempt {
    pub pathful_url: String,
    pub status: ScraperStatus,
}

/// Outcome of crawling one input URL including any DNS fallback seeds.
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub result: SiteScrapeResult,
    /// Every seed pathful attempted, in order, with its status.
    pub attempts: Vec<SeedAttempt>,
}

pub struct SiteCrawler {
    config: Arc<AppConfig>,
    fetcher: Arc<dyn PageFetcher>,
}

impl SiteCrawler {
    pub fn new(config: Arc<AppConfig>, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { config, fetcher }
    }

    /// Crawl a seed URL; on a seed DNS error, walk the configured fallback
    /// hosts (hyphen simplification, then `.de`→`.com`), each as a fresh
    /// seed, stopping at the first success.
    pub async fn crawl_with_fallbacks(
        &self,
        seed_url: &str,
        company_name: &str,
        cleaned_text_root: &Path,
        globally_processed: Arc<Mutex<HashSet<String>>>,
    ) -> CrawlOutcome {
        let mut attempts = Vec::new();
        let first = self
            .crawl_site(seed_url, company_name, cleaned_text_root, globally_processed.clone())
            .await;
        attempts.push(SeedAttempt {
            pathful_url: seed_url.to_string(),
            status: first.status,
        });

        if first.status != ScraperStatus::ErrorDns || !self.config.scraper.enable_dns_error_fallbacks
        {
            return CrawlOutcome {
                result: first,
                attempts,
            };
        }

        for fallback_url in dns_fallback_urls(seed_url) {
            info!(
                "Seed '{}' hit a DNS error; trying fallback '{}'",
                seed_url, fallback_url
            );
            let result = self
                .crawl_site(
                    &fallback_url,
                    company_name,
                    cleaned_text_root,
                    globally_processed.clone(),
                )
                .await;
            let status = result.status;
            attempts.push(SeedAttempt {
                pathful_url: fallback_url,
                status,
            });
            if status == ScraperStatus::Success {
                return CrawlOutcome { result, attempts };
            }
        }

        CrawlOutcome {
            result: first,
            attempts,
        }
    }

    /// Crawl one seed pathful URL: seed the queue at score 100, pop by
    /// highest score, enforce the page budget with the high-priority
    /// bypass, record landed URLs as visited, and follow internal links up
    /// to the depth limit.
    pub async fn crawl_site(
        &self,
        seed_url: &str,
        company_name: &str,
        cleaned_text_root: &Path,
        globally_processed: Arc<Mutex<HashSet<String>>>,
    ) -> SiteScrapeResult {
        let scraper_cfg = &self.config.scraper;
        let seed = normalize_url(seed_url);
        info!("Starting crawl of '{}' for '{}'", seed, company_name);

        let mut queue: Vec<(String, usize, i32)> = vec![(seed.clone(), 0, 100)];
        let mut queued_this_call: HashSet<String> = HashSet::from([seed.clone()]);
        let mut pages: Vec<ScrapedPage> = Vec::new();
        let mut canonical_entry_url: Option<String> = None;
        let mut pages_fetched = 0usize;
        let mut bypass_pages_fetched = 0usize;
        let mut seed_status: Option<ScraperStatus> = None;

        let company_file_part = safe_company_filename(
            company_name,
            self.config.output.filename_company_name_max_len,
        );

        while !queue.is_empty() {
            queue.sort_by(|a, b| b.2.cmp(&a.2).then(a.1.cmp(&b.1)));
            let (current_url, depth, score) = queue.remove(0);

            let budget = scraper_cfg.max_pages_per_domain;
            if budget > 0 && pages_fetched >= budget {
                if score < scraper_cfg.score_threshold_for_limit_bypass {
                    debug!(
                        "Page budget ({}) reached; dropping '{}' (score {})",
                        budget, current_url, score
                    );
                    continue;
                }
                if bypass_pages_fetched >= scraper_cfg.max_high_priority_pages_after_limit {
                    debug!(
                        "Page budget and bypass budget reached; dropping '{}' (score {})",
                        current_url, score
                    );
                    continue;
                }
            }

            match self.fetcher.fetch(&current_url).await {
                FetchOutcome::Success(fetched) => {
                    pages_fetched += 1;
                    if budget > 0 && pages_fetched > budget {
                        bypass_pages_fetched += 1;
                    }

                    let landed = normalize_url(&fetched.final_url);
                    debug!(
                        "Fetched '{}' (depth {}, score {}), landed on '{}'",
                        current_url, depth, score, landed
                    );

                    if depth == 0 {
                        if seed_status.is_none() {
                            seed_status = Some(ScraperStatus::Success);
                        }
                        if canonical_entry_url.is_none() {
                            canonical_entry_url = Some(landed.clone());
                            info!(
                                "Canonical entry URL for '{}' set to '{}'",
                                company_name, landed
                            );
                        }
                    }

                    // Visited is keyed on the landed URL so redirect chains
                    // converging on one page are fetched once per run.
                    {
                        let mut visited = globally_processed.lock().await;
                        if visited.contains(&landed) {
                            debug!(
                                "Landed URL '{}' already processed in this run, skipping content",
                                landed
                            );
                            continue;
                        }
                        visited.insert(landed.clone());
                    }
                    queued_this_call.insert(landed.clone());

                    let cleaned = extract_text_from_html(&fetched.html);
                    match self.store_cleaned_text(
                        cleaned_text_root,
                        &company_file_part,
                        &landed,
                        &cleaned,
                    ) {
                        Ok(text_path) => {
                            let page_type = classify_page(&landed, scraper_cfg);
                            debug!("Classified '{}' as {}", landed, page_type);
                            pages.push(ScrapedPage {
                                requested_url: current_url.clone(),
                                landed_url: landed.clone(),
                                text_path,
                                page_type,
                            });
                        }
                        Err(e) => {
                            warn!("Failed to store cleaned text for '{}': {}", landed, e);
                        }
                    }

                    if depth < scraper_cfg.max_depth_internal_links {
                        let scored = score_internal_links(&fetched.html, &landed, scraper_cfg);
                        let mut added = 0usize;
                        for link in scored {
                            if link.score < scraper_cfg.min_score_to_queue {
                                continue;
                            }
                            let already_global = {
                                let visited = globally_processed.lock().await;
                                visited.contains(&link.url)
                            };
                            if already_global || queued_this_call.contains(&link.url) {
                                continue;
                            }
                            queued_this_call.insert(link.url.clone());
                            queue.push((link.url, depth + 1, link.score));
                            added += 1;
                        }
                        if added > 0 {
                            debug!(
                                "Queued {} new links from '{}' (queue size {})",
                                added,
                                landed,
                                queue.len()
                            );
                        }
                    }
                }
                FetchOutcome::Failed(status) => {
                    debug!("Fetch of '{}' failed with {}", current_url, status);
                    if depth == 0 && current_url == seed {
                        // Seed failure ends the site crawl immediately.
                        return SiteScrapeResult {
                            pages,
                            status,
                            canonical_entry_url,
                        };
                    }
                }
            }
        }

        if !pages.is_empty() {
            info!(
                "Crawl of '{}' complete: {} page(s), {} fetched",
                seed,
                pages.len(),
                pages_fetched
            );
            SiteScrapeResult {
                pages,
                status: ScraperStatus::Success,
                canonical_entry_url,
            }
        } else if canonical_entry_url.is_some() {
            // Navigation worked but every page was already claimed by an
            // earlier row's crawl of the same site.
            SiteScrapeResult {
                pages,
                status: ScraperStatus::AlreadyProcessed,
                canonical_entry_url,
            }
        } else {
            SiteScrapeResult {
                pages,
                status: seed_status.unwrap_or(ScraperStatus::ErrorGeneric),
                canonical_entry_url,
            }
        }
    }

    fn store_cleaned_text(
        &self,
        root: &Path,
        company_file_part: &str,
        landed_url: &str,
        cleaned: &str,
    ) -> std::io::Result<PathBuf> {
        let host = Url::parse(landed_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .unwrap_or_else(|| "unknown-host".to_string());
        let safe_host: String = host
            .trim_start_matches("www.")
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '.' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();

        let dir = root.join(safe_host);
        std::fs::create_dir_all(&dir)?;
        let filename = format!(
            "{}__{}_cleaned.txt",
            company_file_part,
            safe_url_filename(landed_url)
        );
        let path = dir.join(filename);
        std::fs::write(&path, cleaned)?;
        Ok(path)
    }
}

/// Visible text of a page with scripts, styles and markup stripped, and
/// whitespace collapsed.
pub fn extract_text_from_html(html: &str) -> String {
    use scraper::Html;

    let document = Html::parse_document(html);
    let mut collected = String::new();

    for node in document.root_element().descendants() {
        if let Some(text) = node.value().as_text() {
            let in_skipped_element = node.ancestors().any(|a| {
                a.value()
                    .as_element()
                    .map(|e| matches!(e.name(), "script" | "style" | "noscript" | "template"))
                    .unwrap_or(false)
            });
            if !in_skipped_element {
                collected.push_str(text);
                collected.push(' ');
            }
        }
    }

    collected.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Fallback seed URLs for a DNS-failed seed, in attempt order: hyphen
/// simplification of the first host label (tail half, then head half),
/// then the `.de`→`.com` swap on the original host. The path and query of
/// the seed are preserved.
pub fn dns_fallback_urls(seed_url: &str) -> Vec<String> {
    let Ok(parsed) = Url::parse(seed_url) else {
        return Vec::new();
    };
    let Some(host) = parsed.host_str() else {
        return Vec::new();
    };

    let mut hosts: Vec<String> = Vec::new();
    if let Some((first_label, rest)) = host.split_once('.') {
        if let Some((head, tail)) = first_label.split_once('-') {
            if !tail.is_empty() {
                hosts.push(format!("{}.{}", tail, rest));
            }
            if !head.is_empty() {
                hosts.push(format!("{}.{}", head, rest));
            }
        }
    }
    if let Some(stem) = host.strip_suffix(".de") {
        hosts.push(format!("{}.com", stem));
    }

    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for candidate in hosts {
        if candidate == host || !seen.insert(candidate.clone()) {
            continue;
        }
        let mut url = parsed.clone();
        if url.set_host(Some(&candidate)).is_ok() {
            out.push(normalize_url(url.as_str()));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_text_skips_scripts_and_styles() {
        let html = r#"<html><head><style>.x{color:red}</style></head>
            <body><h1>Muster GmbH</h1><script>var a=1;</script>
            <p>Rufen   Sie uns an:
            +49 30 1234</p></body></html>"#;
        let text = extract_text_from_html(html);
        assert_eq!(text, "Muster GmbH Rufen Sie uns an: +49 30 1234");
    }

    #[test]
    fn test_dns_fallbacks_hyphen_then_tld_swap() {
        assert_eq!(
            dns_fallback_urls("http://foo-bar.de/"),
            vec![
                "http://bar.de/".to_string(),
                "http://foo.de/".to_string(),
                "http://foo-bar.com/".to_string(),
            ]
        );
    }

    #[test]
    fn test_dns_fallbacks_without_hyphen() {
        assert_eq!(
            dns_fallback_urls("http://example.de/kontakt"),
            vec!["http://example.com/kontakt".to_string()]
        );
    }

    #[test]
    fn test_dns_fallbacks_non_de_without_hyphen_is_empty() {
        assert!(dns_fallback_urls("http://example.com/").is_empty());
    }

    #[test]
    fn test_dns_fallbacks_preserve_path() {
        let urls = dns_fallback_urls("http://shop-online.de/kontakt?x=1");
        assert!(urls.contains(&"http://online.de/kontakt?x=1".to_string()));
    }
}
