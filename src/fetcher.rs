//! Single-URL fetching through a headless browser.
//!
//! A fetch is one browser navigation. The robots policy is consulted
//! first, then a pooled Chrome tab performs the navigation and everything
//! is read off that single operation: the final landed URL, the rendered
//! DOM, the HTTP status of the main document response (observed through
//! the DevTools network events of the same navigation), and the
//! network-level error class when navigation itself fails. Transient
//! failures are retried with a fixed delay; hard statuses terminate
//! immediately.

use async_trait::async_trait;
use headless_chrome::protocol::cdp::Network::ResourceType;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::browser_pool;
use crate::config::ScraperConfig;
use crate::robots::RobotsCache;
use crate::schemas::ScraperStatus;

/// A successfully fetched page.
#[derive(Debug, Clone)]
pub struct FetchSuccess {
    /// URL after all HTTP-level and meta/JS redirects observed by the engine.
    pub final_url: String,
    pub html: String,
}

/// Result of one fetch attempt. Failures carry the scraper status that the
/// crawler records; they are values, not unwound errors.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Success(FetchSuccess),
    Failed(ScraperStatus),
}

impl FetchOutcome {
    pub fn status(&self) -> ScraperStatus {
        match self {
            FetchOutcome::Success(_) => ScraperStatus::Success,
            FetchOutcome::Failed(s) => *s,
        }
    }
}

/// Narrow fetch capability the crawler depends on. Production uses
/// `ChromeFetcher`; tests substitute scripted implementations.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> FetchOutcome;
}

/// Production fetcher: one pooled headless Chrome navigation per fetch,
/// with the HTTP status and the error class derived from that navigation.
pub struct ChromeFetcher {
    robots: Arc<RobotsCache>,
    user_agent: String,
    page_timeout: Duration,
    navigation_timeout: Duration,
    network_idle_timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
}

impl ChromeFetcher {
    pub fn new(config: &ScraperConfig, robots: Arc<RobotsCache>) -> Self {
        Self {
            robots,
            user_agent: config.user_agent.clone(),
            page_timeout: Duration::from_millis(config.page_timeout_ms),
            navigation_timeout: Duration::from_millis(config.navigation_timeout_ms),
            network_idle_timeout: Duration::from_millis(config.network_idle_timeout_ms),
            max_retries: config.max_retries,
            retry_delay: Duration::from_secs(config.retry_delay_seconds),
        }
    }

    async fn render(&self, url: &str) -> Result<FetchSuccess, ScraperStatus> {
        let url = url.to_string();
        let user_agent = self.user_agent.clone();
        let page_timeout = self.page_timeout;
        let navigation_timeout = self.navigation_timeout;
        let settle = self.network_idle_timeout;

        let result = tokio::time::timeout(
            navigation_timeout + settle + Duration::from_secs(5),
            tokio::task::spawn_blocking(move || {
                render_blocking(&url, &user_agent, page_timeout, settle)
            }),
        )
        .await;

        match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_err)) => {
                warn!("Render task panicked: {}", join_err);
                Err(ScraperStatus::ErrorGeneric)
            }
            Err(_elapsed) => Err(ScraperStatus::ErrorTimeout),
        }
    }
}

/// Map the HTTP status of the document response onto a scraper status.
/// Returns None for statuses the fetch proceeds on.
fn classify_http_status(status: u16) -> Option<ScraperStatus> {
    match status {
        200..=399 => None,
        404 | 410 => Some(ScraperStatus::ErrorContentNotFound),
        401 | 403 | 429 => Some(ScraperStatus::ErrorAccessDenied),
        500..=599 => Some(ScraperStatus::ErrorNetwork),
        _ => Some(ScraperStatus::ErrorGeneric),
    }
}

fn render_blocking(
    url: &str,
    user_agent: &str,
    page_timeout: Duration,
    settle: Duration,
) -> Result<FetchSuccess, ScraperStatus> {
    let guard = browser_pool::create_browser().map_err(|e| {
        warn!("Browser launch failed: {}", e);
        ScraperStatus::ErrorGeneric
    })?;

    let tab = guard.browser.new_tab().map_err(|e| {
        warn!("Tab creation failed: {}", e);
        ScraperStatus::ErrorGeneric
    })?;
    tab.set_default_timeout(page_timeout);
    if let Err(e) = tab.set_user_agent(user_agent, None, None) {
        debug!("Could not set user agent: {}", e);
    }

    // The HTTP status comes off this same navigation: the DevTools network
    // events report every response, and the last document response is the
    // page the tab finally landed on (redirect hops overwrite earlier
    // statuses). No request besides the navigation itself is issued.
    let document_status: Arc<std::sync::Mutex<Option<u16>>> =
        Arc::new(std::sync::Mutex::new(None));
    let status_slot = document_status.clone();
    if let Err(e) = tab.register_response_handling(
        "document-status",
        Box::new(move |params, _fetch_body| {
            if matches!(params.Type, ResourceType::Document) {
                if let Ok(mut slot) = status_slot.lock() {
                    *slot = Some(params.response.status as u16);
                }
            }
        }),
    ) {
        debug!("Could not register response handling: {}", e);
    }

    tab.navigate_to(url)
        .map_err(|e| classify_chrome_error(&e.to_string()))?;
    tab.wait_until_navigated()
        .map_err(|e| classify_chrome_error(&e.to_string()))?;

    // Bounded settle wait in lieu of a true network-idle signal; JS-driven
    // redirects and late DOM writes land inside this window.
    if !settle.is_zero() {
        std::thread::sleep(settle.min(Duration::from_secs(10)));
    }

    // A missing status means the event never surfaced (some error pages and
    // about: documents); content was still obtained, so proceed.
    let observed_status = document_status.lock().ok().and_then(|slot| *slot);
    if let Some(code) = observed_status {
        if let Some(failure) = classify_http_status(code) {
            debug!("Document response for '{}' had status {}", url, code);
            return Err(failure);
        }
    }

    let html = tab
        .get_content()
        .map_err(|e| classify_chrome_error(&e.to_string()))?;
    let final_url = tab.get_url();

    Ok(FetchSuccess { final_url, html })
}

fn classify_chrome_error(message: &str) -> ScraperStatus {
    let lower = message.to_lowercase();
    if lower.contains("err_name_not_resolved") {
        ScraperStatus::ErrorDns
    } else if lower.contains("err_too_many_redirects") {
        ScraperStatus::ErrorMaxRedirects
    } else if lower.contains("timeout") || lower.contains("timed out") {
        ScraperStatus::ErrorTimeout
    } else if lower.contains("err_connection")
        || lower.contains("err_internet_disconnected")
        || lower.contains("err_address_unreachable")
    {
        ScraperStatus::ErrorNetwork
    } else {
        ScraperStatus::ErrorGeneric
    }
}

#[async_trait]
impl PageFetcher for ChromeFetcher {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        if !self.robots.is_allowed(url).await {
            return FetchOutcome::Failed(ScraperStatus::ErrorRobotsDisallowed);
        }

        let mut attempt = 0u32;
        loop {
            let outcome = match self.render(url).await {
                Ok(success) => FetchOutcome::Success(success),
                Err(status) => FetchOutcome::Failed(status),
            };
            let retriable = matches!(
                outcome.status(),
                ScraperStatus::ErrorNetwork | ScraperStatus::ErrorTimeout
            );
            if !retriable || attempt >= self.max_retries {
                return outcome;
            }
            attempt += 1;
            debug!(
                "Retrying fetch of '{}' (attempt {}/{}) after {:?}",
                url, attempt, self.max_retries, self.retry_delay
            );
            tokio::time::sleep(self.retry_delay).await;
        }
    }
}
