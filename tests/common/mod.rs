//! Shared fixtures: scripted fetcher and model stubs that let the full
//! pipeline run without network, browser, or model access.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use contactfinder::config::AppConfig;
use contactfinder::fetcher::{FetchOutcome, FetchSuccess, PageFetcher};
use contactfinder::llm::{LlmClient, LlmError, TokenUsage, CANDIDATES_PLACEHOLDER};
use contactfinder::schemas::ScraperStatus;

/// One scripted page the stub fetcher can serve.
#[derive(Debug, Clone)]
pub enum StubPage {
    Ok { final_url: String, html: String },
    Fail(ScraperStatus),
}

/// Fetcher that replays a fixed URL → page map. Unknown URLs come back as
/// content-not-found so a typo in a fixture fails loudly in assertions.
pub struct StubFetcher {
    pages: HashMap<String, StubPage>,
}

impl StubFetcher {
    pub fn new(pages: Vec<(&str, StubPage)>) -> Self {
        Self {
            pages: pages
                .into_iter()
                .map(|(url, page)| (url.to_string(), page))
                .collect(),
        }
    }
}

#[async_trait]
impl PageFetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        match self.pages.get(url) {
            Some(StubPage::Ok { final_url, html }) => FetchOutcome::Success(FetchSuccess {
                final_url: final_url.clone(),
                html: html.clone(),
            }),
            Some(StubPage::Fail(status)) => FetchOutcome::Failed(*status),
            None => FetchOutcome::Failed(ScraperStatus::ErrorContentNotFound),
        }
    }
}

/// Model stub that reads the candidate list out of the prompt and echoes
/// each number back with a configured (type, classification). Numbers in
/// `mangled` are returned with a digit appended on every call, which
/// drives the persistent-mismatch path.
pub struct EchoLlm {
    labels: HashMap<String, (String, String)>,
    mangled: Vec<String>,
}

impl EchoLlm {
    pub fn new() -> Self {
        Self {
            labels: HashMap::new(),
            mangled: Vec::new(),
        }
    }

    pub fn with_label(mut self, number: &str, number_type: &str, classification: &str) -> Self {
        self.labels.insert(
            number.to_string(),
            (number_type.to_string(), classification.to_string()),
        );
        self
    }

    pub fn with_mangled(mut self, number: &str) -> Self {
        self.mangled.push(number.to_string());
        self
    }
}

#[async_trait]
impl LlmClient for EchoLlm {
    async fn complete(&self, prompt: &str) -> Result<(String, TokenUsage), LlmError> {
        let start = prompt
            .find('[')
            .ok_or_else(|| LlmError::Parse("no candidate list in prompt".to_string()))?;
        let end = prompt
            .rfind(']')
            .ok_or_else(|| LlmError::Parse("no candidate list in prompt".to_string()))?;
        let candidates: Vec<serde_json::Value> = serde_json::from_str(&prompt[start..=end])
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        let items: Vec<serde_json::Value> = candidates
            .iter()
            .map(|c| {
                let number = c["candidate_number"].as_str().unwrap_or_default().to_string();
                let returned = if self.mangled.contains(&number) {
                    format!("{}9", number)
                } else {
                    number.clone()
                };
                let (number_type, classification) = self
                    .labels
                    .get(&number)
                    .cloned()
                    .unwrap_or_else(|| ("Main Line".to_string(), "Primary".to_string()));
                serde_json::json!({
                    "number": returned,
                    "type": number_type,
                    "classification": classification,
                })
            })
            .collect();

        Ok((
            serde_json::to_string(&items).unwrap(),
            TokenUsage {
                prompt_tokens: 100,
                completion_tokens: 50,
                total_tokens: 150,
            },
        ))
    }
}

/// Arc a stub for the pipeline constructor.
pub fn arc_fetcher(fetcher: StubFetcher) -> Arc<dyn PageFetcher> {
    Arc::new(fetcher)
}

pub fn arc_llm(llm: EchoLlm) -> Arc<dyn LlmClient> {
    Arc::new(llm)
}

/// A config pointed at a temp directory, with a prompt template on disk,
/// deterministic single-worker crawling, and robots/network features off.
pub fn test_config(dir: &Path) -> AppConfig {
    let prompt_path = dir.join("prompt.txt");
    std::fs::write(
        &prompt_path,
        format!("Classify these items:\n{}\n", CANDIDATES_PLACEHOLDER),
    )
    .expect("prompt template fixture");

    let mut config = AppConfig::default();
    config.output.base_dir = dir.join("out").to_string_lossy().to_string();
    config.llm.prompt_template_path = prompt_path.to_string_lossy().to_string();
    config.scraper.max_concurrent_domains = 1;
    config.scraper.respect_robots_txt = false;
    config.scraper.enable_dns_error_fallbacks = true;
    config
}

/// A small contact page body with one German phone number.
pub fn contact_page_html(number: &str) -> String {
    format!(
        "<html><body><h1>Kontakt</h1><p>Telefon: {}</p>\
         <p>Mo-Fr 9-17 Uhr</p></body></html>",
        number
    )
}
