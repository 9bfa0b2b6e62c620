//! Language-model extraction of phone numbers from regex candidates.
//!
//! The model is an external service behind the narrow `LlmClient`
//! capability. This module owns the protocol around it: chunking,
//! prompt rendering, response parsing, length and identity enforcement,
//! the targeted mismatch retry, and error-item substitution. Exactly one
//! output is produced per processed input candidate.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::LlmConfig;
use crate::schemas::{PhoneCandidateItem, PhoneNumberLlmOutput};

/// Placeholder in the prompt template replaced by the candidate JSON list.
pub const CANDIDATES_PLACEHOLDER: &str = "{{candidates_json}}";

const TRANSPORT_MAX_ATTEMPTS: u32 = 3;
const TRANSPORT_BASE_BACKOFF_MS: u64 = 1_000;

static JSON_BLOCK_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(\[.*?\]|\{.*?\})\s*```|(\[.*\]|\{.*\})").unwrap()
});

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("failed to parse model response: {0}")]
    Parse(String),

    #[error("prompt template error: {0}")]
    Prompt(String),
}

/// Token accounting for one or more model calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn accumulate(&mut self, other: TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Narrow completion capability. Production uses `GeminiClient`; tests
/// substitute scripted clients.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<(String, TokenUsage), LlmError>;
}

/// Gemini-style `generateContent` REST client over reqwest. Transient
/// failures (429, 5xx, transport) are retried with exponential backoff
/// inside `complete`; callers never see them.
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
}

impl GeminiClient {
    pub fn new(config: &LlmConfig, api_key: String) -> Self {
        Self::with_base_url(
            config,
            api_key,
            "https://generativelanguage.googleapis.com/v1beta".to_string(),
        )
    }

    /// Base-URL override so tests can stand a mock server in for the API.
    pub fn with_base_url(config: &LlmConfig, api_key: String, base_url: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url,
            model: config.model_name.clone(),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    async fn call_once(&self, prompt: &str) -> Result<(String, TokenUsage), LlmError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_tokens,
                "candidateCount": 1,
            }
        });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        let text = parsed
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .ok_or_else(|| LlmError::Parse("no candidates in response".to_string()))?;

        let usage = parsed
            .usage_metadata
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_token_count,
                completion_tokens: u.candidates_token_count,
                total_tokens: u.total_token_count,
            })
            .unwrap_or_default();

        Ok((text, usage))
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct ResponseCandidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u64,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u64,
    #[serde(rename = "totalTokenCount", default)]
    total_token_count: u64,
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn complete(&self, prompt: &str) -> Result<(String, TokenUsage), LlmError> {
        let mut attempt = 0u32;
        loop {
            match self.call_once(prompt).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    let retriable = match &e {
                        LlmError::Transport(_) => true,
                        LlmError::Api { status, .. } => *status == 429 || *status >= 500,
                        _ => false,
                    };
                    attempt += 1;
                    if !retriable || attempt >= TRANSPORT_MAX_ATTEMPTS {
                        return Err(e);
                    }
                    let backoff = Duration::from_millis(
                        TRANSPORT_BASE_BACKOFF_MS * 2u64.saturating_pow(attempt - 1),
                    );
                    debug!(
                        "Model call failed ({}), retrying in {:?} (attempt {}/{})",
                        e, backoff, attempt, TRANSPORT_MAX_ATTEMPTS
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

/// Raw per-item response schema expected from the model.
#[derive(Debug, Clone, Deserialize)]
struct RawLlmItem {
    #[serde(default)]
    number: String,
    #[serde(rename = "type", default)]
    number_type: String,
    #[serde(default)]
    classification: String,
}

/// Outcome of extracting one base canonical domain's candidates.
#[derive(Debug, Default)]
pub struct LlmExtractionResult {
    /// One item per processed candidate, in candidate order.
    pub outputs: Vec<PhoneNumberLlmOutput>,
    pub usage: TokenUsage,
    pub chunks_processed: usize,
    /// Candidates dropped by the per-domain chunk budget.
    pub candidates_skipped: usize,
    /// Human-readable per-chunk error descriptions.
    pub errors: Vec<String>,
}

/// Drives the chunked extraction protocol over an `LlmClient`.
pub struct PhoneExtractor {
    client: Arc<dyn LlmClient>,
    prompt_template: String,
    chunk_size: usize,
    max_chunks_per_domain: usize,
    max_mismatch_retries: u32,
}

impl PhoneExtractor {
    pub fn new(client: Arc<dyn LlmClient>, config: &LlmConfig) -> Result<Self, LlmError> {
        let prompt_template = std::fs::read_to_string(&config.prompt_template_path)
            .map_err(|e| {
                LlmError::Prompt(format!(
                    "cannot read prompt template '{}': {}",
                    config.prompt_template_path, e
                ))
            })?;
        Self::with_template(client, config, prompt_template)
    }

    pub fn with_template(
        client: Arc<dyn LlmClient>,
        config: &LlmConfig,
        prompt_template: String,
    ) -> Result<Self, LlmError> {
        if !prompt_template.contains(CANDIDATES_PLACEHOLDER) {
            return Err(LlmError::Prompt(format!(
                "prompt template is missing the {} placeholder",
                CANDIDATES_PLACEHOLDER
            )));
        }
        Ok(Self {
            client,
            prompt_template,
            chunk_size: config.candidate_chunk_size.max(1),
            max_chunks_per_domain: config.max_chunks_per_url,
            max_mismatch_retries: config.max_retries_on_number_mismatch,
        })
    }

    /// Process one base canonical domain's candidates. Chunk calls are
    /// sequential within the domain; the per-domain chunk budget caps how
    /// many candidates are processed at all.
    pub async fn extract(
        &self,
        candidates: &[PhoneCandidateItem],
        context_dir: Option<&Path>,
        file_prefix: &str,
    ) -> LlmExtractionResult {
        let mut result = LlmExtractionResult::default();
        if candidates.is_empty() {
            return result;
        }
        if self.max_chunks_per_domain == 0 {
            debug!("Chunk budget is 0; skipping model calls for {}", file_prefix);
            result.candidates_skipped = candidates.len();
            return result;
        }

        let budgeted = candidates
            .chunks(self.chunk_size)
            .take(self.max_chunks_per_domain);
        let processed_count: usize = budgeted.clone().map(|c| c.len()).sum();
        result.candidates_skipped = candidates.len() - processed_count;
        if result.candidates_skipped > 0 {
            info!(
                "Chunk budget drops {} of {} candidates for {}",
                result.candidates_skipped,
                candidates.len(),
                file_prefix
            );
        }

        for (chunk_index, chunk) in budgeted.enumerate() {
            let chunk_prefix = format!("{}_chunk{}", file_prefix, chunk_index);
            let outputs = self
                .process_chunk(chunk, context_dir, &chunk_prefix, &mut result)
                .await;
            result.outputs.extend(outputs);
            result.chunks_processed += 1;
            // Yield between chunks so a cancellation can land.
            tokio::task::yield_now().await;
        }

        result
    }

    /// One chunk through the call → verify → retry-mismatches protocol.
    /// Always returns exactly `chunk.len()` outputs.
    async fn process_chunk(
        &self,
        chunk: &[PhoneCandidateItem],
        context_dir: Option<&Path>,
        file_prefix: &str,
        result: &mut LlmExtractionResult,
    ) -> Vec<PhoneNumberLlmOutput> {
        // Slot per candidate, filled as identities confirm.
        let mut slots: Vec<Option<PhoneNumberLlmOutput>> = vec![None; chunk.len()];
        // Indices into `chunk` still awaiting a matched response.
        let mut pending: Vec<usize> = (0..chunk.len()).collect();
        let mut error_type: &str = "Error_PersistentMismatch";

        let mut round = 0u32;
        while !pending.is_empty() && round <= self.max_mismatch_retries {
            let subset: Vec<&PhoneCandidateItem> = pending.iter().map(|i| &chunk[*i]).collect();
            let prompt = self.render_prompt(&subset);
            let round_prefix = if round == 0 {
                file_prefix.to_string()
            } else {
                format!("{}_retry{}", file_prefix, round)
            };
            if let Some(dir) = context_dir {
                write_context_file(dir, &format!("{}_prompt.txt", round_prefix), &prompt);
            }

            match self.client.complete(&prompt).await {
                Ok((text, usage)) => {
                    result.usage.accumulate(usage);
                    if let Some(dir) = context_dir {
                        write_context_file(dir, &format!("{}_raw_response.txt", round_prefix), &text);
                    }
                    match parse_item_list(&text) {
                        Ok(items) if items.len() == subset.len() => {
                            let mut still_pending = Vec::new();
                            for (slot_pos, item) in pending.iter().zip(items.into_iter()) {
                                let candidate = &chunk[*slot_pos];
                                if item.number.trim() == candidate.number {
                                    slots[*slot_pos] = Some(PhoneNumberLlmOutput {
                                        number: candidate.number.clone(),
                                        number_type: item.number_type,
                                        classification: item.classification,
                                        source_url: candidate.source_url.clone(),
                                        company_name: candidate.company_name.clone(),
                                    });
                                } else {
                                    debug!(
                                        "Identity mismatch: sent '{}', model returned '{}'",
                                        candidate.number, item.number
                                    );
                                    still_pending.push(*slot_pos);
                                }
                            }
                            pending = still_pending;
                            error_type = "Error_PersistentMismatch";
                        }
                        Ok(items) => {
                            warn!(
                                "Model returned {} items for a {}-item chunk; treating all as mismatched",
                                items.len(),
                                subset.len()
                            );
                            result
                                .errors
                                .push(format!("{}: response length mismatch", round_prefix));
                            error_type = "Error_PersistentMismatch";
                        }
                        Err(e) => {
                            warn!("Failed to parse model response: {}", e);
                            result.errors.push(format!("{}: {}", round_prefix, e));
                            error_type = "Error_LLMParse";
                        }
                    }
                }
                Err(e) => {
                    warn!("Model call failed for {}: {}", round_prefix, e);
                    result.errors.push(format!("{}: {}", round_prefix, e));
                    error_type = "Error_LLMTransport";
                }
            }
            round += 1;
        }

        // Whatever is still pending becomes an error-substitute item so the
        // output count always equals the input count.
        for slot_pos in pending {
            let candidate = &chunk[slot_pos];
            slots[slot_pos] = Some(PhoneNumberLlmOutput {
                number: candidate.number.clone(),
                number_type: error_type.to_string(),
                classification: "Non-Business".to_string(),
                source_url: candidate.source_url.clone(),
                company_name: candidate.company_name.clone(),
            });
        }

        slots.into_iter().flatten().collect()
    }

    fn render_prompt(&self, candidates: &[&PhoneCandidateItem]) -> String {
        let payload: Vec<serde_json::Value> = candidates
            .iter()
            .map(|c| {
                json!({
                    "candidate_number": c.number,
                    "source_url": c.source_url,
                    "snippet": c.snippet,
                })
            })
            .collect();
        let payload_str =
            serde_json::to_string_pretty(&payload).unwrap_or_else(|_| "[]".to_string());
        self.prompt_template
            .replace(CANDIDATES_PLACEHOLDER, &payload_str)
    }
}

/// Parse the model's textual reply into raw items, tolerating surrounding
/// prose and markdown code fences.
fn parse_item_list(text: &str) -> Result<Vec<RawLlmItem>, LlmError> {
    let trimmed = text.trim();
    if let Ok(items) = serde_json::from_str::<Vec<RawLlmItem>>(trimmed) {
        return Ok(items);
    }
    if let Some(captures) = JSON_BLOCK_REGEX.captures(trimmed) {
        let block = captures
            .get(1)
            .or_else(|| captures.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        if let Ok(items) = serde_json::from_str::<Vec<RawLlmItem>>(block) {
            return Ok(items);
        }
        // An object wrapper around the list is tolerated as well
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(block) {
            if let Some(list) = value.get("extracted_numbers").or_else(|| value.get("items")) {
                if let Ok(items) = serde_json::from_value::<Vec<RawLlmItem>>(list.clone()) {
                    return Ok(items);
                }
            }
        }
    }
    Err(LlmError::Parse(format!(
        "no JSON item list found in response ({} chars)",
        text.len()
    )))
}

fn write_context_file(dir: &Path, name: &str, content: &str) {
    let path = dir.join(name);
    if let Err(e) = std::fs::write(&path, content) {
        warn!("Could not write LLM context file {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn candidate(number: &str) -> PhoneCandidateItem {
        PhoneCandidateItem {
            number: number.to_string(),
            snippet: format!("call us at {}", number),
            source_url: "http://example.com/kontakt".to_string(),
            company_name: "ExampleCorp".to_string(),
            country_hints: vec![],
        }
    }

    fn config_with(chunk_size: usize, max_chunks: usize, retries: u32) -> LlmConfig {
        LlmConfig {
            candidate_chunk_size: chunk_size,
            max_chunks_per_url: max_chunks,
            max_retries_on_number_mismatch: retries,
            ..LlmConfig::default()
        }
    }

    fn template() -> String {
        format!("Classify these:\n{}\n", CANDIDATES_PLACEHOLDER)
    }

    /// Scripted client: pops canned responses in order.
    struct ScriptedClient {
        responses: Mutex<Vec<Result<(String, TokenUsage), LlmError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<Result<(String, TokenUsage), LlmError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn complete(&self, prompt: &str) -> Result<(String, TokenUsage), LlmError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(LlmError::Transport("script exhausted".to_string()));
            }
            responses.remove(0)
        }
    }

    fn ok_response(items: &[(&str, &str, &str)], tokens: u64) -> Result<(String, TokenUsage), LlmError> {
        let list: Vec<serde_json::Value> = items
            .iter()
            .map(|(n, t, c)| json!({"number": n, "type": t, "classification": c}))
            .collect();
        Ok((
            serde_json::to_string(&list).unwrap(),
            TokenUsage {
                prompt_tokens: tokens,
                completion_tokens: tokens / 2,
                total_tokens: tokens + tokens / 2,
            },
        ))
    }

    #[tokio::test]
    async fn test_happy_path_enriches_outputs() {
        let client = Arc::new(ScriptedClient::new(vec![ok_response(
            &[("+49 30 12345678", "Main Line", "Primary")],
            100,
        )]));
        let extractor =
            PhoneExtractor::with_template(client, &config_with(10, 10, 1), template()).unwrap();
        let result = extractor.extract(&[candidate("+49 30 12345678")], None, "t").await;

        assert_eq!(result.outputs.len(), 1);
        let out = &result.outputs[0];
        assert_eq!(out.number, "+49 30 12345678");
        assert_eq!(out.number_type, "Main Line");
        assert_eq!(out.classification, "Primary");
        assert_eq!(out.source_url, "http://example.com/kontakt");
        assert_eq!(out.company_name, "ExampleCorp");
        assert_eq!(result.usage.prompt_tokens, 100);
        assert_eq!(result.chunks_processed, 1);
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn test_mismatch_retry_resolves() {
        // First call mangles the number; the retry returns it verbatim.
        let client = Arc::new(ScriptedClient::new(vec![
            ok_response(&[("+491234", "Main Line", "Primary")], 50),
            ok_response(&[("+49123", "Main Line", "Primary")], 30),
        ]));
        let extractor = PhoneExtractor::with_template(
            client.clone(),
            &config_with(10, 10, 1),
            template(),
        )
        .unwrap();
        let result = extractor.extract(&[candidate("+49123")], None, "t").await;

        assert_eq!(result.outputs.len(), 1);
        assert_eq!(result.outputs[0].number, "+49123");
        assert_eq!(result.outputs[0].classification, "Primary");
        // Token usage sums both calls
        assert_eq!(result.usage.prompt_tokens, 80);
        assert_eq!(client.prompts.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_persistent_mismatch_substitutes_error_item() {
        let client = Arc::new(ScriptedClient::new(vec![
            ok_response(&[("+491234", "Main Line", "Primary")], 10),
            ok_response(&[("+491234", "Main Line", "Primary")], 10),
        ]));
        let extractor =
            PhoneExtractor::with_template(client, &config_with(10, 10, 1), template()).unwrap();
        let result = extractor.extract(&[candidate("+49123")], None, "t").await;

        assert_eq!(result.outputs.len(), 1);
        let out = &result.outputs[0];
        assert_eq!(out.number, "+49123");
        assert_eq!(out.number_type, "Error_PersistentMismatch");
        assert_eq!(out.classification, "Non-Business");
        assert_eq!(result.usage.prompt_tokens, 20);
    }

    #[tokio::test]
    async fn test_targeted_retry_only_resends_mismatches() {
        let client = Arc::new(ScriptedClient::new(vec![
            ok_response(
                &[
                    ("+49 1", "Main Line", "Primary"),
                    ("WRONG", "Sales", "Secondary"),
                ],
                10,
            ),
            ok_response(&[("+49 2", "Sales", "Secondary")], 10),
        ]));
        let extractor = PhoneExtractor::with_template(
            client.clone(),
            &config_with(10, 10, 1),
            template(),
        )
        .unwrap();
        let result = extractor
            .extract(&[candidate("+49 1"), candidate("+49 2")], None, "t")
            .await;

        assert_eq!(result.outputs.len(), 2);
        assert_eq!(result.outputs[0].number, "+49 1");
        assert_eq!(result.outputs[1].number, "+49 2");
        assert_eq!(result.outputs[1].classification, "Secondary");

        let prompts = client.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        // The retry prompt carries only the mismatched candidate
        assert!(!prompts[1].contains("+49 1"));
        assert!(prompts[1].contains("+49 2"));
    }

    #[tokio::test]
    async fn test_length_mismatch_marks_whole_chunk() {
        let client = Arc::new(ScriptedClient::new(vec![
            ok_response(&[("+49 1", "Main Line", "Primary")], 10), // 1 item for 2 candidates
            ok_response(
                &[
                    ("+49 1", "Main Line", "Primary"),
                    ("+49 2", "Sales", "Secondary"),
                ],
                10,
            ),
        ]));
        let extractor =
            PhoneExtractor::with_template(client, &config_with(10, 10, 1), template()).unwrap();
        let result = extractor
            .extract(&[candidate("+49 1"), candidate("+49 2")], None, "t")
            .await;

        assert_eq!(result.outputs.len(), 2);
        assert!(result.outputs.iter().all(|o| !o.number_type.starts_with("Error_")));
        assert_eq!(result.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_substitutes_error_items() {
        let client = Arc::new(ScriptedClient::new(vec![
            Err(LlmError::Transport("boom".to_string())),
            Err(LlmError::Transport("boom".to_string())),
        ]));
        let extractor =
            PhoneExtractor::with_template(client, &config_with(10, 10, 1), template()).unwrap();
        let result = extractor.extract(&[candidate("+49 1")], None, "t").await;

        assert_eq!(result.outputs.len(), 1);
        assert_eq!(result.outputs[0].number_type, "Error_LLMTransport");
        assert_eq!(result.outputs[0].classification, "Non-Business");
        assert_eq!(result.errors.len(), 2);
    }

    #[tokio::test]
    async fn test_zero_chunk_budget_skips_model() {
        let client = Arc::new(ScriptedClient::new(vec![]));
        let extractor = PhoneExtractor::with_template(
            client.clone(),
            &config_with(10, 0, 1),
            template(),
        )
        .unwrap();
        let result = extractor.extract(&[candidate("+49 1")], None, "t").await;

        assert!(result.outputs.is_empty());
        assert_eq!(result.chunks_processed, 0);
        assert_eq!(result.candidates_skipped, 1);
        assert!(client.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_chunk_budget_caps_candidates() {
        // Chunk size 1, budget 2 → two of three candidates processed
        let client = Arc::new(ScriptedClient::new(vec![
            ok_response(&[("+49 1", "Main Line", "Primary")], 10),
            ok_response(&[("+49 2", "Sales", "Secondary")], 10),
        ]));
        let extractor =
            PhoneExtractor::with_template(client, &config_with(1, 2, 0), template()).unwrap();
        let result = extractor
            .extract(
                &[candidate("+49 1"), candidate("+49 2"), candidate("+49 3")],
                None,
                "t",
            )
            .await;

        assert_eq!(result.outputs.len(), 2);
        assert_eq!(result.chunks_processed, 2);
        assert_eq!(result.candidates_skipped, 1);
    }

    #[test]
    fn test_parse_tolerates_code_fences() {
        let text = "Here you go:\n```json\n[{\"number\": \"+49\", \"type\": \"Main Line\", \"classification\": \"Primary\"}]\n```\nDone.";
        let items = parse_item_list(text).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].number, "+49");
    }

    #[test]
    fn test_parse_tolerates_object_wrapper() {
        let text = r#"{"extracted_numbers": [{"number": "+49", "type": "Fax", "classification": "Support"}]}"#;
        let items = parse_item_list(text).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].number_type, "Fax");
    }

    #[test]
    fn test_parse_rejects_prose() {
        assert!(parse_item_list("I could not find any numbers.").is_err());
    }

    #[test]
    fn test_template_without_placeholder_rejected() {
        let client = Arc::new(ScriptedClient::new(vec![]));
        let err = PhoneExtractor::with_template(
            client,
            &config_with(10, 10, 1),
            "no placeholder here".to_string(),
        );
        assert!(err.is_err());
    }
}
