//! Two-pass pipeline orchestration.
//!
//! Pass 1 gathers raw data once per canonical site: URL preparation and
//! deduplication, concurrent crawling of unique seeds, regex extraction,
//! then per-domain model extraction and consolidation. Pass 2 walks the
//! input rows again, joins them with the per-domain results, derives
//! outcomes, and writes the report set.
//!
//! All run-scoped state (caches, journeys, metrics) is owned here and
//! handed to components as explicit parameters.

use anyhow::{Context, Result};
use futures::{stream, StreamExt};
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::consolidator::{consolidate, eligible_numbers, type_priority};
use crate::crawler::{CrawlOutcome, SiteCrawler};
use crate::dns::DnsProber;
use crate::fetcher::PageFetcher;
use crate::input::load_input_rows;
use crate::journey::DomainJourney;
use crate::llm::{LlmClient, PhoneExtractor};
use crate::logger::PipelineLogger;
use crate::outcomes::{
    derive_domain_outcome, derive_row_outcome, fault_category, RowSignals, RowValidationFailure,
    CONTACT_EXTRACTED,
};
use crate::regex_extractor::extract_candidates_from_text;
use crate::reports::{
    write_attrition_report, write_domain_summary_report, write_final_contacts_report,
    write_llm_extractions_report, write_processed_contacts_report, write_run_metrics,
    write_summary_report, AttritionRow, FailureLog, FinalContactsRow, LlmExtractionReportRow,
    ProcessedContactRow, RunMetrics, SummaryReportRow, TopContactCell,
};
use crate::schemas::{
    CompanyContactDetails, GivenPhone, InputRow, PhoneCandidateItem, ScraperStatus,
};
use crate::url_normalizer::{
    canonical_base_url, input_canonical_host, prepare_input_url, PreparedUrl,
    UrlNormalizationError,
};

/// Run identifier: local wall-clock, `YYYYMMDD_HHMMSS`.
pub fn generate_run_id() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Filesystem layout of one run.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub run_dir: PathBuf,
    pub cleaned_text_dir: PathBuf,
    pub llm_context_dir: PathBuf,
}

impl RunPaths {
    pub fn create(base_dir: &Path, run_id: &str) -> Result<Self> {
        let run_dir = base_dir.join(run_id);
        let cleaned_text_dir = run_dir.join("scraped_content").join("cleaned_pages_text");
        let llm_context_dir = run_dir.join("llm_context");
        std::fs::create_dir_all(&cleaned_text_dir)
            .with_context(|| format!("cannot create {}", cleaned_text_dir.display()))?;
        std::fs::create_dir_all(&llm_context_dir)
            .with_context(|| format!("cannot create {}", llm_context_dir.display()))?;
        Ok(Self {
            run_dir,
            cleaned_text_dir,
            llm_context_dir,
        })
    }
}

/// What one finished run reports back to the caller.
#[derive(Debug)]
pub struct RunSummary {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub input_rows: usize,
    pub rows_with_contacts: usize,
    pub attrition_rows: usize,
    pub domains_processed: usize,
}

/// Per-row state carried from pass 1 into pass 2.
#[derive(Debug)]
struct RowState {
    row: InputRow,
    validation_failure: Option<RowValidationFailure>,
    prepared: Option<PreparedUrl>,
    initial_status: Option<ScraperStatus>,
    base_canonical: Option<String>,
}

pub struct Pipeline {
    config: Arc<AppConfig>,
    fetcher: Arc<dyn PageFetcher>,
    llm_client: Option<Arc<dyn LlmClient>>,
    prober: Arc<DnsProber>,
    logger: PipelineLogger,
}

impl Pipeline {
    pub fn new(
        config: Arc<AppConfig>,
        fetcher: Arc<dyn PageFetcher>,
        llm_client: Option<Arc<dyn LlmClient>>,
        prober: Arc<DnsProber>,
        logger: PipelineLogger,
    ) -> Self {
        Self {
            config,
            fetcher,
            llm_client,
            prober,
            logger,
        }
    }

    pub async fn run(&self, run_id: &str, input_path: &Path) -> Result<RunSummary> {
        let pipeline_start = Instant::now();
        let mut metrics = RunMetrics {
            run_id: run_id.to_string(),
            ..Default::default()
        };

        let paths = RunPaths::create(Path::new(&self.config.output.base_dir), run_id)?;
        let failure_log = FailureLog::create(&paths.run_dir.join(format!("failed_rows_{}.csv", run_id)))?;

        // The extractor is built once per run; a missing or malformed
        // prompt template is a configuration error, not a per-row one.
        let extractor = match &self.llm_client {
            Some(client) => Some(PhoneExtractor::new(client.clone(), &self.config.llm)?),
            None => {
                self.logger
                    .warn("No LLM client configured; extraction will stop after the regex stage");
                None
            }
        };

        // --- Load input -------------------------------------------------
        let load_start = Instant::now();
        let rows = load_input_rows(input_path, &self.config)?;
        metrics.add_task_duration("load_input", load_start.elapsed());
        metrics.input_rows_count = rows.len();
        self.logger
            .info(&format!("Loaded {} input row(s) from {}", rows.len(), input_path.display()));

        // --- Duplicate pre-computation ----------------------------------
        let mut company_counts: HashMap<String, usize> = HashMap::new();
        let mut host_counts: HashMap<String, usize> = HashMap::new();
        for row in &rows {
            *company_counts.entry(row.company_name.clone()).or_insert(0) += 1;
            if let Some(host) = row.given_url.as_deref().and_then(input_canonical_host) {
                *host_counts.entry(host).or_insert(0) += 1;
            }
        }
        metrics.unique_company_names = company_counts.len();
        metrics.unique_input_canonical_hosts = host_counts.len();
        metrics.company_names_with_duplicates =
            company_counts.values().filter(|c| **c > 1).count();
        metrics.input_hosts_with_duplicates = host_counts.values().filter(|c| **c > 1).count();
        metrics.rows_considered_duplicates = rows
            .iter()
            .filter(|row| {
                let dup_company = company_counts.get(&row.company_name).copied().unwrap_or(0) > 1;
                let dup_host = row
                    .given_url
                    .as_deref()
                    .and_then(input_canonical_host)
                    .map(|h| host_counts.get(&h).copied().unwrap_or(0) > 1)
                    .unwrap_or(false);
                dup_company || dup_host
            })
            .count();

        // --- Pass 1a: URL preparation and pathful dedup ------------------
        self.logger.start_progress(rows.len() as u64).await;
        self.logger.update_progress("Preparing input URLs...").await;
        let prepare_start = Instant::now();

        let mut states: Vec<RowState> = Vec::with_capacity(rows.len());
        // First row to reach a pathful owns its processing.
        let mut pathful_owner: HashMap<String, usize> = HashMap::new();
        let mut seeds: Vec<(String, String, Vec<String>)> = Vec::new(); // (pathful, company, hints)

        for row in rows {
            let state = self.prepare_row(row, &mut pathful_owner, &mut seeds, &failure_log, &mut metrics).await;
            states.push(state);
        }
        metrics.add_task_duration("pass1_url_preparation", prepare_start.elapsed());

        // --- Pass 1b: concurrent crawls of unique seeds -------------------
        self.logger
            .update_progress(&format!("Crawling {} unique site(s)...", seeds.len()))
            .await;
        let crawl_start = Instant::now();
        let crawler = SiteCrawler::new(self.config.clone(), self.fetcher.clone());
        let globally_processed: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));

        let crawl_outcomes: HashMap<String, CrawlOutcome> = {
            let crawler = &crawler;
            let cleaned_dir = paths.cleaned_text_dir.clone();
            let logger = &self.logger;
            stream::iter(seeds.iter().cloned())
                .map(|(pathful, company, _hints)| {
                    let globally_processed = globally_processed.clone();
                    let cleaned_dir = cleaned_dir.clone();
                    async move {
                        let outcome = crawler
                            .crawl_with_fallbacks(&pathful, &company, &cleaned_dir, globally_processed)
                            .await;
                        logger.advance_progress(1).await;
                        (pathful, outcome)
                    }
                })
                .buffer_unordered(self.config.scraper.max_concurrent_domains)
                .collect()
                .await
        };
        metrics.add_task_duration("pass1_crawling", crawl_start.elapsed());

        // --- Pass 1c: per-row bookkeeping and regex extraction ------------
        self.logger.update_progress("Extracting candidates...").await;
        let regex_start = Instant::now();

        let mut journeys: BTreeMap<String, DomainJourney> = BTreeMap::new();
        let mut candidates_by_base: HashMap<String, Vec<PhoneCandidateItem>> = HashMap::new();
        let mut regex_done_for_pathful: HashSet<String> = HashSet::new();

        for state in states.iter_mut() {
            if state.validation_failure.is_some() {
                continue;
            }
            let Some(prepared) = state.prepared.clone() else {
                continue;
            };
            let Some(&owner_row) = pathful_owner.get(&prepared.pathful) else {
                continue;
            };
            let Some(outcome) = crawl_outcomes.get(&prepared.pathful) else {
                continue;
            };

            let base = outcome
                .result
                .canonical_entry_url
                .as_deref()
                .and_then(canonical_base_url)
                .unwrap_or_else(|| prepared.base.clone());
            state.base_canonical = Some(base.clone());

            let journey = journeys
                .entry(base.clone())
                .or_insert_with(|| DomainJourney::new(&base));
            journey.record_input_row(
                state.row.row_id,
                &state.row.company_name,
                state.row.given_url.as_deref(),
            );

            let is_owner = owner_row == state.row.row_id;
            if !is_owner {
                state.initial_status = Some(ScraperStatus::AlreadyProcessed);
                metrics.scraping_already_processed += 1;
                debug!(
                    "Row {} shares pathful '{}' with row {}; recorded as AlreadyProcessed",
                    state.row.row_id, prepared.pathful, owner_row
                );
                continue;
            }

            state.initial_status = Some(outcome.result.status);
            metrics.urls_processed_for_scraping += 1;
            for attempt in &outcome.attempts {
                journey.record_pathful_attempt(&attempt.pathful_url, attempt.status);
            }

            match outcome.result.status {
                ScraperStatus::Success => {
                    metrics.scraping_success += 1;
                    metrics.new_canonical_sites_scraped += 1;
                }
                ScraperStatus::AlreadyProcessed => {
                    metrics.scraping_already_processed += 1;
                }
                status => {
                    metrics.scraping_errors += 1;
                    failure_log.log(
                        state.row.row_id,
                        &state.row.company_name,
                        state.row.given_url.as_deref(),
                        &format!("Scraping_{}", status),
                        &format!("Scraper returned status: {}", status),
                        json!({
                            "pathful_canonical_url": prepared.pathful,
                            "true_base_domain": base,
                        }),
                        Some(&prepared.pathful),
                    );
                    metrics.count_row_failure(&format!("Scraping_{}", status));
                    metrics.rows_failed_pass1 += 1;
                }
            }

            for page in &outcome.result.pages {
                journey.record_scraped_page(page.page_type);
                metrics.total_pages_scraped += 1;
                *metrics
                    .pages_by_type
                    .entry(page.page_type.as_str().to_string())
                    .or_insert(0) += 1;
            }

            // Regex extraction once per owner pathful
            if outcome.result.status == ScraperStatus::Success
                && regex_done_for_pathful.insert(prepared.pathful.clone())
            {
                metrics.sites_processed_for_regex += 1;
                let mut found_any = false;
                for page in &outcome.result.pages {
                    match std::fs::read_to_string(&page.text_path) {
                        Ok(text) => {
                            let candidates = extract_candidates_from_text(
                                &text,
                                &page.landed_url,
                                &state.row.company_name,
                                &state.row.target_country_codes,
                                self.config.scraper.snippet_chars,
                                self.config.llm.max_identical_numbers_per_page,
                            );
                            if !candidates.is_empty() {
                                found_any = true;
                                metrics.total_regex_candidates += candidates.len();
                                candidates_by_base
                                    .entry(base.clone())
                                    .or_default()
                                    .extend(candidates);
                            }
                        }
                        Err(e) => {
                            warn!(
                                "Cannot read cleaned text {}: {}",
                                page.text_path.display(),
                                e
                            );
                            failure_log.log(
                                state.row.row_id,
                                &state.row.company_name,
                                state.row.given_url.as_deref(),
                                "Regex_Extraction_FileReadError",
                                "Error reading scraped content file",
                                json!({
                                    "file_path": page.text_path.display().to_string(),
                                    "canonical_url": prepared.pathful,
                                    "error": e.to_string(),
                                }),
                                Some(&prepared.pathful),
                            );
                            metrics.count_row_failure("Regex_Extraction_FileReadError");
                        }
                    }
                }
                if found_any {
                    metrics.sites_with_regex_candidates += 1;
                }
                journey.record_regex_outcome(found_any);
            }
        }
        metrics.add_task_duration("pass1_regex_extraction", regex_start.elapsed());
        self.logger.finish_progress("Pass 1 complete").await;

        // --- Between passes: model extraction per base domain -------------
        let llm_start = Instant::now();
        let mut raw_llm_by_base: HashMap<String, Vec<crate::schemas::PhoneNumberLlmOutput>> =
            HashMap::new();

        if let Some(extractor) = &extractor {
            let bases: Vec<(String, Vec<PhoneCandidateItem>)> =
                candidates_by_base.drain().collect();
            metrics.sites_processed_for_llm = bases.len();
            self.logger.info(&format!(
                "Running model extraction for {} domain(s)",
                bases.len()
            ));

            // Domains run concurrently; chunks within one domain stay
            // sequential inside the extractor.
            let extraction_results: Vec<(String, crate::llm::LlmExtractionResult)> = {
                let context_dir = paths.llm_context_dir.clone();
                stream::iter(bases.into_iter())
                    .map(|(base, candidates)| {
                        let context_dir = context_dir.clone();
                        async move {
                            let prefix = format!("CANONICAL_{}", safe_base_name(&base));
                            let result = extractor
                                .extract(&candidates, Some(&context_dir), &prefix)
                                .await;
                            (base, result)
                        }
                    })
                    .buffer_unordered(self.config.scraper.max_concurrent_domains)
                    .collect()
                    .await
            };

            for (base, result) in extraction_results {
                if let Some(journey) = journeys.get_mut(&base) {
                    if result.chunks_processed > 0 {
                        journey.record_llm_call();
                    }
                    journey.add_raw_llm_numbers(result.outputs.len());
                    for error in &result.errors {
                        journey.record_llm_error(error.clone());
                        metrics.llm_chunk_errors += 1;
                        metrics
                            .errors_encountered
                            .push(format!("{}: {}", base, error));
                    }
                }
                metrics.llm_chunks_processed += result.chunks_processed;
                metrics.total_llm_raw_numbers += result.outputs.len();
                metrics.llm_prompt_tokens += result.usage.prompt_tokens;
                metrics.llm_completion_tokens += result.usage.completion_tokens;
                metrics.llm_total_tokens += result.usage.total_tokens;
                raw_llm_by_base.insert(base, result.outputs);
            }
        }
        metrics.add_task_duration("llm_extraction", llm_start.elapsed());

        // --- Consolidation per base domain --------------------------------
        let consolidation_start = Instant::now();
        let row_hints_by_id: HashMap<usize, Vec<String>> = states
            .iter()
            .map(|s| (s.row.row_id, s.row.target_country_codes.clone()))
            .collect();

        let mut consolidated_by_base: HashMap<String, CompanyContactDetails> = HashMap::new();
        for (base, journey) in journeys.iter_mut() {
            let raw_items = raw_llm_by_base.get(base).cloned().unwrap_or_default();
            let hints = journey
                .input_row_ids
                .iter()
                .next()
                .and_then(|id| row_hints_by_id.get(id).cloned())
                .unwrap_or_else(|| self.config.phone.target_country_codes.clone());
            let details = consolidate(
                &raw_items,
                base,
                &hints,
                &self.config.phone.default_region_code,
            );
            journey.record_consolidation(&details);
            let eligible_count = eligible_numbers(&details).len();
            journey.final_outcome_reason = derive_domain_outcome(journey, eligible_count);
            journey.primary_fault_category = fault_category(&journey.final_outcome_reason).to_string();
            consolidated_by_base.insert(base.clone(), details);
        }
        metrics.add_task_duration("consolidation", consolidation_start.elapsed());
        info!("Consolidation complete for {} base domain(s)", consolidated_by_base.len());

        // --- Pass 2: row-oriented report composition ----------------------
        let pass2_start = Instant::now();
        let summary = self
            .compose_and_write_reports(
                run_id,
                &paths,
                &states,
                &journeys,
                &consolidated_by_base,
                &raw_llm_by_base,
                &company_counts,
                &host_counts,
                &mut metrics,
            )
            .await?;
        metrics.add_task_duration("pass2_reports", pass2_start.elapsed());

        // --- Run metrics ---------------------------------------------------
        let mut attrition_fault_counts: BTreeMap<String, usize> = BTreeMap::new();
        for state in &states {
            // Recompute outcome cheaply for the metrics rollup
            let signals = self.row_signals(state, &journeys, &consolidated_by_base);
            let reason = derive_row_outcome(&signals);
            if reason != CONTACT_EXTRACTED {
                *attrition_fault_counts
                    .entry(fault_category(&reason).to_string())
                    .or_insert(0) += 1;
            }
        }
        let mut domain_outcome_counts: BTreeMap<String, usize> = BTreeMap::new();
        for journey in journeys.values() {
            *domain_outcome_counts
                .entry(journey.final_outcome_reason.clone())
                .or_insert(0) += 1;
        }
        write_run_metrics(
            &paths.run_dir.join(format!("run_metrics_{}.md", run_id)),
            &metrics,
            pipeline_start.elapsed(),
            &attrition_fault_counts,
            &domain_outcome_counts,
        )?;

        self.logger.success(&format!(
            "Run {} finished: {} row(s), {} with contacts, {} in attrition",
            run_id, summary.input_rows, summary.rows_with_contacts, summary.attrition_rows
        ));
        Ok(summary)
    }

    /// Validate and canonicalize one row's URL, claiming its pathful for
    /// the first row that reaches it.
    async fn prepare_row(
        &self,
        row: InputRow,
        pathful_owner: &mut HashMap<String, usize>,
        seeds: &mut Vec<(String, String, Vec<String>)>,
        failure_log: &FailureLog,
        metrics: &mut RunMetrics,
    ) -> RowState {
        let Some(given_url) = row.given_url.clone() else {
            metrics.scraping_invalid_url += 1;
            metrics.count_row_failure("URL_Validation_InvalidOrMissing");
            metrics.rows_failed_pass1 += 1;
            failure_log.log(
                row.row_id,
                &row.company_name,
                None,
                "URL_Validation_InvalidOrMissing",
                "No URL provided",
                json!({}),
                None,
            );
            return RowState {
                row,
                validation_failure: Some(RowValidationFailure::InvalidUrl),
                prepared: None,
                initial_status: None,
                base_canonical: None,
            };
        };

        match prepare_input_url(&given_url, &self.prober, &self.config.scraper.url_probing_tlds)
            .await
        {
            Ok(prepared) => {
                if prepared.tld_probe_exhausted {
                    self.logger.warn(&format!(
                        "Row {}: TLD probing failed for '{}'; continuing with '{}'",
                        row.row_id, given_url, prepared.pathful
                    ));
                }
                if !pathful_owner.contains_key(&prepared.pathful) {
                    pathful_owner.insert(prepared.pathful.clone(), row.row_id);
                    seeds.push((
                        prepared.pathful.clone(),
                        row.company_name.clone(),
                        row.target_country_codes.clone(),
                    ));
                }
                RowState {
                    row,
                    validation_failure: None,
                    prepared: Some(prepared),
                    initial_status: None,
                    base_canonical: None,
                }
            }
            Err(error) => {
                let (failure, stage) = match &error {
                    UrlNormalizationError::UnsupportedScheme(_) => (
                        RowValidationFailure::UnsupportedScheme,
                        "URL_Validation_UnsupportedScheme",
                    ),
                    _ => (
                        RowValidationFailure::InvalidUrl,
                        "URL_Validation_InvalidOrMissing",
                    ),
                };
                metrics.scraping_invalid_url += 1;
                metrics.count_row_failure(stage);
                metrics.rows_failed_pass1 += 1;
                failure_log.log(
                    row.row_id,
                    &row.company_name,
                    Some(&given_url),
                    stage,
                    &error.to_string(),
                    json!({ "original_url": given_url }),
                    None,
                );
                self.logger.warn(&format!(
                    "Row {}: skipping invalid URL '{}' ({})",
                    row.row_id, given_url, error
                ));
                RowState {
                    row,
                    validation_failure: Some(failure),
                    prepared: None,
                    initial_status: None,
                    base_canonical: None,
                }
            }
        }
    }

    fn row_signals<'a>(
        &self,
        state: &'a RowState,
        journeys: &'a BTreeMap<String, DomainJourney>,
        consolidated_by_base: &HashMap<String, CompanyContactDetails>,
    ) -> RowSignals<'a> {
        let journey = state
            .base_canonical
            .as_deref()
            .and_then(|base| journeys.get(base));
        let eligible_count = state
            .base_canonical
            .as_deref()
            .and_then(|base| consolidated_by_base.get(base))
            .map(|details| eligible_numbers(details).len())
            .unwrap_or(0);
        RowSignals {
            validation_failure: state.validation_failure,
            base_canonical: state.base_canonical.as_deref(),
            initial_status: state.initial_status,
            journey,
            eligible_consolidated_count: eligible_count,
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn compose_and_write_reports(
        &self,
        run_id: &str,
        paths: &RunPaths,
        states: &[RowState],
        journeys: &BTreeMap<String, DomainJourney>,
        consolidated_by_base: &HashMap<String, CompanyContactDetails>,
        raw_llm_by_base: &HashMap<String, Vec<crate::schemas::PhoneNumberLlmOutput>>,
        company_counts: &HashMap<String, usize>,
        host_counts: &HashMap<String, usize>,
        metrics: &mut RunMetrics,
    ) -> Result<RunSummary> {
        let mut summary_rows: Vec<SummaryReportRow> = Vec::new();
        let mut llm_rows: Vec<LlmExtractionReportRow> = Vec::new();
        let mut attrition_rows: Vec<AttritionRow> = Vec::new();
        let mut rows_with_contacts = 0usize;

        for state in states {
            let signals = self.row_signals(state, journeys, consolidated_by_base);
            let reason = derive_row_outcome(&signals);
            let fault = fault_category(&reason).to_string();

            let base = state.base_canonical.clone().unwrap_or_default();
            let journey = journeys.get(&base);
            let overall_status = journey
                .and_then(|j| j.overall_scraper_status())
                .map(|s| s.as_str().to_string())
                .unwrap_or_else(|| {
                    state
                        .initial_status
                        .map(|s| s.as_str().to_string())
                        .unwrap_or_else(|| "Not_Run".to_string())
                });

            let details = consolidated_by_base.get(&base);
            let eligible: Vec<_> = details.map(|d| eligible_numbers(d)).unwrap_or_default();

            // Top three contact cells for the summary report
            let top: Vec<TopContactCell> = eligible
                .iter()
                .take(3)
                .map(|number| {
                    let mut types: Vec<&str> =
                        number.sources.iter().map(|s| s.number_type.as_str()).collect();
                    types.sort_unstable();
                    types.dedup();
                    let mut urls: Vec<&str> =
                        number.sources.iter().map(|s| s.source_url.as_str()).collect();
                    urls.sort_unstable();
                    urls.dedup();
                    TopContactCell {
                        number: number.number.clone(),
                        types: types.join(", "),
                        source_urls: urls.join(", "),
                    }
                })
                .collect();

            let original_number_status =
                original_number_status(&state.row.normalized_given_phone, &top, &eligible, &reason, &overall_status);
            let overall_verification =
                overall_verification_status(&reason, &overall_status, &state.row, &base);

            if reason == CONTACT_EXTRACTED {
                rows_with_contacts += 1;
            } else {
                let derived_host = state
                    .row
                    .given_url
                    .as_deref()
                    .and_then(input_canonical_host);
                let company_total = company_counts
                    .get(&state.row.company_name)
                    .copied()
                    .unwrap_or(0);
                let host_total = derived_host
                    .as_deref()
                    .and_then(|h| host_counts.get(h))
                    .copied()
                    .unwrap_or(0);
                let dup_company = company_total > 1;
                let dup_host = host_total > 1;
                let llm_error_summary = if fault == "LLM Issue" {
                    journey
                        .map(|j| j.llm_error_messages.join("; "))
                        .unwrap_or_default()
                } else {
                    String::new()
                };
                attrition_rows.push(AttritionRow {
                    input_row_id: state.row.row_id,
                    company_name: state.row.company_name.clone(),
                    given_url: state.row.given_url.clone().unwrap_or_default(),
                    derived_input_canonical_url: derived_host.unwrap_or_default(),
                    final_processed_canonical_domain: base.clone(),
                    link_to_canonical_domain_outcome: if journeys.contains_key(&base) {
                        base.clone()
                    } else {
                        String::new()
                    },
                    final_row_outcome_reason: reason.clone(),
                    determined_fault_category: fault.clone(),
                    relevant_canonical_urls: if base.is_empty() {
                        "N/A".to_string()
                    } else {
                        base.clone()
                    },
                    llm_error_detail_summary: llm_error_summary,
                    input_company_name_total_count: company_total,
                    input_canonical_url_total_count: host_total,
                    is_input_company_name_duplicate: dup_company,
                    is_input_canonical_url_duplicate: dup_host,
                    is_input_row_considered_duplicate: dup_company || dup_host,
                    timestamp_of_determination: chrono::Utc::now().to_rfc3339(),
                });
            }

            // One extractions-report row per raw model item for the row's base
            if let Some(raw_items) = raw_llm_by_base.get(&base) {
                for item in raw_items {
                    llm_rows.push(LlmExtractionReportRow {
                        company_name: state.row.company_name.clone(),
                        number: item.number.clone(),
                        llm_type: item.number_type.clone(),
                        llm_classification: item.classification.clone(),
                        llm_source_url: item.source_url.clone(),
                        scraping_status: overall_status.clone(),
                        target_country_codes: state.row.target_country_codes.join(","),
                        run_id: run_id.to_string(),
                    });
                }
            }

            summary_rows.push(SummaryReportRow {
                input_row_id: state.row.row_id,
                company_name: state.row.company_name.clone(),
                given_url: state.row.given_url.clone().unwrap_or_default(),
                given_phone: state.row.given_phone.clone().unwrap_or_default(),
                normalized_given_phone: match &state.row.normalized_given_phone {
                    GivenPhone::Normalized(n) => n.clone(),
                    GivenPhone::InvalidFormat(_) => "InvalidFormat".to_string(),
                    GivenPhone::NotProvided => String::new(),
                },
                description: state.row.description.clone().unwrap_or_default(),
                canonical_entry_url: base.clone(),
                scraping_status: state
                    .initial_status
                    .map(|s| s.as_str().to_string())
                    .unwrap_or_else(|| {
                        if state.validation_failure.is_some() {
                            "InvalidURL".to_string()
                        } else {
                            "Not_Run".to_string()
                        }
                    }),
                original_number_status,
                overall_verification_status: overall_verification,
                top,
                final_row_outcome_reason: reason,
                determined_fault_category: fault,
                target_country_codes: state.row.target_country_codes.join(","),
                run_id: run_id.to_string(),
            });
        }

        // --- Base-level reports -----------------------------------------
        let mut contacts_rows: Vec<FinalContactsRow> = Vec::new();
        let mut processed_rows: Vec<ProcessedContactRow> = Vec::new();

        for (base, journey) in journeys {
            let details = consolidated_by_base.get(base);
            let eligible: Vec<_> = details.map(|d| eligible_numbers(d)).unwrap_or_default();

            let companies: Vec<&str> = journey
                .input_company_names
                .iter()
                .map(|s| s.as_str())
                .collect();
            let company_cell = if companies.is_empty() {
                base.clone()
            } else {
                format!("{} - {}", base, companies.join(" - "))
            };
            let given_urls: Vec<&str> =
                journey.input_given_urls.iter().map(|s| s.as_str()).collect();
            let status = journey
                .overall_scraper_status()
                .map(|s| s.as_str().to_string())
                .unwrap_or_else(|| "Unknown".to_string());

            let contacts: Vec<(String, String)> = eligible
                .iter()
                .take(3)
                .map(|number| {
                    let mut types: Vec<&str> =
                        number.sources.iter().map(|s| s.number_type.as_str()).collect();
                    types.sort_unstable();
                    types.dedup();
                    let mut sourcing_companies: Vec<&str> = number
                        .sources
                        .iter()
                        .map(|s| s.company_name.as_str())
                        .filter(|c| !c.is_empty())
                        .collect();
                    sourcing_companies.sort_unstable();
                    sourcing_companies.dedup();
                    let mut urls: Vec<&str> =
                        number.sources.iter().map(|s| s.source_url.as_str()).collect();
                    urls.sort_unstable();
                    urls.dedup();
                    (
                        format!(
                            "{} ({}) [{}]",
                            number.number,
                            types.join(", "),
                            sourcing_companies.join(", ")
                        ),
                        urls.join(", "),
                    )
                })
                .collect();

            contacts_rows.push(FinalContactsRow {
                company_name: company_cell,
                given_urls: given_urls.join(", "),
                canonical_entry_url: base.clone(),
                scraping_status: status,
                contacts,
            });

            let domain_label = domain_label_for(base);
            for number in &eligible {
                let best_type = number
                    .sources
                    .iter()
                    .min_by_key(|s| type_priority(&s.number_type))
                    .map(|s| s.number_type.clone())
                    .unwrap_or_default();
                let mut urls: Vec<&str> =
                    number.sources.iter().map(|s| s.source_url.as_str()).collect();
                urls.sort_unstable();
                urls.dedup();
                processed_rows.push(ProcessedContactRow {
                    company_label: domain_label.clone(),
                    base_url: base.clone(),
                    number: number.number.clone(),
                    number_type: best_type,
                    found_at: urls.join(", "),
                });
            }
        }

        // --- Write everything --------------------------------------------
        let summary_name = self
            .config
            .output
            .summary_file_name_template
            .replace("{run_id}", run_id);
        let n = write_summary_report(&paths.run_dir.join(summary_name), &summary_rows)?;
        metrics
            .report_row_counts
            .insert("Pipeline_Summary_Report".to_string(), n);

        let n = write_llm_extractions_report(
            &paths.run_dir.join(format!("all_llm_extractions_{}.csv", run_id)),
            &llm_rows,
        )?;
        metrics
            .report_row_counts
            .insert("All_LLM_Extractions_Report".to_string(), n);

        let n = write_final_contacts_report(
            &paths.run_dir.join(format!("final_contacts_{}.csv", run_id)),
            &contacts_rows,
        )?;
        metrics
            .report_row_counts
            .insert("Final_Contacts_Report".to_string(), n);

        let n = write_processed_contacts_report(
            &paths
                .run_dir
                .join(format!("final_processed_contacts_{}.csv", run_id)),
            &processed_rows,
        )?;
        metrics
            .report_row_counts
            .insert("Final_Processed_Contacts_Report".to_string(), n);

        let n = write_attrition_report(
            &paths.run_dir.join(format!("row_attrition_report_{}.csv", run_id)),
            &attrition_rows,
        )?;
        metrics
            .report_row_counts
            .insert("Row_Attrition_Report".to_string(), n);

        let n = write_domain_summary_report(
            &paths
                .run_dir
                .join(format!("canonical_domain_processing_summary_{}.csv", run_id)),
            journeys.values(),
        )?;
        metrics
            .report_row_counts
            .insert("Canonical_Domain_Processing_Summary".to_string(), n);

        Ok(RunSummary {
            run_id: run_id.to_string(),
            run_dir: paths.run_dir.clone(),
            input_rows: states.len(),
            rows_with_contacts,
            attrition_rows: attrition_rows.len(),
            domains_processed: journeys.len(),
        })
    }
}

/// Best-effort status of the phone number the input supplied.
fn original_number_status(
    given: &GivenPhone,
    top: &[TopContactCell],
    eligible: &[&crate::schemas::ConsolidatedNumber],
    reason: &str,
    overall_status: &str,
) -> String {
    match given {
        GivenPhone::NotProvided => "Original_Not_Provided".to_string(),
        GivenPhone::InvalidFormat(_) => "Original_InvalidFormat".to_string(),
        GivenPhone::Normalized(number) => {
            if top.iter().any(|cell| &cell.number == number) {
                "Verified".to_string()
            } else if !eligible.is_empty() {
                "Corrected".to_string()
            } else if reason.starts_with("Scraping") || reason.starts_with("ScrapingFailed") {
                format!("Scrape_{}", overall_status)
            } else {
                "No Relevant Match Found".to_string()
            }
        }
    }
}

/// Row-level verification status derived from the outcome reason.
fn overall_verification_status(
    reason: &str,
    overall_status: &str,
    row: &InputRow,
    base: &str,
) -> String {
    let mut status = if reason == CONTACT_EXTRACTED {
        "Verified_LLM_Match_Found".to_string()
    } else if reason.starts_with("Scraping") || reason.starts_with("ScrapingFailed") {
        format!("Unverified_Scrape_{}", overall_status)
    } else if reason.starts_with("LLM_Output_") {
        "Unverified_LLM_NoRelevantNumbers".to_string()
    } else if reason.starts_with("LLM_Processing_Error") {
        "Error_LLM_Processing_For_Canonical".to_string()
    } else {
        "Unverified".to_string()
    };

    // Flag rows whose landed base differs from the input's derived base
    if !base.is_empty() {
        if let Some(input_base) = row.given_url.as_deref().and_then(canonical_base_url) {
            if input_base != base {
                status = format!("RedirectedTo[{}]_{}", base, status);
            }
        }
    }
    status
}

/// Short company label from a base canonical URL: the first host label
/// after any `www.` prefix.
fn domain_label_for(base_url: &str) -> String {
    url::Url::parse(base_url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .map(|host| {
            host.trim_start_matches("www.")
                .split('.')
                .next()
                .unwrap_or(&host)
                .to_string()
        })
        .unwrap_or_else(|| base_url.to_string())
}

/// Filesystem-safe identifier for a base canonical URL.
fn safe_base_name(base_url: &str) -> String {
    base_url
        .trim_start_matches("http://")
        .trim_start_matches("https://")
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .take(100)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_shape() {
        let id = generate_run_id();
        assert_eq!(id.len(), 15);
        assert_eq!(&id[8..9], "_");
        assert!(id[..8].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_domain_label() {
        assert_eq!(domain_label_for("http://example.com"), "example");
        assert_eq!(domain_label_for("https://www.shop.example"), "shop");
        assert_eq!(domain_label_for("not a url"), "not a url");
    }

    #[test]
    fn test_safe_base_name() {
        assert_eq!(safe_base_name("http://example.com"), "example_com");
        assert_eq!(safe_base_name("https://shop.example"), "shop_example");
    }

    #[test]
    fn test_original_number_status_variants() {
        let top = vec![TopContactCell {
            number: "+493012345678".to_string(),
            ..Default::default()
        }];
        assert_eq!(
            original_number_status(
                &GivenPhone::Normalized("+493012345678".to_string()),
                &top,
                &[],
                CONTACT_EXTRACTED,
                "Success"
            ),
            "Verified"
        );
        assert_eq!(
            original_number_status(&GivenPhone::NotProvided, &[], &[], CONTACT_EXTRACTED, "Success"),
            "Original_Not_Provided"
        );
        assert_eq!(
            original_number_status(
                &GivenPhone::InvalidFormat("abc".to_string()),
                &[],
                &[],
                CONTACT_EXTRACTED,
                "Success"
            ),
            "Original_InvalidFormat"
        );
        assert_eq!(
            original_number_status(
                &GivenPhone::Normalized("+491".to_string()),
                &[],
                &[],
                "Scraping_AllAttemptsFailed_Network",
                "Error_DNS"
            ),
            "Scrape_Error_DNS"
        );
    }

    #[test]
    fn test_verification_status_redirect_prefix() {
        let row = InputRow {
            row_id: 1,
            company_name: "Acme".to_string(),
            given_url: Some("http://acme.de".to_string()),
            given_phone: None,
            normalized_given_phone: GivenPhone::NotProvided,
            description: None,
            target_country_codes: vec![],
        };
        let status = overall_verification_status(
            CONTACT_EXTRACTED,
            "Success",
            &row,
            "http://acme.com",
        );
        assert_eq!(status, "RedirectedTo[http://acme.com]_Verified_LLM_Match_Found");
    }
}
