//! Report emission.
//!
//! Five tabular CSV reports with fixed column contracts, the streaming
//! row-failure log, and the run-metrics markdown document. Writers are
//! idempotent given the same inputs; all files live under the run's
//! output directory.

use anyhow::Result;
use chrono::Utc;
use csv::Writer;
use serde_json::json;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write as IoWrite;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

use crate::journey::DomainJourney;

/// One "Top_N" cell triple in the pipeline summary report.
#[derive(Debug, Clone, Default)]
pub struct TopContactCell {
    pub number: String,
    pub types: String,
    pub source_urls: String,
}

/// One row of the Pipeline_Summary_Report.
#[derive(Debug, Clone, Default)]
pub struct SummaryReportRow {
    pub input_row_id: usize,
    pub company_name: String,
    pub given_url: String,
    pub given_phone: String,
    pub normalized_given_phone: String,
    pub description: String,
    pub canonical_entry_url: String,
    pub scraping_status: String,
    pub original_number_status: String,
    pub overall_verification_status: String,
    /// Up to three top contacts; missing slots render empty.
    pub top: Vec<TopContactCell>,
    pub final_row_outcome_reason: String,
    pub determined_fault_category: String,
    pub target_country_codes: String,
    pub run_id: String,
}

pub fn write_summary_report(path: &Path, rows: &[SummaryReportRow]) -> Result<usize> {
    debug!("Writing pipeline summary report to {}", path.display());
    let mut wtr = Writer::from_writer(File::create(path)?);
    wtr.write_record([
        "InputRowID",
        "CompanyName",
        "GivenURL",
        "GivenPhoneNumber",
        "NormalizedGivenPhoneNumber",
        "Description",
        "CanonicalEntryURL",
        "ScrapingStatus",
        "Original_Number_Status",
        "Overall_VerificationStatus",
        "Top_Number_1",
        "Top_Type_1",
        "Top_SourceURL_1",
        "Top_Number_2",
        "Top_Type_2",
        "Top_SourceURL_2",
        "Top_Number_3",
        "Top_Type_3",
        "Top_SourceURL_3",
        "Final_Row_Outcome_Reason",
        "Determined_Fault_Category",
        "TargetCountryCodes",
        "RunID",
    ])?;

    for row in rows {
        let top = |i: usize| row.top.get(i).cloned().unwrap_or_default();
        let (t1, t2, t3) = (top(0), top(1), top(2));
        let record = vec![
            row.input_row_id.to_string(),
            row.company_name.clone(),
            row.given_url.clone(),
            row.given_phone.clone(),
            row.normalized_given_phone.clone(),
            row.description.clone(),
            row.canonical_entry_url.clone(),
            row.scraping_status.clone(),
            row.original_number_status.clone(),
            row.overall_verification_status.clone(),
            t1.number,
            t1.types,
            t1.source_urls,
            t2.number,
            t2.types,
            t2.source_urls,
            t3.number,
            t3.types,
            t3.source_urls,
            row.final_row_outcome_reason.clone(),
            row.determined_fault_category.clone(),
            row.target_country_codes.clone(),
            row.run_id.clone(),
        ];
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    info!(
        "Pipeline summary report written: {} row(s) to {}",
        rows.len(),
        path.display()
    );
    Ok(rows.len())
}

/// One row of the All_LLM_Extractions_Report.
#[derive(Debug, Clone)]
pub struct LlmExtractionReportRow {
    pub company_name: String,
    pub number: String,
    pub llm_type: String,
    pub llm_classification: String,
    pub llm_source_url: String,
    pub scraping_status: String,
    pub target_country_codes: String,
    pub run_id: String,
}

pub fn write_llm_extractions_report(path: &Path, rows: &[LlmExtractionReportRow]) -> Result<usize> {
    debug!("Writing LLM extractions report to {}", path.display());
    let mut wtr = Writer::from_writer(File::create(path)?);
    wtr.write_record([
        "CompanyName",
        "Number",
        "LLM_Type",
        "LLM_Classification",
        "LLM_Source_URL",
        "ScrapingStatus",
        "TargetCountryCodes",
        "RunID",
    ])?;
    for row in rows {
        wtr.write_record([
            &row.company_name,
            &row.number,
            &row.llm_type,
            &row.llm_classification,
            &row.llm_source_url,
            &row.scraping_status,
            &row.target_country_codes,
            &row.run_id,
        ])?;
    }
    wtr.flush()?;
    info!(
        "LLM extractions report written: {} row(s) to {}",
        rows.len(),
        path.display()
    );
    Ok(rows.len())
}

/// One row of the Final_Contacts_Report: a base canonical domain with its
/// top three formatted contact cells.
#[derive(Debug, Clone, Default)]
pub struct FinalContactsRow {
    /// `{base_canonical} - CompanyA - CompanyB - ...`
    pub company_name: String,
    /// Comma-joined original input URLs.
    pub given_urls: String,
    pub canonical_entry_url: String,
    pub scraping_status: String,
    /// Up to three (formatted number cell, source URL list) pairs.
    pub contacts: Vec<(String, String)>,
}

pub fn write_final_contacts_report(path: &Path, rows: &[FinalContactsRow]) -> Result<usize> {
    debug!("Writing final contacts report to {}", path.display());
    let mut wtr = Writer::from_writer(File::create(path)?);
    wtr.write_record([
        "CompanyName",
        "GivenURL",
        "CanonicalEntryURL",
        "ScrapingStatus",
        "PhoneNumber_1",
        "SourceURL_1",
        "PhoneNumber_2",
        "SourceURL_2",
        "PhoneNumber_3",
        "SourceURL_3",
    ])?;
    for row in rows {
        let cell = |i: usize| row.contacts.get(i).cloned().unwrap_or_default();
        let (c1, c2, c3) = (cell(0), cell(1), cell(2));
        wtr.write_record([
            &row.company_name,
            &row.given_urls,
            &row.canonical_entry_url,
            &row.scraping_status,
            &c1.0,
            &c1.1,
            &c2.0,
            &c2.1,
            &c3.0,
            &c3.1,
        ])?;
    }
    wtr.flush()?;
    info!(
        "Final contacts report written: {} row(s) to {}",
        rows.len(),
        path.display()
    );
    Ok(rows.len())
}

/// One row of the Final_Processed_Contacts_Report: one eligible
/// consolidated number for one base canonical domain.
#[derive(Debug, Clone)]
pub struct ProcessedContactRow {
    /// Domain label extracted from the base canonical URL.
    pub company_label: String,
    pub base_url: String,
    pub number: String,
    pub number_type: String,
    pub found_at: String,
}

pub fn write_processed_contacts_report(path: &Path, rows: &[ProcessedContactRow]) -> Result<usize> {
    debug!("Writing processed contacts report to {}", path.display());
    let mut wtr = Writer::from_writer(File::create(path)?);
    wtr.write_record(["Company Name", "URL", "Number", "Number Type", "Number Found At"])?;
    for row in rows {
        wtr.write_record([
            &row.company_label,
            &row.base_url,
            &row.number,
            &row.number_type,
            &row.found_at,
        ])?;
    }
    wtr.flush()?;
    info!(
        "Processed contacts report written: {} row(s) to {}",
        rows.len(),
        path.display()
    );
    Ok(rows.len())
}

/// One row of the Row_Attrition_Report.
#[derive(Debug, Clone, Default)]
pub struct AttritionRow {
    pub input_row_id: usize,
    pub company_name: String,
    pub given_url: String,
    pub derived_input_canonical_url: String,
    pub final_processed_canonical_domain: String,
    pub link_to_canonical_domain_outcome: String,
    pub final_row_outcome_reason: String,
    pub determined_fault_category: String,
    pub relevant_canonical_urls: String,
    pub llm_error_detail_summary: String,
    pub input_company_name_total_count: usize,
    pub input_canonical_url_total_count: usize,
    pub is_input_company_name_duplicate: bool,
    pub is_input_canonical_url_duplicate: bool,
    pub is_input_row_considered_duplicate: bool,
    pub timestamp_of_determination: String,
}

pub fn write_attrition_report(path: &Path, rows: &[AttritionRow]) -> Result<usize> {
    debug!("Writing row attrition report to {}", path.display());
    let mut wtr = Writer::from_writer(File::create(path)?);
    wtr.write_record([
        "InputRowID",
        "CompanyName",
        "GivenURL",
        "Derived_Input_CanonicalURL",
        "Final_Processed_Canonical_Domain",
        "Link_To_Canonical_Domain_Outcome",
        "Final_Row_Outcome_Reason",
        "Determined_Fault_Category",
        "Relevant_Canonical_URLs",
        "LLM_Error_Detail_Summary",
        "Input_CompanyName_Total_Count",
        "Input_CanonicalURL_Total_Count",
        "Is_Input_CompanyName_Duplicate",
        "Is_Input_CanonicalURL_Duplicate",
        "Is_Input_Row_Considered_Duplicate",
        "Timestamp_Of_Determination",
    ])?;
    let yes_no = |b: bool| if b { "Yes".to_string() } else { "No".to_string() };
    for row in rows {
        let record = vec![
            row.input_row_id.to_string(),
            row.company_name.clone(),
            row.given_url.clone(),
            row.derived_input_canonical_url.clone(),
            row.final_processed_canonical_domain.clone(),
            row.link_to_canonical_domain_outcome.clone(),
            row.final_row_outcome_reason.clone(),
            row.determined_fault_category.clone(),
            row.relevant_canonical_urls.clone(),
            row.llm_error_detail_summary.clone(),
            row.input_company_name_total_count.to_string(),
            row.input_canonical_url_total_count.to_string(),
            yes_no(row.is_input_company_name_duplicate),
            yes_no(row.is_input_canonical_url_duplicate),
            yes_no(row.is_input_row_considered_duplicate),
            row.timestamp_of_determination.clone(),
        ];
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    info!(
        "Row attrition report written: {} row(s) to {}",
        rows.len(),
        path.display()
    );
    Ok(rows.len())
}

pub fn write_domain_summary_report<'a, I>(path: &Path, journeys: I) -> Result<usize>
where
    I: IntoIterator<Item = &'a DomainJourney>,
{
    debug!("Writing canonical domain summary to {}", path.display());
    let mut wtr = Writer::from_writer(File::create(path)?);
    wtr.write_record([
        "Canonical_Domain",
        "Input_Row_IDs",
        "Input_CompanyNames",
        "Input_GivenURLs",
        "Pathful_URLs_Attempted_List",
        "Overall_Scraper_Status_For_Domain",
        "Total_Pages_Scraped_For_Domain",
        "Scraped_Pages_Details_Aggregated",
        "Regex_Candidates_Found_For_Any_Pathful",
        "LLM_Calls_Made_For_Domain",
        "LLM_Total_Raw_Numbers_Extracted",
        "LLM_Total_Consolidated_Numbers_Found",
        "LLM_Consolidated_Number_Types_Summary",
        "LLM_Processing_Error_Encountered_For_Domain",
        "LLM_Error_Messages_Aggregated",
        "Final_Domain_Outcome_Reason",
        "Primary_Fault_Category_For_Domain",
    ])?;

    let mut count = 0usize;
    for journey in journeys {
        let row_ids = journey
            .input_row_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let companies = journey
            .input_company_names
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        let given_urls = journey
            .input_given_urls
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        let pathfuls = journey.pathful_urls_attempted().join(", ");
        let pages_by_type = json!(journey
            .pages_by_type
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), *v))
            .collect::<BTreeMap<String, usize>>())
        .to_string();
        let type_counts = json!(journey.consolidated_type_counts).to_string();
        let errors = journey.llm_error_messages.join("; ");
        let overall = journey
            .overall_scraper_status()
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|| "Unknown".to_string());

        let yes_no = |b: bool| if b { "Yes".to_string() } else { "No".to_string() };
        let record = vec![
            journey.base_url.clone(),
            row_ids,
            companies,
            given_urls,
            pathfuls,
            overall,
            journey.total_pages_scraped.to_string(),
            pages_by_type,
            yes_no(journey.regex_found_any_candidate),
            yes_no(journey.llm_call_made),
            journey.raw_llm_number_count.to_string(),
            journey.consolidated_number_count.to_string(),
            type_counts,
            yes_no(journey.llm_error_encountered),
            errors,
            journey.final_outcome_reason.clone(),
            journey.primary_fault_category.clone(),
        ];
        wtr.write_record(&record)?;
        count += 1;
    }
    wtr.flush()?;
    info!(
        "Canonical domain summary written: {} row(s) to {}",
        count,
        path.display()
    );
    Ok(count)
}

/// Streaming per-row failure log (`failed_rows_{run_id}.csv`). Rows are
/// appended as failures are observed during the run.
pub struct FailureLog {
    writer: Mutex<Writer<File>>,
}

impl FailureLog {
    pub fn create(path: &Path) -> Result<Self> {
        let mut writer = Writer::from_writer(File::create(path)?);
        writer.write_record([
            "log_timestamp",
            "input_row_identifier",
            "CompanyName",
            "GivenURL",
            "stage_of_failure",
            "error_reason",
            "error_details",
            "Associated_Pathful_Canonical_URL",
        ])?;
        writer.flush()?;
        Ok(Self {
            writer: Mutex::new(writer),
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn log(
        &self,
        input_row_id: usize,
        company_name: &str,
        given_url: Option<&str>,
        stage_of_failure: &str,
        error_reason: &str,
        error_details: serde_json::Value,
        pathful_url: Option<&str>,
    ) {
        let sanitize = |s: &str| s.replace(['\n', '\r'], " ");
        let record = [
            Utc::now().to_rfc3339(),
            input_row_id.to_string(),
            sanitize(company_name),
            sanitize(given_url.unwrap_or_default()),
            stage_of_failure.to_string(),
            sanitize(error_reason),
            error_details.to_string(),
            pathful_url.unwrap_or_default().to_string(),
        ];
        if let Ok(mut writer) = self.writer.lock() {
            if let Err(e) = writer.write_record(&record) {
                tracing::error!("Failed to append to failure log: {}", e);
            }
            let _ = writer.flush();
        }
    }
}

/// Aggregate run counters, written to `run_metrics_{run_id}.md`.
#[derive(Debug, Default)]
pub struct RunMetrics {
    pub run_id: String,
    pub task_durations: BTreeMap<String, Duration>,

    pub input_rows_count: usize,
    pub rows_failed_pass1: usize,
    pub row_failure_counts: BTreeMap<String, usize>,

    pub unique_company_names: usize,
    pub unique_input_canonical_hosts: usize,
    pub company_names_with_duplicates: usize,
    pub input_hosts_with_duplicates: usize,
    pub rows_considered_duplicates: usize,

    pub urls_processed_for_scraping: usize,
    pub scraping_success: usize,
    pub scraping_invalid_url: usize,
    pub scraping_already_processed: usize,
    pub scraping_errors: usize,
    pub new_canonical_sites_scraped: usize,
    pub total_pages_scraped: usize,
    pub pages_by_type: BTreeMap<String, usize>,

    pub sites_processed_for_regex: usize,
    pub sites_with_regex_candidates: usize,
    pub total_regex_candidates: usize,

    pub sites_processed_for_llm: usize,
    pub llm_chunks_processed: usize,
    pub llm_chunk_errors: usize,
    pub total_llm_raw_numbers: usize,
    pub llm_prompt_tokens: u64,
    pub llm_completion_tokens: u64,
    pub llm_total_tokens: u64,

    pub report_row_counts: BTreeMap<String, usize>,
    pub errors_encountered: Vec<String>,
}

impl RunMetrics {
    pub fn add_task_duration(&mut self, task: &str, duration: Duration) {
        *self
            .task_durations
            .entry(task.to_string())
            .or_insert(Duration::ZERO) += duration;
    }

    pub fn count_row_failure(&mut self, stage: &str) {
        *self.row_failure_counts.entry(stage.to_string()).or_insert(0) += 1;
    }
}

pub fn write_run_metrics(
    path: &Path,
    metrics: &RunMetrics,
    total_duration: Duration,
    attrition_fault_counts: &BTreeMap<String, usize>,
    domain_outcome_counts: &BTreeMap<String, usize>,
) -> Result<()> {
    let mut out = String::new();
    use std::fmt::Write as FmtWrite;

    writeln!(out, "# Pipeline Run Metrics: {}\n", metrics.run_id)?;
    writeln!(out, "**Run ID:** {}", metrics.run_id)?;
    writeln!(out, "**Total Run Duration:** {:.2} seconds\n", total_duration.as_secs_f64())?;

    writeln!(out, "## Task Durations (seconds)\n")?;
    if metrics.task_durations.is_empty() {
        writeln!(out, "- No task durations recorded.")?;
    }
    for (task, duration) in &metrics.task_durations {
        writeln!(out, "- **{}:** {:.2}", task, duration.as_secs_f64())?;
    }
    writeln!(out)?;

    writeln!(out, "## Data Processing\n")?;
    writeln!(out, "- **Input rows:** {}", metrics.input_rows_count)?;
    writeln!(out, "- **Rows failed in pass 1:** {}", metrics.rows_failed_pass1)?;
    writeln!(out, "- **Unique company names:** {}", metrics.unique_company_names)?;
    writeln!(
        out,
        "- **Unique input canonical hosts:** {}",
        metrics.unique_input_canonical_hosts
    )?;
    writeln!(
        out,
        "- **Company names appearing more than once:** {}",
        metrics.company_names_with_duplicates
    )?;
    writeln!(
        out,
        "- **Input hosts appearing more than once:** {}",
        metrics.input_hosts_with_duplicates
    )?;
    writeln!(
        out,
        "- **Rows considered duplicates:** {}\n",
        metrics.rows_considered_duplicates
    )?;

    writeln!(out, "## Scraping\n")?;
    writeln!(out, "- **URLs processed:** {}", metrics.urls_processed_for_scraping)?;
    writeln!(out, "- **Successes:** {}", metrics.scraping_success)?;
    writeln!(out, "- **Invalid URLs:** {}", metrics.scraping_invalid_url)?;
    writeln!(
        out,
        "- **Already processed (cache hits):** {}",
        metrics.scraping_already_processed
    )?;
    writeln!(out, "- **Failures:** {}", metrics.scraping_errors)?;
    writeln!(
        out,
        "- **New canonical sites scraped:** {}",
        metrics.new_canonical_sites_scraped
    )?;
    writeln!(out, "- **Total pages scraped:** {}", metrics.total_pages_scraped)?;
    if metrics.new_canonical_sites_scraped > 0 {
        writeln!(
            out,
            "- **Average pages per scraped site:** {:.2}",
            metrics.total_pages_scraped as f64 / metrics.new_canonical_sites_scraped as f64
        )?;
    }
    writeln!(out, "- **Pages by type:**")?;
    if metrics.pages_by_type.is_empty() {
        writeln!(out, "  - none recorded")?;
    }
    for (page_type, count) in &metrics.pages_by_type {
        writeln!(out, "  - *{}:* {}", page_type, count)?;
    }
    writeln!(out)?;

    writeln!(out, "## Regex Extraction\n")?;
    writeln!(out, "- **Sites processed:** {}", metrics.sites_processed_for_regex)?;
    writeln!(
        out,
        "- **Sites with candidates:** {}",
        metrics.sites_with_regex_candidates
    )?;
    writeln!(out, "- **Total candidates:** {}\n", metrics.total_regex_candidates)?;

    writeln!(out, "## LLM Processing\n")?;
    writeln!(out, "- **Domains sent to the model:** {}", metrics.sites_processed_for_llm)?;
    writeln!(out, "- **Chunks processed:** {}", metrics.llm_chunks_processed)?;
    writeln!(out, "- **Chunk errors:** {}", metrics.llm_chunk_errors)?;
    writeln!(out, "- **Raw numbers extracted:** {}", metrics.total_llm_raw_numbers)?;
    writeln!(out, "- **Prompt tokens:** {}", metrics.llm_prompt_tokens)?;
    writeln!(out, "- **Completion tokens:** {}", metrics.llm_completion_tokens)?;
    writeln!(out, "- **Total tokens:** {}", metrics.llm_total_tokens)?;
    if metrics.llm_chunks_processed > 0 {
        writeln!(
            out,
            "- **Average total tokens per chunk:** {:.2}",
            metrics.llm_total_tokens as f64 / metrics.llm_chunks_processed as f64
        )?;
    }
    writeln!(out)?;

    writeln!(out, "## Report Rows\n")?;
    for (report, count) in &metrics.report_row_counts {
        writeln!(out, "- **{}:** {}", report, count)?;
    }
    writeln!(out)?;

    writeln!(out, "## Row-Level Failures by Stage\n")?;
    if metrics.row_failure_counts.is_empty() {
        writeln!(out, "- No row-level failures recorded.")?;
    }
    for (stage, count) in &metrics.row_failure_counts {
        writeln!(out, "- **{}:** {}", stage, count)?;
    }
    writeln!(out)?;

    writeln!(out, "## Canonical Domain Outcomes\n")?;
    if domain_outcome_counts.is_empty() {
        writeln!(out, "- No canonical domains processed.")?;
    }
    for (outcome, count) in domain_outcome_counts {
        writeln!(out, "- **{}:** {}", outcome, count)?;
    }
    writeln!(out)?;

    writeln!(out, "## Attrition by Fault Category\n")?;
    if attrition_fault_counts.is_empty() {
        writeln!(out, "- Every input row yielded a contact.")?;
    }
    for (fault, count) in attrition_fault_counts {
        writeln!(out, "- **{}:** {}", fault, count)?;
    }
    writeln!(out)?;

    writeln!(out, "## Errors Encountered\n")?;
    if metrics.errors_encountered.is_empty() {
        writeln!(out, "- No significant pipeline errors recorded.")?;
    }
    for error in &metrics.errors_encountered {
        writeln!(out, "- {}", error)?;
    }

    let mut file = File::create(path)?;
    file.write_all(out.as_bytes())?;
    info!("Run metrics written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::ScraperStatus;

    #[test]
    fn test_summary_report_headers_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.csv");
        let rows = vec![SummaryReportRow {
            input_row_id: 1,
            company_name: "ExampleCorp".to_string(),
            given_url: "http://example.com".to_string(),
            scraping_status: "Success".to_string(),
            final_row_outcome_reason: "Contact_Successfully_Extracted".to_string(),
            determined_fault_category: "N/A".to_string(),
            run_id: "20240101_000000".to_string(),
            top: vec![TopContactCell {
                number: "+493012345678".to_string(),
                types: "Main Line".to_string(),
                source_urls: "http://example.com/kontakt".to_string(),
            }],
            ..Default::default()
        }];
        let written = write_summary_report(&path, &rows).unwrap();
        assert_eq!(written, 1);

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("InputRowID,CompanyName,GivenURL"));
        assert!(header.ends_with("TargetCountryCodes,RunID"));
        let data = lines.next().unwrap();
        assert!(data.contains("+493012345678"));
        // Empty Top_2 / Top_3 slots render as empty cells, not omissions
        assert_eq!(header.split(',').count(), data.split(',').count());
    }

    #[test]
    fn test_empty_reports_have_headers_only() {
        let dir = tempfile::tempdir().unwrap();

        let summary = dir.path().join("s.csv");
        write_summary_report(&summary, &[]).unwrap();
        assert_eq!(std::fs::read_to_string(&summary).unwrap().lines().count(), 1);

        let contacts = dir.path().join("c.csv");
        write_final_contacts_report(&contacts, &[]).unwrap();
        assert_eq!(std::fs::read_to_string(&contacts).unwrap().lines().count(), 1);

        let processed = dir.path().join("p.csv");
        write_processed_contacts_report(&processed, &[]).unwrap();
        assert_eq!(
            std::fs::read_to_string(&processed).unwrap().lines().count(),
            1
        );

        let attrition = dir.path().join("a.csv");
        write_attrition_report(&attrition, &[]).unwrap();
        assert_eq!(
            std::fs::read_to_string(&attrition).unwrap().lines().count(),
            1
        );
    }

    #[test]
    fn test_domain_summary_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("domains.csv");

        let mut journey = DomainJourney::new("http://example.com");
        journey.record_input_row(1, "ExampleCorp", Some("http://example.com"));
        journey.record_pathful_attempt("http://example.com/", ScraperStatus::Success);
        journey.record_regex_outcome(true);
        journey.record_llm_call();
        journey.add_raw_llm_numbers(4);
        journey.final_outcome_reason = "Contact_Successfully_Extracted_ForDomain".to_string();
        journey.primary_fault_category = "N/A".to_string();

        let written = write_domain_summary_report(&path, [&journey]).unwrap();
        assert_eq!(written, 1);
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("http://example.com"));
        assert!(content.contains("Contact_Successfully_Extracted_ForDomain"));
        assert!(content.contains("Yes"));
    }

    #[test]
    fn test_failure_log_sanitizes_newlines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("failed_rows.csv");
        let log = FailureLog::create(&path).unwrap();
        log.log(
            7,
            "Multi\nLine Corp",
            Some("http://example.com"),
            "Scraping_Error_DNS",
            "seed failed\r\nwith DNS error",
            serde_json::json!({"status": "Error_DNS"}),
            Some("http://example.com/"),
        );
        drop(log);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("Multi Line Corp"));
        assert!(content.contains("Scraping_Error_DNS"));
    }

    #[test]
    fn test_run_metrics_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_metrics.md");
        let mut metrics = RunMetrics {
            run_id: "20240101_000000".to_string(),
            input_rows_count: 3,
            total_pages_scraped: 5,
            llm_total_tokens: 1234,
            llm_chunks_processed: 2,
            ..Default::default()
        };
        metrics.add_task_duration("pass1", Duration::from_secs(10));
        metrics.count_row_failure("Scraping_Error_DNS");

        let mut faults = BTreeMap::new();
        faults.insert("Website Issue".to_string(), 1);
        let mut outcomes = BTreeMap::new();
        outcomes.insert("Contact_Successfully_Extracted_ForDomain".to_string(), 2);

        write_run_metrics(&path, &metrics, Duration::from_secs(42), &faults, &outcomes).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("# Pipeline Run Metrics: 20240101_000000"));
        assert!(content.contains("**Total Run Duration:** 42.00 seconds"));
        assert!(content.contains("**Scraping_Error_DNS:** 1"));
        assert!(content.contains("**Website Issue:** 1"));
        assert!(content.contains("**Average total tokens per chunk:** 617.00"));
    }

    #[test]
    fn test_zero_counts_for_empty_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_metrics.md");
        let metrics = RunMetrics {
            run_id: "x".to_string(),
            ..Default::default()
        };
        write_run_metrics(&path, &metrics, Duration::ZERO, &BTreeMap::new(), &BTreeMap::new())
            .unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("- **Input rows:** 0"));
        assert!(content.contains("No canonical domains processed."));
    }
}
