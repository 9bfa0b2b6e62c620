//! Final outcome derivation for input rows and canonical domains.
//!
//! Pure functions over recorded pipeline state. The row derivation walks
//! an ordered rule list and the first match wins, so every row lands on
//! exactly one reason; the domain derivation mirrors it with `_ForDomain`
//! suffixes. Fault categories are a fixed mapping from reasons.

use crate::journey::DomainJourney;
use crate::schemas::ScraperStatus;

/// Row outcome for contact extraction success.
pub const CONTACT_EXTRACTED: &str = "Contact_Successfully_Extracted";

/// Validation failures detected before the scraper ran for a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowValidationFailure {
    InvalidUrl,
    UnsupportedScheme,
    MaxRedirects,
}

/// Everything the row classifier looks at, gathered by pass 2.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowSignals<'a> {
    pub validation_failure: Option<RowValidationFailure>,
    /// Base canonical determined for the row, if any.
    pub base_canonical: Option<&'a str>,
    /// Status recorded for the row's initial pathful in pass 1.
    pub initial_status: Option<ScraperStatus>,
    pub journey: Option<&'a DomainJourney>,
    /// Count of eligible consolidated numbers for the row's base.
    pub eligible_consolidated_count: usize,
}

/// Derive the row's final outcome reason. Total: always returns a reason.
pub fn derive_row_outcome(signals: &RowSignals) -> String {
    if let Some(failure) = signals.validation_failure {
        return match failure {
            RowValidationFailure::InvalidUrl => "Input_URL_Invalid".to_string(),
            RowValidationFailure::UnsupportedScheme => "Input_URL_UnsupportedScheme".to_string(),
            RowValidationFailure::MaxRedirects => {
                "Pipeline_Skipped_MaxRedirects_ForInputURL".to_string()
            }
        };
    }

    let Some(_base) = signals.base_canonical else {
        return "Unknown_NoCanonicalURLDetermined".to_string();
    };

    // A row whose base yielded eligible contacts succeeded, even when its
    // own crawl was short-circuited as a duplicate of an earlier row.
    if signals.eligible_consolidated_count >= 1 {
        return CONTACT_EXTRACTED.to_string();
    }

    let Some(journey) = signals.journey else {
        return "Unknown_NoCanonicalURLDetermined".to_string();
    };

    let overall = journey.overall_scraper_status();

    if signals.initial_status == Some(ScraperStatus::AlreadyProcessed)
        && overall == Some(ScraperStatus::Success)
    {
        return "Canonical_Duplicate_SkippedProcessing".to_string();
    }

    if overall != Some(ScraperStatus::Success) {
        return scraping_failure_reason(journey, overall, "");
    }

    if journey.total_pages_scraped > 0
        && !journey.pages_by_type.keys().any(|t| t.is_relevant())
    {
        return "Scraping_Success_NoRelevantContentPagesFound".to_string();
    }

    if !journey.regex_found_any_candidate {
        return "Canonical_NoRegexCandidatesFound".to_string();
    }

    if journey.llm_error_encountered && journey.raw_llm_number_count == 0 {
        return "LLM_Processing_Error_AllAttempts".to_string();
    }

    if journey.raw_llm_number_count == 0 {
        return "LLM_Output_NoNumbersFound_AllAttempts".to_string();
    }

    // Raw numbers existed but none survived consolidation and eligibility
    if signals.eligible_consolidated_count == 0 {
        return "LLM_Output_NumbersFound_NoneRelevant_AllAttempts".to_string();
    }

    "Unknown_Processing_Gap_NoContact".to_string()
}

/// Derive the domain-level outcome reason.
pub fn derive_domain_outcome(journey: &DomainJourney, eligible_count: usize) -> String {
    if eligible_count >= 1 {
        return format!("{}_ForDomain", CONTACT_EXTRACTED);
    }

    let overall = journey.overall_scraper_status();
    if overall != Some(ScraperStatus::Success) {
        return scraping_failure_reason(journey, overall, "_ForDomain");
    }

    if journey.total_pages_scraped > 0
        && !journey.pages_by_type.keys().any(|t| t.is_relevant())
    {
        return "Scraping_Success_NoRelevantContentPagesFound_ForDomain".to_string();
    }

    if !journey.regex_found_any_candidate {
        return "Canonical_NoRegexCandidatesFound_ForDomain".to_string();
    }

    if journey.llm_error_encountered && journey.raw_llm_number_count == 0 {
        return "LLM_Processing_Error_AllAttempts_ForDomain".to_string();
    }

    if journey.raw_llm_number_count == 0 {
        return "LLM_Output_NoNumbersFound_AllAttempts_ForDomain".to_string();
    }

    if eligible_count == 0 {
        return "LLM_Output_NumbersFound_NoneRelevant_AllAttempts_ForDomain".to_string();
    }

    "Unknown_Processing_Gap_NoContact_ForDomain".to_string()
}

/// Classify a failed crawl from its per-pathful statuses: homogeneous
/// error classes get their named reason, mixed failures a generic one.
fn scraping_failure_reason(
    journey: &DomainJourney,
    overall: Option<ScraperStatus>,
    suffix: &str,
) -> String {
    let statuses: Vec<ScraperStatus> = journey.pathful_statuses.values().copied().collect();
    if statuses.is_empty() {
        return format!("Scraping_AllAttemptsFailed_Network{}", suffix);
    }
    if statuses.iter().all(|s| s.is_network_error()) {
        return format!("Scraping_AllAttemptsFailed_Network{}", suffix);
    }
    if statuses.iter().all(|s| s.is_access_denied()) {
        return format!("Scraping_AllAttemptsFailed_AccessDenied{}", suffix);
    }
    if statuses.iter().all(|s| s.is_content_not_found()) {
        return format!("Scraping_ContentNotFound_AllAttempts{}", suffix);
    }
    let status_name = overall.map(|s| s.as_str()).unwrap_or("Unknown");
    format!("ScrapingFailed_Canonical_{}{}", status_name, suffix)
}

/// Fixed mapping from outcome reasons to fault categories.
pub fn fault_category(reason: &str) -> &'static str {
    let base = reason.strip_suffix("_ForDomain").unwrap_or(reason);
    match base {
        CONTACT_EXTRACTED => "N/A",
        "Input_URL_Invalid" | "Input_URL_UnsupportedScheme" => "Input Data Issue",
        "Pipeline_Skipped_MaxRedirects_ForInputURL" => "Website Issue",
        "Scraping_AllAttemptsFailed_Network"
        | "Scraping_AllAttemptsFailed_AccessDenied"
        | "Scraping_ContentNotFound_AllAttempts"
        | "Scraping_Success_NoRelevantContentPagesFound" => "Website Issue",
        "Canonical_Duplicate_SkippedProcessing" | "Canonical_NoRegexCandidatesFound" => {
            "Pipeline Logic/Configuration"
        }
        "LLM_Output_NoNumbersFound_AllAttempts"
        | "LLM_Output_NumbersFound_NoneRelevant_AllAttempts"
        | "LLM_Processing_Error_AllAttempts" => "LLM Issue",
        "DataConsolidation_Error_ForRow" => "Pipeline Error",
        "Unknown_NoCanonicalURLDetermined" | "Unknown_Processing_Gap_NoContact" => "Unknown",
        other if other.starts_with("ScrapingFailed_Canonical_") => "Website Issue",
        other if other.starts_with("RowProcessing_") => "Pipeline Error",
        _ => "Unknown",
    }
}
