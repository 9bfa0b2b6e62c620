//! Per-domain processing journey.
//!
//! One `DomainJourney` accumulates everything observed about a base
//! canonical domain during pass 1: which input rows led to it, which
//! pathful URLs were attempted and how they ended, what was scraped, and
//! how the regex, model, and consolidation stages went. Pass 2 reads the
//! journeys; it never mutates them.

use std::collections::{BTreeMap, BTreeSet};

use crate::schemas::{CompanyContactDetails, PageType, ScraperStatus};

#[derive(Debug, Clone)]
pub struct DomainJourney {
    pub base_url: String,
    pub input_row_ids: BTreeSet<usize>,
    pub input_company_names: BTreeSet<String>,
    pub input_given_urls: BTreeSet<String>,
    /// Per-pathful terminal statuses; the key set doubles as the list of
    /// pathful URLs attempted.
    pub pathful_statuses: BTreeMap<String, ScraperStatus>,
    pub pages_by_type: BTreeMap<PageType, usize>,
    pub total_pages_scraped: usize,
    pub regex_found_any_candidate: bool,
    pub llm_call_made: bool,
    pub llm_error_encountered: bool,
    pub llm_error_messages: Vec<String>,
    pub raw_llm_number_count: usize,
    pub consolidated_number_count: usize,
    pub consolidated_type_counts: BTreeMap<String, usize>,
    /// True when consolidation received raw items but produced nothing.
    pub consolidation_filtered_all_out: bool,
    pub final_outcome_reason: String,
    pub primary_fault_category: String,
}

impl DomainJourney {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            input_row_ids: BTreeSet::new(),
            input_company_names: BTreeSet::new(),
            input_given_urls: BTreeSet::new(),
            pathful_statuses: BTreeMap::new(),
            pages_by_type: BTreeMap::new(),
            total_pages_scraped: 0,
            regex_found_any_candidate: false,
            llm_call_made: false,
            llm_error_encountered: false,
            llm_error_messages: Vec::new(),
            raw_llm_number_count: 0,
            consolidated_number_count: 0,
            consolidated_type_counts: BTreeMap::new(),
            consolidation_filtered_all_out: false,
            final_outcome_reason: String::new(),
            primary_fault_category: String::new(),
        }
    }

    pub fn record_input_row(&mut self, row_id: usize, company_name: &str, given_url: Option<&str>) {
        self.input_row_ids.insert(row_id);
        self.input_company_names.insert(company_name.to_string());
        if let Some(url) = given_url {
            self.input_given_urls.insert(url.to_string());
        }
    }

    /// Record a pathful fetch attempt. A later, better status for the same
    /// pathful wins (fallback re-seeds can upgrade an earlier failure).
    pub fn record_pathful_attempt(&mut self, pathful_url: &str, status: ScraperStatus) {
        self.pathful_statuses
            .entry(pathful_url.to_string())
            .and_modify(|existing| {
                if status.rank() < existing.rank() {
                    *existing = status;
                }
            })
            .or_insert(status);
    }

    pub fn record_scraped_page(&mut self, page_type: PageType) {
        *self.pages_by_type.entry(page_type).or_insert(0) += 1;
        self.total_pages_scraped += 1;
    }

    pub fn record_regex_outcome(&mut self, found_any: bool) {
        // Sticky: any pathful with candidates marks the domain
        self.regex_found_any_candidate |= found_any;
    }

    pub fn record_llm_call(&mut self) {
        self.llm_call_made = true;
    }

    pub fn record_llm_error(&mut self, message: String) {
        self.llm_error_encountered = true;
        self.llm_error_messages.push(message);
    }

    pub fn add_raw_llm_numbers(&mut self, count: usize) {
        self.raw_llm_number_count += count;
    }

    pub fn record_consolidation(&mut self, details: &CompanyContactDetails) {
        self.consolidated_number_count = details.numbers.len();
        self.consolidation_filtered_all_out = details.filtered_all_out;
        self.consolidated_type_counts.clear();
        for number in &details.numbers {
            for source in &number.sources {
                *self
                    .consolidated_type_counts
                    .entry(source.number_type.clone())
                    .or_insert(0) += 1;
            }
        }
    }

    /// Best status across all attempted pathfuls under this base.
    pub fn overall_scraper_status(&self) -> Option<ScraperStatus> {
        self.pathful_statuses
            .values()
            .copied()
            .min_by_key(|s| s.rank())
    }

    pub fn pathful_urls_attempted(&self) -> Vec<&str> {
        self.pathful_statuses.keys().map(|s| s.as_str()).collect()
    }
}
