//! Configuration management for contactfinder
//!
//! All configuration is loaded from `./config/contactfinder.toml`.
//! Defaults live in the bundled config template; CLI flags may override
//! individual values after loading.

use serde::Deserialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration file path relative to working directory
pub const CONFIG_PATH: &str = "./config/contactfinder.toml";

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = include_str!("../config/contactfinder.toml");

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found at {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Configuration field '{field}' cannot be empty")]
    EmptyRequired { field: String },

    #[error("Invalid value for '{field}': {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub phone: PhoneConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Input table configuration
#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    /// Path to the input CSV file
    #[serde(default = "default_input_file_path")]
    pub file_path: String,
    /// Row range to process: "a-b", "a-", "-b", "a", or empty for all rows
    #[serde(default)]
    pub row_range: String,
    /// Named column-mapping profile for the input file
    #[serde(default = "default_profile_name")]
    pub profile_name: String,
    /// Consecutive all-blank rows that terminate reading on open-ended ranges
    #[serde(default = "default_consecutive_empty_rows_to_stop")]
    pub consecutive_empty_rows_to_stop: usize,
}

fn default_input_file_path() -> String {
    "data_to_be_inputed.csv".to_string()
}
fn default_profile_name() -> String {
    "default".to_string()
}
fn default_consecutive_empty_rows_to_stop() -> usize {
    3
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            file_path: default_input_file_path(),
            row_range: String::new(),
            profile_name: default_profile_name(),
            consecutive_empty_rows_to_stop: default_consecutive_empty_rows_to_stop(),
        }
    }
}

/// Output layout configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Base directory under which each run creates `{run_id}/`
    #[serde(default = "default_output_base_dir")]
    pub base_dir: String,
    /// File name template for the pipeline summary report; `{run_id}` is substituted
    #[serde(default = "default_summary_file_name_template")]
    pub summary_file_name_template: String,
    /// Maximum length of the sanitized company-name part of artifact filenames
    #[serde(default = "default_filename_company_name_max_len")]
    pub filename_company_name_max_len: usize,
}

fn default_output_base_dir() -> String {
    "output_data".to_string()
}
fn default_summary_file_name_template() -> String {
    "pipeline_summary_report_{run_id}.csv".to_string()
}
fn default_filename_company_name_max_len() -> usize {
    25
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            base_dir: default_output_base_dir(),
            summary_file_name_template: default_summary_file_name_template(),
            filename_company_name_max_len: default_filename_company_name_max_len(),
        }
    }
}

/// Scraper and link-scoring configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ScraperConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Per-page operation timeout in milliseconds
    #[serde(default = "default_page_timeout_ms")]
    pub page_timeout_ms: u64,
    /// Navigation timeout in milliseconds
    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,
    /// Network-idle settle timeout in milliseconds; 0 disables the settle wait
    #[serde(default = "default_network_idle_timeout_ms")]
    pub network_idle_timeout_ms: u64,
    /// Transient-failure retries per fetch
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Fixed delay between fetch retries, in seconds
    #[serde(default = "default_retry_delay_seconds")]
    pub retry_delay_seconds: u64,
    /// General keywords gating internal links into consideration
    #[serde(default = "default_target_link_keywords")]
    pub target_link_keywords: Vec<String>,
    /// Keywords scoring 100 when present as an exact path segment
    #[serde(default = "default_critical_priority_keywords")]
    pub critical_priority_keywords: Vec<String>,
    /// Keywords scoring 90 when present as an exact path segment
    #[serde(default = "default_high_priority_keywords")]
    pub high_priority_keywords: Vec<String>,
    /// Segment count beyond which priority scores take a depth penalty
    #[serde(default = "default_max_keyword_path_segments")]
    pub max_keyword_path_segments: usize,
    /// Path substrings that hard-exclude a link
    #[serde(default = "default_exclude_link_path_patterns")]
    pub exclude_link_path_patterns: Vec<String>,
    /// Page budget per domain; 0 means unlimited
    #[serde(default = "default_max_pages_per_domain")]
    pub max_pages_per_domain: usize,
    /// Minimum link score required to enter the crawl queue
    #[serde(default = "default_min_score_to_queue")]
    pub min_score_to_queue: i32,
    /// Score at or above which a link may bypass the page budget
    #[serde(default = "default_score_threshold_for_limit_bypass")]
    pub score_threshold_for_limit_bypass: i32,
    /// Cap on budget-bypassing fetches once the page budget is reached
    #[serde(default = "default_max_high_priority_pages_after_limit")]
    pub max_high_priority_pages_after_limit: usize,
    /// Depth limit for following internal links from the seed
    #[serde(default = "default_max_depth_internal_links")]
    pub max_depth_internal_links: usize,
    /// Ordered TLDs to probe when an input host lacks one
    #[serde(default = "default_url_probing_tlds")]
    pub url_probing_tlds: Vec<String>,
    /// Enable hyphen-simplification / TLD-swap fallbacks on seed DNS errors
    #[serde(default = "default_enable_dns_error_fallbacks")]
    pub enable_dns_error_fallbacks: bool,
    #[serde(default = "default_respect_robots_txt")]
    pub respect_robots_txt: bool,
    #[serde(default = "default_robots_txt_user_agent")]
    pub robots_txt_user_agent: String,
    /// Keyword lists for page-type classification, matched in order
    #[serde(default = "default_page_type_keywords_contact")]
    pub page_type_keywords_contact: Vec<String>,
    #[serde(default = "default_page_type_keywords_imprint")]
    pub page_type_keywords_imprint: Vec<String>,
    #[serde(default = "default_page_type_keywords_legal")]
    pub page_type_keywords_legal: Vec<String>,
    #[serde(default = "default_page_type_keywords_general")]
    pub page_type_keywords_general: Vec<String>,
    /// Concurrent domain workers in pass 1
    #[serde(default = "default_max_concurrent_domains")]
    pub max_concurrent_domains: usize,
    /// Total context window around a regex match, split evenly per side
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}
fn default_page_timeout_ms() -> u64 {
    30_000
}
fn default_navigation_timeout_ms() -> u64 {
    60_000
}
fn default_network_idle_timeout_ms() -> u64 {
    5_000
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_delay_seconds() -> u64 {
    5
}
fn default_target_link_keywords() -> Vec<String> {
    keyword_list("contact,about,support,impressum,kontakt,legal,privacy,terms,hilfe,datenschutz,ueber-uns")
}
fn default_critical_priority_keywords() -> Vec<String> {
    keyword_list("impressum,kontakt,contact,imprint")
}
fn default_high_priority_keywords() -> Vec<String> {
    keyword_list("legal,privacy,terms,datenschutz,ueber-uns,about,about-us")
}
fn default_max_keyword_path_segments() -> usize {
    3
}
fn default_exclude_link_path_patterns() -> Vec<String> {
    keyword_list("/media/,/blog/,/wp-content/,/video/,/hilfe-video/")
}
fn default_max_pages_per_domain() -> usize {
    20
}
fn default_min_score_to_queue() -> i32 {
    40
}
fn default_score_threshold_for_limit_bypass() -> i32 {
    80
}
fn default_max_high_priority_pages_after_limit() -> usize {
    5
}
fn default_max_depth_internal_links() -> usize {
    1
}
fn default_url_probing_tlds() -> Vec<String> {
    keyword_list("de,com,at,ch,net,org")
}
fn default_enable_dns_error_fallbacks() -> bool {
    true
}
fn default_respect_robots_txt() -> bool {
    true
}
fn default_robots_txt_user_agent() -> String {
    "*".to_string()
}
fn default_page_type_keywords_contact() -> Vec<String> {
    keyword_list("contact,kontakt,contacts")
}
fn default_page_type_keywords_imprint() -> Vec<String> {
    keyword_list("imprint,impressum")
}
fn default_page_type_keywords_legal() -> Vec<String> {
    keyword_list("legal,privacy,datenschutz,terms,agb")
}
fn default_page_type_keywords_general() -> Vec<String> {
    keyword_list("about,ueber-uns,about-us,services,leistungen")
}
fn default_max_concurrent_domains() -> usize {
    4
}
fn default_snippet_chars() -> usize {
    300
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            page_timeout_ms: default_page_timeout_ms(),
            navigation_timeout_ms: default_navigation_timeout_ms(),
            network_idle_timeout_ms: default_network_idle_timeout_ms(),
            max_retries: default_max_retries(),
            retry_delay_seconds: default_retry_delay_seconds(),
            target_link_keywords: default_target_link_keywords(),
            critical_priority_keywords: default_critical_priority_keywords(),
            high_priority_keywords: default_high_priority_keywords(),
            max_keyword_path_segments: default_max_keyword_path_segments(),
            exclude_link_path_patterns: default_exclude_link_path_patterns(),
            max_pages_per_domain: default_max_pages_per_domain(),
            min_score_to_queue: default_min_score_to_queue(),
            score_threshold_for_limit_bypass: default_score_threshold_for_limit_bypass(),
            max_high_priority_pages_after_limit: default_max_high_priority_pages_after_limit(),
            max_depth_internal_links: default_max_depth_internal_links(),
            url_probing_tlds: default_url_probing_tlds(),
            enable_dns_error_fallbacks: default_enable_dns_error_fallbacks(),
            respect_robots_txt: default_respect_robots_txt(),
            robots_txt_user_agent: default_robots_txt_user_agent(),
            page_type_keywords_contact: default_page_type_keywords_contact(),
            page_type_keywords_imprint: default_page_type_keywords_imprint(),
            page_type_keywords_legal: default_page_type_keywords_legal(),
            page_type_keywords_general: default_page_type_keywords_general(),
            max_concurrent_domains: default_max_concurrent_domains(),
            snippet_chars: default_snippet_chars(),
        }
    }
}

/// Language-model extraction configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// API key; falls back to the CONTACTFINDER_LLM_API_KEY environment variable
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_llm_model_name")]
    pub model_name: String,
    #[serde(default = "default_llm_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,
    /// Path to the prompt template file
    #[serde(default = "default_llm_prompt_template_path")]
    pub prompt_template_path: String,
    /// Targeted re-send attempts for identity-mismatched items
    #[serde(default = "default_llm_max_retries_on_number_mismatch")]
    pub max_retries_on_number_mismatch: u32,
    /// Cap on identical (digits, page) candidate occurrences sent to the model
    #[serde(default = "default_max_identical_numbers_per_page")]
    pub max_identical_numbers_per_page: usize,
    /// Candidates per chunk
    #[serde(default = "default_llm_candidate_chunk_size")]
    pub candidate_chunk_size: usize,
    /// Chunk budget per base canonical domain; 0 disables model calls
    #[serde(default = "default_llm_max_chunks_per_url")]
    pub max_chunks_per_url: usize,
}

fn default_llm_model_name() -> String {
    "gemini-1.5-pro-latest".to_string()
}
fn default_llm_temperature() -> f32 {
    0.5
}
fn default_llm_max_tokens() -> u32 {
    8192
}
fn default_llm_prompt_template_path() -> String {
    "prompts/phone_extraction_v1.txt".to_string()
}
fn default_llm_max_retries_on_number_mismatch() -> u32 {
    1
}
fn default_max_identical_numbers_per_page() -> usize {
    3
}
fn default_llm_candidate_chunk_size() -> usize {
    10
}
fn default_llm_max_chunks_per_url() -> usize {
    10
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model_name: default_llm_model_name(),
            temperature: default_llm_temperature(),
            max_tokens: default_llm_max_tokens(),
            prompt_template_path: default_llm_prompt_template_path(),
            max_retries_on_number_mismatch: default_llm_max_retries_on_number_mismatch(),
            max_identical_numbers_per_page: default_max_identical_numbers_per_page(),
            candidate_chunk_size: default_llm_candidate_chunk_size(),
            max_chunks_per_url: default_llm_max_chunks_per_url(),
        }
    }
}

/// Phone number normalization configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PhoneConfig {
    /// Region hints tried in order when parsing extracted numbers
    #[serde(default = "default_target_country_codes")]
    pub target_country_codes: Vec<String>,
    /// Fallback region when every hint fails
    #[serde(default = "default_region_code")]
    pub default_region_code: String,
}

fn default_target_country_codes() -> Vec<String> {
    vec!["DE".to_string(), "CH".to_string(), "AT".to_string()]
}
fn default_region_code() -> String {
    "DE".to_string()
}

impl Default for PhoneConfig {
    fn default() -> Self {
        Self {
            target_country_codes: default_target_country_codes(),
            default_region_code: default_region_code(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Level for the run log file
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Level for console output
    #[serde(default = "default_console_log_level")]
    pub console_log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_console_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            console_log_level: default_console_log_level(),
        }
    }
}

fn keyword_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parsed form of the `row_range` config value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowRange {
    All,
    /// 1-indexed inclusive bounds
    Bounded(usize, usize),
    From(usize),
    First(usize),
}

impl RowRange {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        if raw.is_empty() || raw == "0" {
            return Ok(RowRange::All);
        }
        if let Some((start_str, end_str)) = raw.split_once('-') {
            let start_str = start_str.trim();
            let end_str = end_str.trim();
            let start: Option<usize> = start_str.parse().ok();
            let end: Option<usize> = end_str.parse().ok();
            return match (start, end) {
                (Some(a), Some(b)) if a > 0 && b >= a => Ok(RowRange::Bounded(a, b)),
                (Some(a), None) if a > 0 && end_str.is_empty() => Ok(RowRange::From(a)),
                (None, Some(b)) if b > 0 && start_str.is_empty() => Ok(RowRange::First(b)),
                _ => Err(ConfigError::InvalidValue {
                    field: "input.row_range".to_string(),
                    value: raw.to_string(),
                    reason: "expected a-b, a-, -b, a, or empty".to_string(),
                }),
            };
        }
        match raw.parse::<usize>() {
            Ok(n) if n > 0 => Ok(RowRange::First(n)),
            _ => Err(ConfigError::InvalidValue {
                field: "input.row_range".to_string(),
                value: raw.to_string(),
                reason: "expected a-b, a-, -b, a, or empty".to_string(),
            }),
        }
    }

    /// Whether a 1-indexed row falls inside the range.
    pub fn contains(&self, row: usize) -> bool {
        match self {
            RowRange::All => true,
            RowRange::Bounded(a, b) => row >= *a && row <= *b,
            RowRange::From(a) => row >= *a,
            RowRange::First(n) => row <= *n,
        }
    }

    /// Open-ended ranges rely on the consecutive-empty-row stop heuristic.
    pub fn is_open_ended(&self) -> bool {
        matches!(self, RowRange::All | RowRange::From(_))
    }

    /// Last row of a closed range, if any.
    pub fn upper_bound(&self) -> Option<usize> {
        match self {
            RowRange::Bounded(_, b) => Some(*b),
            RowRange::First(n) => Some(*n),
            _ => None,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(Path::new(CONFIG_PATH))
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scraper.user_agent.is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "scraper.user_agent".to_string(),
            });
        }
        if self.input.file_path.is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "input.file_path".to_string(),
            });
        }
        if self.output.base_dir.is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "output.base_dir".to_string(),
            });
        }
        RowRange::parse(&self.input.row_range)?;

        if self.llm.candidate_chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "llm.candidate_chunk_size".to_string(),
                value: "0".to_string(),
                reason: "chunk size must be at least 1".to_string(),
            });
        }
        if self.phone.default_region_code.len() != 2 {
            return Err(ConfigError::InvalidValue {
                field: "phone.default_region_code".to_string(),
                value: self.phone.default_region_code.clone(),
                reason: "expected an ISO 3166-1 alpha-2 code".to_string(),
            });
        }
        for code in &self.phone.target_country_codes {
            if code.len() != 2 {
                return Err(ConfigError::InvalidValue {
                    field: "phone.target_country_codes".to_string(),
                    value: code.clone(),
                    reason: "expected ISO 3166-1 alpha-2 codes".to_string(),
                });
            }
        }
        if self.scraper.max_concurrent_domains == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scraper.max_concurrent_domains".to_string(),
                value: "0".to_string(),
                reason: "at least one domain worker is required".to_string(),
            });
        }
        Ok(())
    }

    /// Resolved API key: config value first, environment variable second.
    pub fn llm_api_key(&self) -> Option<String> {
        self.llm
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("CONTACTFINDER_LLM_API_KEY").ok())
    }

    pub fn row_range(&self) -> RowRange {
        // validate() already rejected malformed values
        RowRange::parse(&self.input.row_range).unwrap_or(RowRange::All)
    }

    /// Create default configuration file at the standard location
    pub fn create_default_config() -> Result<PathBuf, ConfigError> {
        let path = Path::new(CONFIG_PATH);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::File::create(path)?;
        file.write_all(DEFAULT_CONFIG.as_bytes())?;

        Ok(path.to_path_buf())
    }

    /// Check if stdin is a TTY (interactive terminal)
    pub fn is_interactive() -> bool {
        atty::is(atty::Stream::Stdin)
    }

    /// Prompt user to create default config (only in interactive mode)
    pub fn prompt_create_config() -> Result<Option<PathBuf>, ConfigError> {
        if !Self::is_interactive() {
            return Ok(None);
        }

        print!("Configuration file not found. Create default config? [Y/n] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim().to_lowercase();

        if input.is_empty() || input == "y" || input == "yes" {
            let path = Self::create_default_config()?;
            Ok(Some(path))
        } else {
            Ok(None)
        }
    }
}
