//! Input table loading.
//!
//! Reads the CSV of companies, maps aliased headers onto the canonical
//! column names, applies the configured row range, stops at runs of blank
//! rows on open-ended ranges, and normalizes any given phone number at
//! load time.

use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::consolidator::normalize_to_e164;
use crate::schemas::{GivenPhone, InputRow};

/// Header aliases accepted for each canonical column, compared
/// case-insensitively.
const COMPANY_ALIASES: [&str; 3] = ["companyname", "unternehmen", "company"];
const URL_ALIASES: [&str; 4] = ["givenurl", "webseite", "website", "url"];
const PHONE_ALIASES: [&str; 4] = ["givenphonenumber", "telefonnummer", "phone", "phonenumber"];
const DESCRIPTION_ALIASES: [&str; 2] = ["description", "beschreibung"];
const COUNTRY_ALIASES: [&str; 2] = ["targetcountrycodes", "countrycodes"];

#[derive(Debug, Default)]
struct ColumnMap {
    company: Option<usize>,
    url: Option<usize>,
    phone: Option<usize>,
    description: Option<usize>,
    countries: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &csv::StringRecord) -> Self {
        let mut map = Self::default();
        for (idx, raw) in headers.iter().enumerate() {
            let name = raw.trim().to_lowercase().replace([' ', '_', '-'], "");
            if map.company.is_none() && COMPANY_ALIASES.contains(&name.as_str()) {
                map.company = Some(idx);
            } else if map.url.is_none() && URL_ALIASES.contains(&name.as_str()) {
                map.url = Some(idx);
            } else if map.phone.is_none() && PHONE_ALIASES.contains(&name.as_str()) {
                map.phone = Some(idx);
            } else if map.description.is_none() && DESCRIPTION_ALIASES.contains(&name.as_str()) {
                map.description = Some(idx);
            } else if map.countries.is_none() && COUNTRY_ALIASES.contains(&name.as_str()) {
                map.countries = Some(idx);
            }
        }
        map
    }

    fn cell<'r>(&self, record: &'r csv::StringRecord, idx: Option<usize>) -> Option<&'r str> {
        idx.and_then(|i| record.get(i))
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Load and preprocess the configured input file.
pub fn load_input_rows(path: &Path, config: &AppConfig) -> Result<Vec<InputRow>> {
    info!(
        "Loading input table from {} (profile '{}')",
        path.display(),
        config.input.profile_name
    );
    let file = std::fs::File::open(path)
        .with_context(|| format!("cannot open input file {}", path.display()))?;
    parse_input_rows(file, config)
}

/// Parse rows from any reader; separated from file opening for tests.
pub fn parse_input_rows<R: Read>(reader: R, config: &AppConfig) -> Result<Vec<InputRow>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader
        .headers()
        .context("cannot read input header row")?
        .clone();
    let columns = ColumnMap::from_headers(&headers);
    if columns.company.is_none() && columns.url.is_none() {
        anyhow::bail!(
            "input header row has neither a company nor a URL column (headers: {:?})",
            headers
        );
    }

    let range = config.row_range();
    let stop_after_blanks = config.input.consecutive_empty_rows_to_stop;
    let default_countries = config.phone.target_country_codes.clone();

    let mut rows = Vec::new();
    let mut consecutive_blank = 0usize;

    for (index, record) in csv_reader.records().enumerate() {
        let row_id = index + 1;
        if let Some(upper) = range.upper_bound() {
            if row_id > upper {
                debug!("Row range upper bound {} reached, stopping read", upper);
                break;
            }
        }

        let record = match record {
            Ok(r) => r,
            Err(e) => {
                warn!("Skipping malformed input row {}: {}", row_id, e);
                continue;
            }
        };

        let is_blank = record.iter().all(|cell| cell.trim().is_empty());
        if is_blank {
            consecutive_blank += 1;
            if range.is_open_ended() && consecutive_blank >= stop_after_blanks {
                info!(
                    "{} consecutive blank rows at row {}, stopping read",
                    consecutive_blank, row_id
                );
                break;
            }
            continue;
        }
        consecutive_blank = 0;

        if !range.contains(row_id) {
            continue;
        }

        let company_name = columns
            .cell(&record, columns.company)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Row_{}", row_id));
        let given_url = columns.cell(&record, columns.url).map(str::to_string);
        let given_phone = columns.cell(&record, columns.phone).map(str::to_string);
        let description = columns.cell(&record, columns.description).map(str::to_string);

        let target_country_codes = columns
            .cell(&record, columns.countries)
            .map(|raw| {
                raw.split(',')
                    .map(|c| c.trim().to_uppercase())
                    .filter(|c| !c.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|codes| !codes.is_empty())
            .unwrap_or_else(|| default_countries.clone());

        let normalized_given_phone = match &given_phone {
            None => GivenPhone::NotProvided,
            Some(phone) => match normalize_to_e164(
                phone,
                &target_country_codes,
                &config.phone.default_region_code,
            ) {
                Some(e164) => GivenPhone::Normalized(e164),
                None => GivenPhone::InvalidFormat(phone.clone()),
            },
        };

        rows.push(InputRow {
            row_id,
            company_name,
            given_url,
            given_phone,
            normalized_given_phone,
            description,
            target_country_codes,
        });
    }

    info!("Loaded {} input row(s)", rows.len());
    Ok(rows)
}
