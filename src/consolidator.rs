//! Consolidation of raw model outputs into the per-domain contact set.
//!
//! Numbers are normalized to E.164 with the row's country hints, then
//! deduplicated per base canonical domain. Each unique number carries its
//! aggregated sources and the best classification seen for it; the final
//! list is sorted by classification priority, then type priority.

use phonenumber::Mode;
use tracing::{debug, warn};

use crate::schemas::{
    CompanyContactDetails, ConsolidatedNumber, ConsolidatedSource, PhoneNumberLlmOutput,
};

/// Types that disqualify a consolidated number from the contact-focused
/// reports. The full extractions report still carries them.
pub const EXCLUDED_TYPES_FOR_CONTACT_REPORTS: [&str; 5] =
    ["Unknown", "Fax", "Mobile", "Date", "ID"];

/// Classification precedence; lower sorts first.
pub fn classification_priority(classification: &str) -> u8 {
    match classification {
        "Primary" => 1,
        "Secondary" => 2,
        "Support" => 3,
        "Low-Relevance" | "Low Relevance" => 4,
        "Non-Business" => 5,
        c if c.starts_with("Error_") => 6,
        _ => 99,
    }
}

/// Type precedence used to break classification ties; lower sorts first.
pub fn type_priority(number_type: &str) -> u8 {
    match number_type {
        "Main Line" | "Mainline" => 1,
        "Sales" => 2,
        "Customer Service" => 3,
        "Support" => 4,
        "Info-Hotline" => 5,
        "Non-Priority-Country Contact" => 80,
        "Unknown" => 99,
        _ => 50,
    }
}

/// Normalize a phone number string to E.164, trying each country hint in
/// order and falling back to the default region. None when no region
/// yields a valid number.
pub fn normalize_to_e164(
    number: &str,
    country_hints: &[String],
    default_region: &str,
) -> Option<String> {
    if number.trim().is_empty() {
        return None;
    }
    for region in country_hints.iter().map(|s| s.as_str()).chain([default_region]) {
        let Ok(id) = region.to_uppercase().parse::<phonenumber::country::Id>() else {
            debug!("Unrecognized region code '{}'", region);
            continue;
        };
        match phonenumber::parse(Some(id), number) {
            Ok(parsed) if phonenumber::is_valid(&parsed) => {
                return Some(parsed.format().mode(Mode::E164).to_string());
            }
            Ok(_) => continue,
            Err(_) => continue,
        }
    }
    None
}

/// Merge the union of one base canonical domain's raw model outputs into
/// its deduplicated, sorted contact set.
pub fn consolidate(
    items: &[PhoneNumberLlmOutput],
    base_url: &str,
    country_hints: &[String],
    default_region: &str,
) -> CompanyContactDetails {
    let mut numbers: Vec<ConsolidatedNumber> = Vec::new();
    let mut dropped = 0usize;

    for item in items {
        if item.number.trim().is_empty() || item.source_url.is_empty() {
            warn!("Skipping model item with missing number or source: {:?}", item);
            dropped += 1;
            continue;
        }
        let Some(e164) = normalize_to_e164(&item.number, country_hints, default_region) else {
            warn!(
                "Could not normalize '{}' to E.164 for {}; dropping",
                item.number, base_url
            );
            dropped += 1;
            continue;
        };

        match numbers.iter_mut().find(|n| n.number == e164) {
            None => {
                numbers.push(ConsolidatedNumber {
                    number: e164,
                    classification: item.classification.clone(),
                    sources: vec![ConsolidatedSource {
                        source_url: item.source_url.clone(),
                        number_type: item.number_type.clone(),
                        company_name: item.company_name.clone(),
                        occurrence_count: 1,
                    }],
                });
            }
            Some(existing) => {
                match existing.sources.iter_mut().find(|s| {
                    s.source_url == item.source_url && s.company_name == item.company_name
                }) {
                    Some(source) => source.occurrence_count += 1,
                    None => existing.sources.push(ConsolidatedSource {
                        source_url: item.source_url.clone(),
                        number_type: item.number_type.clone(),
                        company_name: item.company_name.clone(),
                        occurrence_count: 1,
                    }),
                }

                // Keep the strongest (classification, type) pair seen
                let incoming = (
                    classification_priority(&item.classification),
                    type_priority(&item.number_type),
                );
                let current = (
                    classification_priority(&existing.classification),
                    best_type_priority(existing),
                );
                if incoming < current {
                    existing.classification = item.classification.clone();
                }
            }
        }
    }

    numbers.sort_by_key(|n| {
        (
            classification_priority(&n.classification),
            best_type_priority(n),
            n.number.clone(),
        )
    });

    let filtered_all_out = !items.is_empty() && numbers.is_empty();
    if filtered_all_out {
        debug!(
            "All {} raw item(s) for {} were filtered during consolidation",
            items.len(),
            base_url
        );
    } else if dropped > 0 {
        debug!("{} raw item(s) dropped while consolidating {}", dropped, base_url);
    }

    CompanyContactDetails {
        base_url: base_url.to_string(),
        numbers,
        filtered_all_out,
    }
}

fn best_type_priority(number: &ConsolidatedNumber) -> u8 {
    number
        .sources
        .iter()
        .map(|s| type_priority(&s.number_type))
        .min()
        .unwrap_or(99)
}

/// The numbers that qualify for the contact-focused reports: business
/// classifications only, and no source typed as an excluded kind.
pub fn eligible_numbers(details: &CompanyContactDetails) -> Vec<&ConsolidatedNumber> {
    details
        .numbers
        .iter()
        .filter(|n| {
            n.classification != "Non-Business"
                && !n.classification.starts_with("Error_")
                && !n.sources.iter().any(|s| {
                    EXCLUDED_TYPES_FOR_CONTACT_REPORTS.contains(&s.number_type.as_str())
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(number: &str, number_type: &str, classification: &str, url: &str) -> PhoneNumberLlmOutput {
        PhoneNumberLlmOutput {
            number: number.to_string(),
            number_type: number_type.to_string(),
            classification: classification.to_string(),
            source_url: url.to_string(),
            company_name: "ExampleCorp".to_string(),
        }
    }

    const HINTS: &[String] = &[];

    #[test]
    fn test_e164_normalization_with_default_region() {
        assert_eq!(
            normalize_to_e164("030 12345678", HINTS, "DE").as_deref(),
            Some("+493012345678")
        );
        assert_eq!(
            normalize_to_e164("+49 30 12345678", HINTS, "DE").as_deref(),
            Some("+493012345678")
        );
    }

    #[test]
    fn test_e164_hint_order_wins_over_default() {
        // A Swiss regional number parses under CH, not DE
        let hints = vec!["CH".to_string()];
        assert_eq!(
            normalize_to_e164("044 668 18 00", &hints, "DE").as_deref(),
            Some("+41446681800")
        );
    }

    #[test]
    fn test_unparseable_number_is_dropped() {
        assert_eq!(normalize_to_e164("12", HINTS, "DE"), None);
        assert_eq!(normalize_to_e164("", HINTS, "DE"), None);

        let details = consolidate(&[item("12", "Main Line", "Primary", "http://x.de/a")], "http://x.de", HINTS, "DE");
        assert!(details.numbers.is_empty());
        assert!(details.filtered_all_out);
    }

    #[test]
    fn test_duplicate_numbers_merge_sources() {
        let items = vec![
            item("+49 30 12345678", "Main Line", "Secondary", "http://x.de/kontakt"),
            item("030 12345678", "Sales", "Primary", "http://x.de/impressum"),
        ];
        let details = consolidate(&items, "http://x.de", HINTS, "DE");
        assert_eq!(details.numbers.len(), 1);
        let number = &details.numbers[0];
        assert_eq!(number.number, "+493012345678");
        assert_eq!(number.sources.len(), 2);
        // The stronger classification wins the merge
        assert_eq!(number.classification, "Primary");
    }

    #[test]
    fn test_same_source_same_company_counts_occurrences() {
        let items = vec![
            item("+49 30 12345678", "Main Line", "Primary", "http://x.de/kontakt"),
            item("+49 30 12345678", "Main Line", "Primary", "http://x.de/kontakt"),
        ];
        let details = consolidate(&items, "http://x.de", HINTS, "DE");
        assert_eq!(details.numbers.len(), 1);
        assert_eq!(details.numbers[0].sources.len(), 1);
        assert_eq!(details.numbers[0].sources[0].occurrence_count, 2);
    }

    #[test]
    fn test_sort_by_classification_then_type() {
        let items = vec![
            item("+49 30 1111111", "Support", "Support", "http://x.de/a"),
            item("+49 30 2222222", "Main Line", "Primary", "http://x.de/b"),
            item("+49 30 3333333", "Sales", "Primary", "http://x.de/c"),
        ];
        let details = consolidate(&items, "http://x.de", HINTS, "DE");
        let order: Vec<&str> = details.numbers.iter().map(|n| n.number.as_str()).collect();
        assert_eq!(order, vec!["+49302222222", "+49303333333", "+49301111111"]);
    }

    #[test]
    fn test_consolidation_is_idempotent() {
        let items = vec![
            item("+49 30 1111111", "Support", "Support", "http://x.de/a"),
            item("+49 30 2222222", "Main Line", "Primary", "http://x.de/b"),
            item("030 1111111", "Sales", "Secondary", "http://x.de/c"),
        ];
        let first = consolidate(&items, "http://x.de", HINTS, "DE");
        let second = consolidate(&items, "http://x.de", HINTS, "DE");
        assert_eq!(first.numbers, second.numbers);
    }

    #[test]
    fn test_consolidation_associative_under_union() {
        // Consolidating the concatenation equals consolidating parts and
        // re-consolidating a rebuilt union of raw items.
        let part_a = vec![
            item("+49 30 1111111", "Main Line", "Primary", "http://x.de/a"),
            item("+49 30 2222222", "Support", "Support", "http://x.de/b"),
        ];
        let part_b = vec![
            item("030 1111111", "Sales", "Secondary", "http://x.de/c"),
            item("+49 30 3333333", "Main Line", "Primary", "http://x.de/d"),
        ];
        let all: Vec<_> = part_a.iter().cloned().chain(part_b.iter().cloned()).collect();
        let merged = consolidate(&all, "http://x.de", HINTS, "DE");
        let swapped: Vec<_> = part_b.into_iter().chain(part_a).collect();
        let merged_swapped = consolidate(&swapped, "http://x.de", HINTS, "DE");

        let numbers: Vec<&str> = merged.numbers.iter().map(|n| n.number.as_str()).collect();
        let numbers_swapped: Vec<&str> =
            merged_swapped.numbers.iter().map(|n| n.number.as_str()).collect();
        assert_eq!(numbers, numbers_swapped);
        for (a, b) in merged.numbers.iter().zip(merged_swapped.numbers.iter()) {
            assert_eq!(a.classification, b.classification);
            assert_eq!(a.sources.len(), b.sources.len());
        }
    }

    #[test]
    fn test_numbers_unique_within_domain() {
        let items = vec![
            item("+49 30 1111111", "Main Line", "Primary", "http://x.de/a"),
            item("030 1111111", "Sales", "Secondary", "http://x.de/b"),
            item("0049 30 1111111", "Support", "Support", "http://x.de/c"),
        ];
        let details = consolidate(&items, "http://x.de", HINTS, "DE");
        assert_eq!(details.numbers.len(), 1);
        assert_eq!(details.numbers[0].sources.len(), 3);
    }

    #[test]
    fn test_eligibility_filter() {
        let items = vec![
            item("+49 30 1111111", "Main Line", "Primary", "http://x.de/a"),
            item("+49 30 2222222", "Fax", "Secondary", "http://x.de/b"),
            item("+49 30 3333333", "Mobile", "Primary", "http://x.de/c"),
            item("+49 30 4444444", "Sales", "Non-Business", "http://x.de/d"),
        ];
        let details = consolidate(&items, "http://x.de", HINTS, "DE");
        assert_eq!(details.numbers.len(), 4);
        let eligible = eligible_numbers(&details);
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].number, "+49301111111");
    }

    #[test]
    fn test_error_substitute_items_never_eligible() {
        let items = vec![item(
            "+49 30 1111111",
            "Error_PersistentMismatch",
            "Non-Business",
            "http://x.de/a",
        )];
        let details = consolidate(&items, "http://x.de", HINTS, "DE");
        assert_eq!(details.numbers.len(), 1);
        assert!(eligible_numbers(&details).is_empty());
    }

    #[test]
    fn test_classification_priority_order() {
        assert!(classification_priority("Primary") < classification_priority("Secondary"));
        assert!(classification_priority("Secondary") < classification_priority("Support"));
        assert!(classification_priority("Support") < classification_priority("Low-Relevance"));
        assert!(classification_priority("Low-Relevance") < classification_priority("Non-Business"));
        assert!(classification_priority("Non-Business") < classification_priority("Error_LLMParse"));
    }

    #[test]
    fn test_type_priority_order() {
        assert!(type_priority("Main Line") < type_priority("Sales"));
        assert!(type_priority("Sales") < type_priority("Customer Service"));
        assert!(type_priority("Customer Service") < type_priority("Support"));
        assert!(type_priority("Support") < type_priority("Info-Hotline"));
        assert!(type_priority("Info-Hotline") < type_priority("Zentrale"));
        assert!(type_priority("Zentrale") < type_priority("Non-Priority-Country Contact"));
        assert!(type_priority("Non-Priority-Country Contact") < type_priority("Unknown"));
    }
}
