//! OCR medicine-name normalizer.
//!
//! Handles:
//! - OCR artifact cleanup (stray symbols, page markers, dates)
//! - Abbreviation expansion (tab→tablet, caps→capsules)
//! - Dosage extraction (500mg, 2 tablets, 1%)
//! - Casing/spacing canonicalization
//!
//! Every function here is total: bad input produces an empty or invalid
//! result, never a panic. Callers filter with [`is_valid_medicine_name`].

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::models::{DosageInfo, NormalizedName};

/// Abbreviation → expansion. Keys are lowercase.
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("tab", "tablet"),
    ("tabs", "tablets"),
    ("cap", "capsule"),
    ("caps", "capsules"),
    ("syp", "syrup"),
    ("syr", "syrup"),
    ("inj", "injection"),
    ("susp", "suspension"),
    ("oint", "ointment"),
    ("crm", "cream"),
    ("gtt", "drops"),
    ("sol", "solution"),
    ("soln", "solution"),
    ("vit", "vitamin"),
];

/// Words that mark a line as prescription boilerplate rather than a medicine.
const NON_MEDICINE_WORDS: &[&str] = &[
    "patient",
    "doctor",
    "signature",
    "sign",
    "page",
    "date",
    "name",
    "age",
    "sex",
    "gender",
    "address",
    "phone",
    "mobile",
    "hospital",
    "clinic",
    "diagnosis",
    "registration",
    "weight",
];

/// Minimum length of a plausible medicine name.
const MIN_NAME_LEN: usize = 3;

/// Tokens up to this length written in capitals are kept as-is (units, acronyms).
const SHORT_TOKEN_LEN: usize = 3;

static PAGE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bpage\s*(?:no\.?\s*)?\d+(?:\s*(?:of|/)\s*\d+)?\b")
        .expect("Invalid page marker regex")
});

static DATE_LIKE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{1,2}[/.\-]\d{1,2}[/.\-]\d{2,4}\b|\b\d{4}[/.\-]\d{1,2}[/.\-]\d{1,2}\b")
        .expect("Invalid date regex")
});

static DISALLOWED_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s.\-()]").expect("Invalid character filter regex"));

static ABBREVIATION_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    // Longest keys first so "tabs" wins over "tab".
    let mut keys: Vec<&str> = ABBREVIATIONS.iter().map(|(abbr, _)| *abbr).collect();
    keys.sort_by_key(|k| std::cmp::Reverse(k.len()));
    Regex::new(&format!(r"(?i)\b(?:{})\b", keys.join("|")))
        .expect("Invalid abbreviation regex")
});

/// Ordered dosage rules; the first rule with an acceptable match wins.
static DOSAGE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\d+(?:\.\d+)?\s*(?:mcg|mg|gm|g|ml|iu|units?)\b",
        r"(?i)\d+(?:\.\d+)?\s*(?:tablets?|tabs?|capsules?|caps?)\b",
        r"\d+(?:\.\d+)?\s*%",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("Invalid dosage regex"))
    .collect()
});

/// Normalize a raw OCR mention into display text, base name and dosage.
pub fn normalize(raw: &str) -> NormalizedName {
    let text = normalize_medicine_name(raw);
    let info = extract_dosage_info(&text);
    let dosage = Some(info.dosage).filter(|d| !d.is_empty());
    let unit = dosage.as_deref().and_then(dosage_unit);

    NormalizedName {
        text,
        base_name: info.name,
        dosage,
        unit,
    }
}

/// Clean OCR noise, expand abbreviations and title-case a medicine name.
pub fn normalize_medicine_name(raw: &str) -> String {
    let without_pages = PAGE_MARKER.replace_all(raw, " ");
    let without_dates = DATE_LIKE.replace_all(&without_pages, " ");
    let cleaned = DISALLOWED_CHARS.replace_all(&without_dates, " ");
    let collapsed = collapse_whitespace(&cleaned);
    let expanded = expand_abbreviations(&collapsed);

    expanded
        .split_whitespace()
        .map(title_case_token)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Expand known abbreviations as whole words, case-insensitively.
///
/// Short all-caps matches (e.g. "TAB") are left untouched.
pub fn expand_abbreviations(text: &str) -> String {
    ABBREVIATION_WORDS
        .replace_all(text, |caps: &Captures| {
            let word = &caps[0];
            if word.chars().count() <= SHORT_TOKEN_LEN && is_all_caps(word) {
                return word.to_string();
            }
            let lower = word.to_lowercase();
            ABBREVIATIONS
                .iter()
                .find(|(abbr, _)| *abbr == lower)
                .map(|(_, expansion)| (*expansion).to_string())
                .unwrap_or_else(|| word.to_string())
        })
        .into_owned()
}

/// Split the first recognizable dosage off a name.
pub fn extract_dosage_info(name: &str) -> DosageInfo {
    for pattern in DOSAGE_PATTERNS.iter() {
        let found = pattern
            .find_iter(name)
            .find(|m| is_dosage_boundary(name, m.start()));

        if let Some(m) = found {
            let remainder = format!("{} {}", &name[..m.start()], &name[m.end()..]);
            return DosageInfo {
                name: collapse_whitespace(&remainder),
                dosage: m.as_str().trim().to_string(),
            };
        }
    }

    DosageInfo {
        name: name.to_string(),
        dosage: String::new(),
    }
}

/// Check whether a string plausibly names a medicine.
pub fn is_valid_medicine_name(name: &str) -> bool {
    let trimmed = name.trim();
    if trimmed.chars().count() < MIN_NAME_LEN {
        return false;
    }
    if !trimmed.chars().any(char::is_alphabetic) {
        return false;
    }

    let lower = trimmed.to_lowercase();
    !lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .any(|word| NON_MEDICINE_WORDS.contains(&word))
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Unit part of a dosage string, lowercase.
fn dosage_unit(dosage: &str) -> Option<String> {
    let unit = dosage
        .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c.is_whitespace())
        .to_lowercase();
    Some(unit).filter(|u| !u.is_empty())
}

/// A number glued to a short letter run is part of a name ("B12"), not a dose.
///
/// Long runs are merged OCR tokens ("Paracetamol500mg") and still count.
fn is_dosage_boundary(text: &str, start: usize) -> bool {
    let letters_before = text[..start]
        .chars()
        .rev()
        .take_while(|c| c.is_alphabetic())
        .count();
    letters_before == 0 || letters_before > SHORT_TOKEN_LEN
}

fn is_all_caps(token: &str) -> bool {
    token.chars().any(char::is_alphabetic)
        && token
            .chars()
            .filter(|c| c.is_alphabetic())
            .all(char::is_uppercase)
}

fn title_case_token(token: &str) -> String {
    if token.chars().count() <= SHORT_TOKEN_LEN && is_all_caps(token) {
        return token.to_string();
    }

    let mut out = String::with_capacity(token.len());
    let mut capitalized = false;
    for c in token.chars() {
        if !capitalized && c.is_alphanumeric() {
            out.extend(c.to_uppercase());
            capitalized = true;
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_ocr_symbols() {
        assert_eq!(normalize_medicine_name("para@cetamol#500mg"), "Para Cetamol 500mg");
        assert_eq!(normalize_medicine_name("  amoxicillin   250MG  "), "Amoxicillin 250mg");
    }

    #[test]
    fn test_keeps_allowed_punctuation() {
        assert_eq!(
            normalize_medicine_name("co-amoxiclav (625mg)"),
            "Co-amoxiclav (625mg)"
        );
    }

    #[test]
    fn test_removes_page_and_dates() {
        assert_eq!(normalize_medicine_name("Page 3 Metformin"), "Metformin");
        assert_eq!(normalize_medicine_name("Metformin 12/03/2024"), "Metformin");
        assert_eq!(normalize_medicine_name("2024-03-12 azithromycin"), "Azithromycin");
        assert_eq!(normalize_medicine_name("page 2 of 4"), "");
    }

    #[test]
    fn test_abbreviation_expansion() {
        assert_eq!(expand_abbreviations("tab Dolo"), "tablet Dolo");
        assert_eq!(expand_abbreviations("Caps Omez"), "capsules Omez");
        assert_eq!(expand_abbreviations("syp. Benadryl"), "syrup. Benadryl");
        // Short all-caps tokens are preserved
        assert_eq!(expand_abbreviations("TAB Dolo"), "TAB Dolo");
        // Only whole words
        assert_eq!(expand_abbreviations("Tablet Captopril"), "Tablet Captopril");
    }

    #[test]
    fn test_title_case_preserves_short_caps() {
        assert_eq!(normalize_medicine_name("vitamin B12"), "Vitamin B12");
        assert_eq!(normalize_medicine_name("ORS powder"), "ORS Powder");
        assert_eq!(normalize_medicine_name("tab DOLO 650"), "Tablet Dolo 650");
    }

    #[test]
    fn test_extract_dosage() {
        let info = extract_dosage_info("Paracetamol 500mg");
        assert_eq!(info.name, "Paracetamol");
        assert_eq!(info.dosage, "500mg");

        let info = extract_dosage_info("Amoxicillin 250 MG Capsules");
        assert_eq!(info.name, "Amoxicillin Capsules");
        assert_eq!(info.dosage, "250 MG");

        let info = extract_dosage_info("Insulin Glargine 100 units");
        assert_eq!(info.dosage, "100 units");
    }

    #[test]
    fn test_extract_dosage_pattern_order() {
        // Strength wins over count even when the count comes first
        let info = extract_dosage_info("2 tablets Ibuprofen 400mg");
        assert_eq!(info.dosage, "400mg");
        assert_eq!(info.name, "2 tablets Ibuprofen");

        let info = extract_dosage_info("Dolo 2 tablets");
        assert_eq!(info.dosage, "2 tablets");
        assert_eq!(info.name, "Dolo");

        let info = extract_dosage_info("Clotrimazole 1% cream");
        assert_eq!(info.dosage, "1%");
    }

    #[test]
    fn test_extract_dosage_merged_token() {
        let info = extract_dosage_info("Paracetamol500mg");
        assert_eq!(info.name, "Paracetamol");
        assert_eq!(info.dosage, "500mg");
    }

    #[test]
    fn test_extract_dosage_ignores_vitamin_codes() {
        let info = extract_dosage_info("Vitamin B12 tablets");
        assert_eq!(info.name, "Vitamin B12 tablets");
        assert!(info.dosage.is_empty());
    }

    #[test]
    fn test_extract_dosage_no_match() {
        let info = extract_dosage_info("Cetirizine");
        assert_eq!(info.name, "Cetirizine");
        assert!(info.dosage.is_empty());
    }

    #[test]
    fn test_normalize_full() {
        let normalized = normalize("para@cetamol#500mg");
        assert_eq!(normalized.text, "Para Cetamol 500mg");
        assert_eq!(normalized.base_name, "Para Cetamol");
        assert_eq!(normalized.dosage.as_deref(), Some("500mg"));
        assert_eq!(normalized.unit.as_deref(), Some("mg"));

        let plain = normalize("cetirizine");
        assert_eq!(plain.text, "Cetirizine");
        assert_eq!(plain.dosage, None);
        assert_eq!(plain.unit, None);
    }

    #[test]
    fn test_normalize_empty_is_total() {
        let normalized = normalize("@@##");
        assert_eq!(normalized.text, "");
        assert_eq!(normalized.base_name, "");
        assert!(normalized.dosage.is_none());
    }

    #[test]
    fn test_validity() {
        assert!(!is_valid_medicine_name("AB"));
        assert!(!is_valid_medicine_name("123"));
        assert!(!is_valid_medicine_name("12.5 - 3"));
        assert!(!is_valid_medicine_name("patient name"));
        assert!(!is_valid_medicine_name("Doctor's Signature"));
        assert!(!is_valid_medicine_name(""));
        assert!(is_valid_medicine_name("Vitamin B12"));
        assert!(is_valid_medicine_name("Paracetamol 500mg"));
        // Blocklist matches whole words only
        assert!(is_valid_medicine_name("Pagenax"));
    }
}
