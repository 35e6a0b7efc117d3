//! Search variation generation.
//!
//! OCR tends to merge dosage, dosage form and brand into one token stream.
//! Each mention fans out into a handful of alternate catalog queries to
//! recover recall without unbounded catalog load.

use super::normalizer::{extract_dosage_info, normalize_medicine_name};

/// Upper bound on queries issued per mention.
pub const MAX_VARIATIONS: usize = 6;

/// Leading words that are not part of the product name. Lowercase.
const ROLE_PREFIXES: &[&str] = &[
    "dr.", "dr", "mr.", "mrs.", "tablet", "tablets", "tab", "tab.", "capsule", "capsules", "cap",
    "cap.", "syrup", "injection", "inj.",
];

/// Trailing dosage-form words. Lowercase.
const FORM_SUFFIXES: &[&str] = &[
    "tablet",
    "tablets",
    "capsule",
    "capsules",
    "syrup",
    "injection",
    "suspension",
    "cream",
    "ointment",
    "drops",
    "gel",
];

/// Derive alternate catalog queries for one mention.
///
/// The first entry is always the trimmed input (when it is longer than one
/// character). Entries are unique case-insensitively.
pub fn generate_variations(name: &str) -> Vec<String> {
    let original = name.trim();
    let mut variations = Variations::default();

    variations.push(original);
    variations.push(&normalize_medicine_name(original));

    let stripped = extract_dosage_info(original).name;
    if stripped != original {
        variations.push(&stripped);
        variations.push(&normalize_medicine_name(&stripped));
    }

    if original.contains(' ') {
        let tokens: Vec<&str> = original.split_whitespace().collect();
        if let (Some(first), Some(last)) = (tokens.first(), tokens.last()) {
            for token in [*first, *last] {
                if !is_bare_dosage(token) && !is_form_word(token) {
                    variations.push(token);
                }
            }
        }
    }

    let trimmed = strip_prefixes_and_suffixes(original);
    if trimmed != original {
        variations.push(&trimmed);
    }

    variations.into_vec()
}

/// Remove leading role words and trailing dosage-form words.
pub fn strip_prefixes_and_suffixes(name: &str) -> String {
    let mut tokens: Vec<&str> = name.split_whitespace().collect();

    while let Some(first) = tokens.first() {
        if tokens.len() > 1 && ROLE_PREFIXES.contains(&first.to_lowercase().as_str()) {
            tokens.remove(0);
        } else {
            break;
        }
    }

    while let Some(last) = tokens.last() {
        let word = last.trim_end_matches('.').to_lowercase();
        if tokens.len() > 1 && FORM_SUFFIXES.contains(&word.as_str()) {
            tokens.pop();
        } else {
            break;
        }
    }

    tokens.join(" ")
}

/// A token that is nothing but a dosage ("500mg", "10ml").
fn is_bare_dosage(token: &str) -> bool {
    let info = extract_dosage_info(token);
    !info.dosage.is_empty() && info.name.is_empty()
}

fn is_form_word(token: &str) -> bool {
    let lower = token.to_lowercase();
    ROLE_PREFIXES.contains(&lower.as_str())
        || FORM_SUFFIXES.contains(&lower.trim_end_matches('.'))
}

/// Insertion-ordered, case-insensitively unique, bounded list of queries.
#[derive(Default)]
struct Variations {
    items: Vec<String>,
}

impl Variations {
    fn push(&mut self, candidate: &str) {
        let candidate = candidate.trim();
        if candidate.chars().count() <= 1 || self.items.len() >= MAX_VARIATIONS {
            return;
        }
        let lower = candidate.to_lowercase();
        if self.items.iter().any(|v| v.to_lowercase() == lower) {
            return;
        }
        self.items.push(candidate.to_string());
    }

    fn into_vec(self) -> Vec<String> {
        self.items
    }
}
