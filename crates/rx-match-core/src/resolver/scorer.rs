//! Relevance scoring of catalog candidates against a query.
//!
//! Tiers (first applicable wins):
//! - Exact name/generic equality: 100
//! - Name/generic starts with query: 90
//! - Name/generic contains query: 80
//! - Word-level partial credit: up to 75
//!
//! Availability/image boosts are added on top, and edit-distance similarity
//! acts as a floor so heavily misspelled OCR output still ranks.

use serde::{Deserialize, Serialize};
use strsim::levenshtein;

use crate::models::{CatalogCandidate, MatchType};

pub const EXACT_SCORE: f64 = 100.0;
pub const PREFIX_SCORE: f64 = 90.0;
pub const CONTAINS_SCORE: f64 = 80.0;

/// Default boost for an in-stock candidate.
pub const DEFAULT_IN_STOCK_BOOST: f64 = 5.0;

/// Default boost for a candidate with at least one image.
pub const DEFAULT_IMAGE_BOOST: f64 = 2.0;

/// Default cap of the word-credit tier.
pub const DEFAULT_WORD_CREDIT_CAP: f64 = 75.0;

/// Default multiplier of the edit-distance floor.
pub const DEFAULT_EDIT_FLOOR_WEIGHT: f64 = 70.0;

/// Query tokens at or below this length earn no word credit.
const MIN_CREDIT_TOKEN_LEN: usize = 2;

/// Tunable scoring constants.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoringWeights {
    pub in_stock_boost: f64,
    pub image_boost: f64,
    pub word_credit_cap: f64,
    pub edit_floor_weight: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            in_stock_boost: DEFAULT_IN_STOCK_BOOST,
            image_boost: DEFAULT_IMAGE_BOOST,
            word_credit_cap: DEFAULT_WORD_CREDIT_CAP,
            edit_floor_weight: DEFAULT_EDIT_FLOOR_WEIGHT,
        }
    }
}

/// Scores candidates; pure with respect to its weights.
#[derive(Debug, Clone, Default)]
pub struct Scorer {
    weights: ScoringWeights,
}

impl Scorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    /// Score a candidate against a query (0 - 100).
    pub fn score(&self, query: &str, candidate: &CatalogCandidate) -> u8 {
        let query = query.trim().to_lowercase();
        let name = candidate.name.trim().to_lowercase();
        let generic = candidate.generic().map(str::to_lowercase);

        let base = match classify_tier(&query, &name, generic.as_deref()) {
            Some(MatchType::Exact) => EXACT_SCORE,
            Some(MatchType::Prefix) => PREFIX_SCORE,
            Some(MatchType::Partial) => CONTAINS_SCORE,
            _ => self.word_credit(&query, &name, generic.as_deref()),
        };

        let mut boosted = base;
        if candidate.in_stock {
            boosted += self.weights.in_stock_boost;
        }
        if candidate.has_image() {
            boosted += self.weights.image_boost;
        }

        let floor = edit_distance_similarity(&query, &name) * self.weights.edit_floor_weight;

        clamp_score(boosted.max(floor))
    }

    /// Word-level partial credit, capped at `word_credit_cap`.
    fn word_credit(&self, query: &str, name: &str, generic: Option<&str>) -> f64 {
        let query_tokens: Vec<&str> = query.split_whitespace().collect();
        if query_tokens.is_empty() {
            return 0.0;
        }

        let candidate_tokens: Vec<&str> = name
            .split_whitespace()
            .chain(generic.into_iter().flat_map(str::split_whitespace))
            .collect();

        let points: f64 = query_tokens
            .iter()
            .filter(|token| token.chars().count() > MIN_CREDIT_TOKEN_LEN)
            .map(|token| {
                if candidate_tokens.contains(token) {
                    1.0
                } else if name.contains(token) || generic.is_some_and(|g| g.contains(token)) {
                    0.5
                } else {
                    0.0
                }
            })
            .sum();

        let cap = self.weights.word_credit_cap;
        (points / query_tokens.len() as f64 * cap).min(cap)
    }
}

/// Score with default weights.
pub fn score_candidate(query: &str, candidate: &CatalogCandidate) -> u8 {
    Scorer::default().score(query, candidate)
}

/// Classify how the query relates to the best candidate.
///
/// `exact > prefix > partial > generic > fuzzy`.
pub fn determine_match_type(query: &str, candidate: &CatalogCandidate) -> MatchType {
    let query = query.trim().to_lowercase();
    let name = candidate.name.trim().to_lowercase();
    let generic = candidate.generic().map(str::to_lowercase);

    if let Some(tier) = classify_tier(&query, &name, generic.as_deref()) {
        return tier;
    }
    if candidate.is_branded_generic() {
        MatchType::Generic
    } else {
        MatchType::Fuzzy
    }
}

/// Textual tier of lowercase query vs lowercase name/generic.
fn classify_tier(query: &str, name: &str, generic: Option<&str>) -> Option<MatchType> {
    if query.is_empty() {
        return None;
    }
    let fields = || std::iter::once(name).chain(generic);

    if fields().any(|f| f == query) {
        Some(MatchType::Exact)
    } else if fields().any(|f| f.starts_with(query)) {
        Some(MatchType::Prefix)
    } else if fields().any(|f| f.contains(query)) {
        Some(MatchType::Partial)
    } else {
        None
    }
}

/// Classic Levenshtein distance over chars.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    levenshtein(a, b)
}

/// `(maxLen - distance) / maxLen`; 0.0 when either side is empty.
pub fn edit_distance_similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let distance = levenshtein_distance(a, b);
    (max_len - distance) as f64 / max_len as f64
}

/// Round and clamp a raw score to 0 - 100.
pub fn clamp_score(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, 100.0) as u8
}
