//! Per-name resolution models for the matching engine.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::CatalogCandidate;

/// Canonical form of one OCR mention.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedName {
    /// Cleaned, title-cased display text (dosage included)
    pub text: String,
    /// Display text with the dosage removed
    pub base_name: String,
    /// Extracted dosage (e.g., "500mg")
    pub dosage: Option<String>,
    /// Unit of the extracted dosage, lowercase (e.g., "mg", "tablets")
    pub unit: Option<String>,
}

/// Result of splitting a dosage off a name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DosageInfo {
    /// Name with the dosage substring removed
    pub name: String,
    /// Matched dosage substring, empty when none was found
    pub dosage: String,
}

/// A catalog candidate with its relevance score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScoredCandidate {
    /// The catalog product
    #[serde(flatten)]
    pub candidate: CatalogCandidate,
    /// Relevance score (0 - 100)
    pub score: u8,
    /// Search variation that surfaced this candidate
    pub matched_variation: String,
}

/// How the best candidate relates textually to the query.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Query equals the name or generic name
    Exact,
    /// Name or generic name starts with the query
    Prefix,
    /// Name or generic name contains the query
    Partial,
    /// Found through a product whose name differs from its generic name
    Generic,
    /// Only similar by word credit or edit distance
    Fuzzy,
    /// No candidate
    None,
}

impl MatchType {
    /// Tag used in serialized output.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Prefix => "prefix",
            Self::Partial => "partial",
            Self::Generic => "generic",
            Self::Fuzzy => "fuzzy",
            Self::None => "none",
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mention resolved to at least one catalog product.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    /// OCR text as received
    pub original_text: String,
    /// Normalized text used for scoring
    pub normalized_text: String,
    /// Extracted dosage
    pub dosage: Option<String>,
    /// Highest scored candidate
    pub best_match: ScoredCandidate,
    /// Runner-up candidates, descending by score
    pub alternatives: Vec<ScoredCandidate>,
    /// Confidence in the best match (0 - 100)
    pub confidence: u8,
    /// Textual relation of query to best match
    pub match_type: MatchType,
    /// Queries issued to the catalog
    pub search_variations: Vec<String>,
}

/// Why a mention could not be matched.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedReason {
    /// Catalog returned no usable candidates
    NotFound,
    /// Catalog calls failed and nothing usable came back
    SearchError,
    /// Mention failed normalization/validation
    InvalidName,
}

impl UnmatchedReason {
    /// Tag used in serialized output.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::SearchError => "search_error",
            Self::InvalidName => "invalid_name",
        }
    }

    /// Whether re-running the same lookup may succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::SearchError)
    }

    /// Actionable hint shown to the end user.
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::NotFound => "Try searching for individual medicine names manually",
            Self::SearchError => "The catalog could not be reached for some items; try again shortly",
            Self::InvalidName => {
                "Some text could not be read as a medicine name; check the prescription image or enter it manually"
            }
        }
    }
}

impl fmt::Display for UnmatchedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mention that could not be resolved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UnmatchedEntry {
    /// OCR text as received
    pub original_text: String,
    /// Normalization attempt
    pub normalized_text: String,
    /// Reason tag
    pub reason: UnmatchedReason,
    /// Underlying error description, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of resolving one mention.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Matched(MatchResult),
    Unmatched(UnmatchedEntry),
}

impl Resolution {
    /// Check whether the mention resolved to a product.
    pub fn is_matched(&self) -> bool {
        matches!(self, Resolution::Matched(_))
    }

    /// The unmatched reason, if any.
    pub fn unmatched_reason(&self) -> Option<UnmatchedReason> {
        match self {
            Resolution::Matched(_) => None,
            Resolution::Unmatched(entry) => Some(entry.reason),
        }
    }
}
