//! Prescription-level models: OCR input, batch summary and validation.

use serde::{Deserialize, Serialize};

use super::{MatchResult, UnmatchedEntry};

/// Payload handed over by the OCR collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OcrExtraction {
    /// Candidate medicine names, in prescription order
    pub medicine_names: Vec<String>,
    /// OCR confidence (0 - 100)
    #[serde(default)]
    pub confidence: f64,
    /// Full recognized text
    #[serde(default)]
    pub raw_text: String,
    /// Opaque patient details, passed through for display
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_info: Option<serde_json::Value>,
}

impl OcrExtraction {
    /// Parse the collaborator's JSON payload.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Stock availability across matched medicines.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub in_stock: u32,
    pub out_of_stock: u32,
}

/// Estimated order cost.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EstimatedCost {
    /// Sum of best-match prices for matched, in-stock medicines (2 decimals)
    pub total: f64,
    /// Number of prices included in `total`
    pub priced_items: u32,
}

/// Batch-level result for one prescription.
///
/// Built once by the orchestrator and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrescriptionMatchSummary {
    /// Identifier, `rx_<base36 millis>_<random>`
    pub prescription_id: String,
    /// RFC 3339 creation timestamp
    pub created_at: String,
    pub matched_medicines: Vec<MatchResult>,
    pub unmatched_medicines: Vec<UnmatchedEntry>,
    /// Input names dropped by validation before matching
    pub rejected_names: Vec<String>,
    pub total_processed: u32,
    pub matched_count: u32,
    pub unmatched_count: u32,
    /// Matched share of processed names, percent (rounded)
    pub match_rate: u32,
    pub availability: Availability,
    pub estimated_cost: EstimatedCost,
    /// OCR confidence as received (0 - 100)
    pub ocr_confidence: f64,
    /// Blended batch confidence (0 - 100)
    pub overall_confidence: u8,
    /// Pass-through OCR text
    #[serde(default)]
    pub raw_text: String,
    /// Pass-through patient details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_info: Option<serde_json::Value>,
}

impl PrescriptionMatchSummary {
    /// Unmatched share of processed names, percent (unrounded).
    pub fn unmatched_rate(&self) -> f64 {
        if self.total_processed == 0 {
            return 0.0;
        }
        f64::from(self.unmatched_count) / f64::from(self.total_processed) * 100.0
    }

    /// Catalog ids of best matches, in prescription order.
    pub fn best_match_ids(&self) -> Vec<&str> {
        self.matched_medicines
            .iter()
            .map(|m| m.best_match.candidate.id.as_str())
            .collect()
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Review verdict over a summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Validation {
    /// False iff any issue is present
    pub is_valid: bool,
    /// Problems that make the result unreliable
    pub issues: Vec<String>,
    /// Points worth a human look
    pub warnings: Vec<String>,
    /// User-facing next steps
    pub suggestions: Vec<String>,
    /// True when issues or warnings exist
    pub requires_review: bool,
}
