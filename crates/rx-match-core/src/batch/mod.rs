//! Batch orchestration over one prescription.
//!
//! Resolves every valid mention in order, isolates per-name failures and
//! assembles the prescription summary.

mod validation;

pub use validation::*;

use std::thread;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::CatalogSearch;
use crate::config::MatcherConfig;
use crate::models::{
    Availability, EstimatedCost, MatchResult, OcrExtraction, PrescriptionMatchSummary,
    Resolution, UnmatchedEntry, UnmatchedReason, Validation,
};
use crate::resolver::{clamp_score, is_valid_medicine_name, normalize, Resolver};

/// Length of the random part of a prescription id.
const ID_RANDOM_LEN: u32 = 9;

/// Batch-level failures. Per-name problems never end up here.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BatchError {
    #[error("No medicine names provided")]
    EmptyInput,

    #[error("None of the {rejected} extracted names look like medicine names")]
    NoValidNames { rejected: usize },

    #[error("Catalog unavailable: all {failed} lookups failed (last error: {last_error})")]
    CatalogUnavailable { failed: usize, last_error: String },

    #[error("Batch deadline of {deadline_ms} ms exceeded after {processed} of {total} names")]
    DeadlineExceeded {
        processed: usize,
        total: usize,
        deadline_ms: u64,
    },
}

impl BatchError {
    /// Whether re-running the same batch may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BatchError::CatalogUnavailable { .. } | BatchError::DeadlineExceeded { .. }
        )
    }
}

/// Summary plus its review verdict, as handed to result consumers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchReport {
    pub summary: PrescriptionMatchSummary,
    pub validation: Validation,
}

impl MatchReport {
    pub fn new(summary: PrescriptionMatchSummary) -> Self {
        let validation = validate_results(&summary);
        Self {
            summary,
            validation,
        }
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Runs the resolver over a whole prescription.
pub struct PrescriptionMatcher<'a, C: CatalogSearch + ?Sized> {
    resolver: Resolver<'a, C>,
}

impl<'a, C: CatalogSearch + ?Sized> PrescriptionMatcher<'a, C> {
    /// Create a matcher with default configuration.
    pub fn new(catalog: &'a C) -> Self {
        Self::with_config(catalog, MatcherConfig::default())
    }

    /// Create a matcher with explicit configuration.
    pub fn with_config(catalog: &'a C, config: MatcherConfig) -> Self {
        Self {
            resolver: Resolver::with_config(catalog, config),
        }
    }

    pub fn config(&self) -> &MatcherConfig {
        self.resolver.config()
    }

    /// Match a list of OCR mentions.
    ///
    /// `ocr_confidence` is the OCR collaborator's confidence (0 - 100).
    pub fn process_prescription<S: AsRef<str>>(
        &self,
        mentions: &[S],
        ocr_confidence: f64,
    ) -> Result<PrescriptionMatchSummary, BatchError> {
        self.run(mentions, ocr_confidence, String::new(), None)
    }

    /// Match an OCR payload; raw text and patient details pass through.
    pub fn process_extraction(
        &self,
        extraction: &OcrExtraction,
    ) -> Result<PrescriptionMatchSummary, BatchError> {
        self.run(
            extraction.medicine_names.as_slice(),
            extraction.confidence,
            extraction.raw_text.clone(),
            extraction.patient_info.clone(),
        )
    }

    fn run<S: AsRef<str>>(
        &self,
        mentions: &[S],
        ocr_confidence: f64,
        raw_text: String,
        patient_info: Option<serde_json::Value>,
    ) -> Result<PrescriptionMatchSummary, BatchError> {
        if mentions.is_empty() {
            return Err(BatchError::EmptyInput);
        }

        let (valid, rejected): (Vec<&str>, Vec<&str>) = mentions
            .iter()
            .map(|m| m.as_ref())
            .partition(|m| is_valid_medicine_name(&normalize(m).text));

        if valid.is_empty() {
            return Err(BatchError::NoValidNames {
                rejected: rejected.len(),
            });
        }
        if !rejected.is_empty() {
            debug!(?rejected, "Dropped invalid names before matching");
        }

        let resolutions = self.resolve_sequentially(&valid)?;
        check_catalog_outage(&resolutions)?;

        let summary = build_summary(
            resolutions,
            rejected.into_iter().map(String::from).collect(),
            ocr_confidence,
            raw_text,
            patient_info,
            self.config(),
        );

        info!(
            prescription_id = %summary.prescription_id,
            total = summary.total_processed,
            matched = summary.matched_count,
            unmatched = summary.unmatched_count,
            rejected = summary.rejected_names.len(),
            match_rate = summary.match_rate,
            overall_confidence = summary.overall_confidence,
            "Processed prescription"
        );

        Ok(summary)
    }

    /// One resolver call per name, in order, with the courtesy delay between names.
    fn resolve_sequentially(&self, names: &[&str]) -> Result<Vec<Resolution>, BatchError> {
        let config = self.config();
        let delay = config.inter_name_delay();
        let started = Instant::now();
        let mut resolutions = Vec::with_capacity(names.len());

        for (index, name) in names.iter().enumerate() {
            if index > 0 && !delay.is_zero() {
                thread::sleep(delay);
            }
            if let Some(deadline) = config.batch_deadline() {
                if started.elapsed() >= deadline {
                    warn!(processed = index, total = names.len(), "Batch deadline exceeded");
                    return Err(BatchError::DeadlineExceeded {
                        processed: index,
                        total: names.len(),
                        deadline_ms: deadline.as_millis() as u64,
                    });
                }
            }
            resolutions.push(self.resolver.resolve(name));
        }

        Ok(resolutions)
    }
}

/// Fail the batch when every lookup failed at the catalog.
fn check_catalog_outage(resolutions: &[Resolution]) -> Result<(), BatchError> {
    let mut last_error = None;
    for resolution in resolutions {
        match resolution {
            Resolution::Unmatched(UnmatchedEntry {
                reason: UnmatchedReason::SearchError,
                error,
                ..
            }) => {
                if error.is_some() {
                    last_error = error.clone();
                }
            }
            _ => return Ok(()),
        }
    }

    let last_error = last_error.unwrap_or_else(|| "unknown catalog error".to_string());
    warn!(failed = resolutions.len(), %last_error, "All catalog lookups failed");
    Err(BatchError::CatalogUnavailable {
        failed: resolutions.len(),
        last_error,
    })
}

fn build_summary(
    resolutions: Vec<Resolution>,
    rejected_names: Vec<String>,
    ocr_confidence: f64,
    raw_text: String,
    patient_info: Option<serde_json::Value>,
    config: &MatcherConfig,
) -> PrescriptionMatchSummary {
    let mut matched: Vec<MatchResult> = Vec::new();
    let mut unmatched: Vec<UnmatchedEntry> = Vec::new();
    for resolution in resolutions {
        match resolution {
            Resolution::Matched(m) => matched.push(m),
            Resolution::Unmatched(u) => unmatched.push(u),
        }
    }

    let matched_count = matched.len() as u32;
    let unmatched_count = unmatched.len() as u32;
    let total_processed = matched_count + unmatched_count;
    let match_rate = percentage(matched_count, total_processed);

    let mut availability = Availability::default();
    let mut estimated_cost = EstimatedCost::default();
    for m in &matched {
        let candidate = &m.best_match.candidate;
        if candidate.in_stock {
            availability.in_stock += 1;
            estimated_cost.total += candidate.price;
            estimated_cost.priced_items += 1;
        } else {
            availability.out_of_stock += 1;
        }
    }
    estimated_cost.total = round_cents(estimated_cost.total);

    let ocr_confidence = if ocr_confidence.is_finite() {
        ocr_confidence.clamp(0.0, 100.0)
    } else {
        0.0
    };
    let mean_match_confidence = if matched.is_empty() {
        0.0
    } else {
        matched.iter().map(|m| f64::from(m.confidence)).sum::<f64>() / matched.len() as f64
    };
    let weights = &config.confidence;
    let overall_confidence = clamp_score(
        weights.ocr_weight * ocr_confidence
            + weights.match_rate_weight * f64::from(match_rate)
            + weights.match_confidence_weight * mean_match_confidence,
    );

    let now = Utc::now();
    PrescriptionMatchSummary {
        prescription_id: prescription_id(now.timestamp_millis().max(0) as u128),
        created_at: now.to_rfc3339(),
        matched_medicines: matched,
        unmatched_medicines: unmatched,
        rejected_names,
        total_processed,
        matched_count,
        unmatched_count,
        match_rate,
        availability,
        estimated_cost,
        ocr_confidence,
        overall_confidence,
        raw_text,
        patient_info,
    }
}

/// `round(part / whole * 100)`; 0 for an empty whole.
fn percentage(part: u32, whole: u32) -> u32 {
    if whole == 0 {
        return 0;
    }
    (f64::from(part) / f64::from(whole) * 100.0).round() as u32
}

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// `rx_<base36 millis>_<9 random base36 chars>`.
fn prescription_id(millis: u128) -> String {
    let random = Uuid::new_v4().as_u128() % 36u128.pow(ID_RANDOM_LEN);
    format!(
        "rx_{}_{:0>width$}",
        to_base36(millis),
        to_base36(random),
        width = ID_RANDOM_LEN as usize
    )
}

fn to_base36(mut value: u128) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogError, CatalogResult};
    use crate::db::Database;
    use crate::models::{CatalogCandidate, MatchType};

    fn product(id: &str, name: &str, generic: Option<&str>, price: f64) -> CatalogCandidate {
        let mut item = CatalogCandidate::new(id.into(), name.into(), price);
        item.generic_name = generic.map(Into::into);
        item
    }

    fn setup_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.upsert_product(&product("P1", "Paracetamol 500mg", Some("Paracetamol"), 25.0))
            .unwrap();
        db.upsert_product(&product("P2", "Aspirin 100mg", Some("Aspirin"), 25.0))
            .unwrap();
        let mut out = product("P3", "Azithromycin 500mg", Some("Azithromycin"), 120.0);
        out.in_stock = false;
        db.upsert_product(&out).unwrap();
        db
    }

    fn matcher(db: &Database) -> PrescriptionMatcher<'_, Database> {
        PrescriptionMatcher::with_config(db, MatcherConfig::immediate())
    }

    struct Offline;

    impl CatalogSearch for Offline {
        fn search(&self, _query: &str, _limit: usize) -> CatalogResult<Vec<CatalogCandidate>> {
            Err(CatalogError::Unavailable("connection refused".into()))
        }
    }

    #[test]
    fn test_all_exact() {
        let db = setup_db();
        let summary = matcher(&db)
            .process_prescription(&["Paracetamol 500mg", "Aspirin 100mg"], 90.0)
            .unwrap();

        assert_eq!(summary.matched_count, 2);
        assert_eq!(summary.unmatched_count, 0);
        assert_eq!(summary.match_rate, 100);
        assert!(summary
            .matched_medicines
            .iter()
            .all(|m| m.match_type == MatchType::Exact));
        assert_eq!(summary.best_match_ids(), vec!["P1", "P2"]);
        // 0.3 * 90 + 0.4 * 100 + 0.3 * 100
        assert_eq!(summary.overall_confidence, 97);
    }

    #[test]
    fn test_not_found_isolated() {
        let db = setup_db();
        let summary = matcher(&db)
            .process_prescription(&["Paracetamol 500mg", "UnknownXyz123"], 80.0)
            .unwrap();

        assert_eq!(summary.matched_count, 1);
        assert_eq!(summary.unmatched_count, 1);
        assert_eq!(summary.match_rate, 50);
        assert_eq!(summary.unmatched_medicines[0].reason, UnmatchedReason::NotFound);
    }

    #[test]
    fn test_cost_counts_in_stock_only() {
        let db = setup_db();
        let summary = matcher(&db)
            .process_prescription(
                &["Paracetamol 500mg", "Aspirin 100mg", "Azithromycin 500mg"],
                90.0,
            )
            .unwrap();

        assert_eq!(summary.estimated_cost.total, 50.0);
        assert_eq!(summary.estimated_cost.priced_items, 2);
        assert_eq!(summary.availability.in_stock, 2);
        assert_eq!(summary.availability.out_of_stock, 1);
    }

    #[test]
    fn test_invalid_names_rejected() {
        let db = setup_db();
        let summary = matcher(&db)
            .process_prescription(&["Patient Name", "Aspirin 100mg", "12"], 90.0)
            .unwrap();

        assert_eq!(summary.total_processed, 1);
        assert_eq!(summary.rejected_names, vec!["Patient Name", "12"]);
    }

    #[test]
    fn test_empty_input() {
        let db = setup_db();
        let names: [&str; 0] = [];
        assert_eq!(
            matcher(&db).process_prescription(&names, 90.0),
            Err(BatchError::EmptyInput)
        );
    }

    #[test]
    fn test_no_valid_names() {
        let db = setup_db();
        assert_eq!(
            matcher(&db).process_prescription(&["Signature", "12/03/2024"], 90.0),
            Err(BatchError::NoValidNames { rejected: 2 })
        );
    }

    #[test]
    fn test_catalog_outage_is_systemic() {
        let matcher = PrescriptionMatcher::with_config(&Offline, MatcherConfig::immediate());
        let err = matcher
            .process_prescription(&["Paracetamol 500mg", "Aspirin"], 90.0)
            .unwrap_err();

        match err {
            BatchError::CatalogUnavailable { failed, last_error } => {
                assert_eq!(failed, 2);
                assert!(last_error.contains("connection refused"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!BatchError::EmptyInput.is_retryable());
    }

    #[test]
    fn test_deadline() {
        let db = setup_db();
        let config = MatcherConfig {
            batch_deadline_ms: Some(0),
            ..MatcherConfig::immediate()
        };
        let err = PrescriptionMatcher::with_config(&db, config)
            .process_prescription(&["Aspirin"], 90.0)
            .unwrap_err();
        assert!(matches!(err, BatchError::DeadlineExceeded { processed: 0, total: 1, .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_extraction_passthrough() {
        let db = setup_db();
        let extraction = OcrExtraction {
            medicine_names: vec!["Aspirin 100mg".into()],
            confidence: 75.0,
            raw_text: "Rx: Aspirin 100mg".into(),
            patient_info: Some(serde_json::json!({"name": "A. Patient"})),
        };
        let summary = matcher(&db).process_extraction(&extraction).unwrap();

        assert_eq!(summary.raw_text, "Rx: Aspirin 100mg");
        assert_eq!(summary.patient_info, extraction.patient_info);
        assert_eq!(summary.ocr_confidence, 75.0);
    }

    #[test]
    fn test_ocr_confidence_sanitized() {
        let db = setup_db();
        let summary = matcher(&db)
            .process_prescription(&["Aspirin 100mg"], f64::NAN)
            .unwrap();
        assert_eq!(summary.ocr_confidence, 0.0);
        // 0.4 * 100 + 0.3 * 100
        assert_eq!(summary.overall_confidence, 70);
    }

    #[test]
    fn test_report_json_is_camel_case() {
        let db = setup_db();
        let summary = matcher(&db)
            .process_prescription(&["Aspirin 100mg", "UnknownXyz123"], 90.0)
            .unwrap();
        let report = MatchReport::new(summary);
        assert!(report.validation.requires_review);

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["summary"]["matchRate"], 50);
        assert_eq!(json["summary"]["unmatchedMedicines"][0]["reason"], "not_found");
        assert_eq!(json["summary"]["matchedMedicines"][0]["matchType"], "exact");
        assert_eq!(json["validation"]["isValid"], true);
    }

    #[test]
    fn test_prescription_id_format() {
        let id = prescription_id(1_700_000_000_000);
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "rx");
        assert_eq!(parts[1], to_base36(1_700_000_000_000));
        assert_eq!(parts[2].len(), 9);
        assert!(parts[2].chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }

    #[test]
    fn test_percentage_and_rounding() {
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(0, 0), 0);
        assert_eq!(round_cents(10.005_1), 10.01);
        assert_eq!(round_cents(33.333), 33.33);
    }
}
