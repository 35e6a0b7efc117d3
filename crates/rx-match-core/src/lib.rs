//! Rx-Match Core Library
//!
//! Matches OCR-extracted prescription medicine names against a product catalog.
//!
//! # Architecture
//!
//! ```text
//! OCR names → Normalization/Validation ──(invalid)──→ rejectedNames
//!                     │
//!                     ▼
//!          PrescriptionMatcher (sequential, per name)
//!                     │
//!                     ▼
//!      Resolver: Variations → CatalogSearch → Scoring → Best Match
//!                     │
//!                     ▼
//!   PrescriptionMatchSummary (matched / unmatched, cost, confidence)
//!                     │
//!                     ▼
//!              validate_results → Validation
//! ```
//!
//! # Core Principle
//!
//! **The engine only reads the catalog.** Cart, stock and ordering decisions
//! belong to the caller; every result carries enough context for a human to
//! review it.
//!
//! # Modules
//!
//! - [`batch`]: Prescription-level orchestration and result validation
//! - [`catalog`]: Catalog search contract
//! - [`config`]: Tuning values and retry policy
//! - [`db`]: SQLite product store implementing the catalog contract
//! - [`models`]: Domain types (CatalogCandidate, MatchResult, summaries, etc.)
//! - [`resolver`]: Per-name resolver (normalizer + variations + scorer)

pub mod batch;
pub mod catalog;
pub mod config;
pub mod db;
pub mod models;
pub mod resolver;

// Re-export commonly used types
pub use batch::{validate_results, BatchError, MatchReport, PrescriptionMatcher};
pub use catalog::{CatalogError, CatalogSearch};
pub use config::MatcherConfig;
pub use db::Database;
pub use models::{
    CatalogCandidate, MatchResult, MatchType, OcrExtraction, PrescriptionMatchSummary,
    Resolution, UnmatchedEntry, UnmatchedReason, Validation,
};
pub use resolver::Resolver;

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex};

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum RxMatchError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),
}

impl From<db::DbError> for RxMatchError {
    fn from(e: db::DbError) -> Self {
        match e {
            db::DbError::NotFound(what) => RxMatchError::NotFound(what),
            db::DbError::Constraint(msg) => RxMatchError::InvalidInput(msg),
            other => RxMatchError::DatabaseError(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for RxMatchError {
    fn from(e: serde_json::Error) -> Self {
        RxMatchError::SerializationError(e.to_string())
    }
}

impl From<config::ConfigError> for RxMatchError {
    fn from(e: config::ConfigError) -> Self {
        RxMatchError::InvalidInput(e.to_string())
    }
}

impl From<CatalogError> for RxMatchError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::Storage(err) => err.into(),
            CatalogError::InvalidQuery(msg) => RxMatchError::InvalidInput(msg),
            CatalogError::Unavailable(msg) => RxMatchError::CatalogUnavailable(msg),
        }
    }
}

impl From<BatchError> for RxMatchError {
    fn from(e: BatchError) -> Self {
        match e {
            BatchError::EmptyInput | BatchError::NoValidNames { .. } => {
                RxMatchError::InvalidInput(e.to_string())
            }
            BatchError::CatalogUnavailable { .. } | BatchError::DeadlineExceeded { .. } => {
                RxMatchError::CatalogUnavailable(e.to_string())
            }
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for RxMatchError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        RxMatchError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a product catalog at the given path.
#[uniffi::export]
pub fn open_catalog(path: String) -> Result<Arc<RxMatchCore>, RxMatchError> {
    let db = Database::open(&path)?;
    Ok(RxMatchCore::wrap(db, MatcherConfig::default()))
}

/// Open a catalog with a JSON matcher configuration.
#[uniffi::export]
pub fn open_catalog_with_config(
    path: String,
    config_json: String,
) -> Result<Arc<RxMatchCore>, RxMatchError> {
    let config = MatcherConfig::from_json(&config_json)?;
    let db = Database::open(&path)?;
    Ok(RxMatchCore::wrap(db, config))
}

/// Create an in-memory catalog (for testing).
#[uniffi::export]
pub fn open_catalog_in_memory() -> Result<Arc<RxMatchCore>, RxMatchError> {
    let db = Database::open_in_memory()?;
    Ok(RxMatchCore::wrap(db, MatcherConfig::immediate()))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe catalog + matcher for FFI.
#[derive(uniffi::Object)]
pub struct RxMatchCore {
    db: Arc<Mutex<Database>>,
    config: MatcherConfig,
}

impl RxMatchCore {
    fn wrap(db: Database, config: MatcherConfig) -> Arc<Self> {
        Arc::new(Self {
            db: Arc::new(Mutex::new(db)),
            config,
        })
    }
}

#[uniffi::export]
impl RxMatchCore {
    // =========================================================================
    // Catalog Operations
    // =========================================================================

    /// Add or update a product.
    pub fn upsert_product(&self, product: FfiProduct) -> Result<(), RxMatchError> {
        let db = self.db.lock()?;
        db.upsert_product(&product.into())?;
        Ok(())
    }

    /// Import a JSON array of products in one transaction.
    pub fn import_products_json(&self, json: String) -> Result<u32, RxMatchError> {
        let products: Vec<CatalogCandidate> = serde_json::from_str(&json)?;
        let mut db = self.db.lock()?;
        let count = db.import_products(&products)?;
        Ok(count as u32)
    }

    /// Get a product by id.
    pub fn get_product(&self, id: String) -> Result<Option<FfiProduct>, RxMatchError> {
        let db = self.db.lock()?;
        let product = db.get_product(&id)?;
        Ok(product.map(|p| p.into()))
    }

    /// Search catalog by name/generic name.
    pub fn search_catalog(&self, query: String, limit: u32) -> Result<Vec<FfiProduct>, RxMatchError> {
        let db = self.db.lock()?;
        let products = db.search_products(&query, limit as usize)?;
        Ok(products.into_iter().map(|p| p.into()).collect())
    }

    // =========================================================================
    // Matching Operations
    // =========================================================================

    /// Match OCR medicine names against the catalog.
    ///
    /// The catalog lock is taken per query, so other calls proceed while a
    /// batch waits between names.
    pub fn process_prescription(
        &self,
        names: Vec<String>,
        ocr_confidence: f64,
    ) -> Result<FfiPrescriptionSummary, RxMatchError> {
        let matcher = PrescriptionMatcher::with_config(&*self.db, self.config.clone());
        let summary = matcher.process_prescription(names.as_slice(), ocr_confidence)?;
        Ok(MatchReport::new(summary).into())
    }

    /// Match an OCR JSON payload; returns summary + validation as JSON.
    pub fn process_ocr_json(&self, json: String) -> Result<String, RxMatchError> {
        let extraction = OcrExtraction::from_json(&json)?;
        let matcher = PrescriptionMatcher::with_config(&*self.db, self.config.clone());
        let summary = matcher.process_extraction(&extraction)?;
        Ok(MatchReport::new(summary).to_json()?)
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe product.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiProduct {
    pub id: String,
    pub name: String,
    pub generic_name: Option<String>,
    pub manufacturer: Option<String>,
    pub price: f64,
    pub in_stock: bool,
    pub stock_quantity: u32,
    pub requires_prescription: bool,
    pub image_urls: Vec<String>,
    pub active: bool,
}

impl From<CatalogCandidate> for FfiProduct {
    fn from(item: CatalogCandidate) -> Self {
        Self {
            id: item.id,
            name: item.name,
            generic_name: item.generic_name,
            manufacturer: item.manufacturer,
            price: item.price,
            in_stock: item.in_stock,
            stock_quantity: item.stock_quantity,
            requires_prescription: item.requires_prescription,
            image_urls: item.image_urls,
            active: item.active,
        }
    }
}

impl From<FfiProduct> for CatalogCandidate {
    fn from(item: FfiProduct) -> Self {
        CatalogCandidate {
            id: item.id,
            name: item.name,
            generic_name: item.generic_name,
            manufacturer: item.manufacturer,
            price: item.price,
            in_stock: item.in_stock,
            stock_quantity: item.stock_quantity,
            requires_prescription: item.requires_prescription,
            image_urls: item.image_urls,
            active: item.active,
        }
    }
}

/// FFI-safe runner-up candidate.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAlternative {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub in_stock: bool,
    pub score: u8,
}

impl From<models::ScoredCandidate> for FfiAlternative {
    fn from(scored: models::ScoredCandidate) -> Self {
        Self {
            id: scored.candidate.id,
            name: scored.candidate.name,
            price: scored.candidate.price,
            in_stock: scored.candidate.in_stock,
            score: scored.score,
        }
    }
}

/// FFI-safe matched medicine.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMatchRow {
    pub original_text: String,
    pub normalized_text: String,
    pub dosage: Option<String>,
    pub product: FfiProduct,
    pub score: u8,
    pub confidence: u8,
    pub match_type: String,
    pub alternatives: Vec<FfiAlternative>,
}

impl From<MatchResult> for FfiMatchRow {
    fn from(m: MatchResult) -> Self {
        Self {
            original_text: m.original_text,
            normalized_text: m.normalized_text,
            dosage: m.dosage,
            score: m.best_match.score,
            product: m.best_match.candidate.into(),
            confidence: m.confidence,
            match_type: m.match_type.as_str().to_string(),
            alternatives: m.alternatives.into_iter().map(|a| a.into()).collect(),
        }
    }
}

/// FFI-safe unmatched medicine.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiUnmatchedRow {
    pub original_text: String,
    pub normalized_text: String,
    pub reason: String,
    pub suggestion: String,
}

impl From<UnmatchedEntry> for FfiUnmatchedRow {
    fn from(entry: UnmatchedEntry) -> Self {
        Self {
            original_text: entry.original_text,
            normalized_text: entry.normalized_text,
            reason: entry.reason.as_str().to_string(),
            suggestion: entry.reason.suggestion().to_string(),
        }
    }
}

/// FFI-safe validation verdict.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiValidation {
    pub is_valid: bool,
    pub requires_review: bool,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

impl From<Validation> for FfiValidation {
    fn from(v: Validation) -> Self {
        Self {
            is_valid: v.is_valid,
            requires_review: v.requires_review,
            issues: v.issues,
            warnings: v.warnings,
            suggestions: v.suggestions,
        }
    }
}

/// FFI-safe prescription summary.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPrescriptionSummary {
    pub prescription_id: String,
    pub created_at: String,
    pub matched: Vec<FfiMatchRow>,
    pub unmatched: Vec<FfiUnmatchedRow>,
    pub rejected_names: Vec<String>,
    pub match_rate: u32,
    pub in_stock_count: u32,
    pub out_of_stock_count: u32,
    pub estimated_total: f64,
    pub overall_confidence: u8,
    pub validation: FfiValidation,
}

impl From<MatchReport> for FfiPrescriptionSummary {
    fn from(report: MatchReport) -> Self {
        let s = report.summary;
        Self {
            prescription_id: s.prescription_id,
            created_at: s.created_at,
            matched: s.matched_medicines.into_iter().map(|m| m.into()).collect(),
            unmatched: s.unmatched_medicines.into_iter().map(|u| u.into()).collect(),
            rejected_names: s.rejected_names,
            match_rate: s.match_rate,
            in_stock_count: s.availability.in_stock,
            out_of_stock_count: s.availability.out_of_stock,
            estimated_total: s.estimated_cost.total,
            overall_confidence: s.overall_confidence,
            validation: report.validation.into(),
        }
    }
}
