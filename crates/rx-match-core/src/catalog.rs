//! Catalog search contract used by the matching engine.
//!
//! The engine only needs one read operation from the product store: a
//! case-insensitive substring match of a query against product name or
//! generic name, restricted to active products, ordered by name, bounded in
//! row count. Anything that can answer that implements [`CatalogSearch`].

use std::sync::Mutex;

use thiserror::Error;

use crate::db::{Database, DbError};
use crate::models::CatalogCandidate;

/// Default row bound per catalog query.
pub const DEFAULT_QUERY_LIMIT: usize = 15;

/// Catalog errors.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Catalog storage error: {0}")]
    Storage(#[from] DbError),

    #[error("Catalog unavailable: {0}")]
    Unavailable(String),

    #[error("Catalog query rejected: {0}")]
    InvalidQuery(String),
}

impl CatalogError {
    /// Whether the same call may succeed if repeated.
    ///
    /// Bad rows and rejected queries fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CatalogError::Unavailable(_) | CatalogError::Storage(DbError::Sqlite(_))
        )
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Read-only product search.
pub trait CatalogSearch {
    /// Active products whose name or generic name contains `query`
    /// (case-insensitive), ordered by name, at most `limit` rows.
    fn search(&self, query: &str, limit: usize) -> CatalogResult<Vec<CatalogCandidate>>;
}

impl<T: CatalogSearch + ?Sized> CatalogSearch for &T {
    fn search(&self, query: &str, limit: usize) -> CatalogResult<Vec<CatalogCandidate>> {
        (**self).search(query, limit)
    }
}

impl CatalogSearch for Database {
    fn search(&self, query: &str, limit: usize) -> CatalogResult<Vec<CatalogCandidate>> {
        Ok(self.search_products(query, limit)?)
    }
}

/// Shared store; the lock is held for one query only.
impl CatalogSearch for Mutex<Database> {
    fn search(&self, query: &str, limit: usize) -> CatalogResult<Vec<CatalogCandidate>> {
        let db = self
            .lock()
            .map_err(|e| CatalogError::Unavailable(format!("Lock poisoned: {e}")))?;
        Ok(db.search_products(query, limit)?)
    }
}
