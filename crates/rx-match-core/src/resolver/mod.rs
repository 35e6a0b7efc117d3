//! Per-name resolver.
//!
//! Pipeline: Normalization → Variations → Catalog Search → Scoring → Best Match

mod normalizer;
mod scorer;
mod variations;

pub use normalizer::*;
pub use scorer::*;
pub use variations::*;

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::catalog::CatalogSearch;
use crate::config::MatcherConfig;
use crate::models::{
    CatalogCandidate, MatchResult, MatchType, NormalizedName, Resolution, ScoredCandidate,
    UnmatchedEntry, UnmatchedReason,
};

/// Resolves single mentions against a catalog.
///
/// Holds no mutable state; the only side effects are catalog reads.
pub struct Resolver<'a, C: CatalogSearch + ?Sized> {
    catalog: &'a C,
    scorer: Scorer,
    config: MatcherConfig,
}

/// Candidates gathered across all variations of one mention.
#[derive(Debug, Default)]
struct CandidatePool {
    /// (candidate, variation that found it), first occurrence per id
    found: Vec<(CatalogCandidate, String)>,
    failed_calls: usize,
    last_error: Option<String>,
}

impl<'a, C: CatalogSearch + ?Sized> Resolver<'a, C> {
    /// Create a resolver with default configuration.
    pub fn new(catalog: &'a C) -> Self {
        Self::with_config(catalog, MatcherConfig::default())
    }

    /// Create a resolver with explicit configuration.
    pub fn with_config(catalog: &'a C, config: MatcherConfig) -> Self {
        Self {
            catalog,
            scorer: Scorer::new(config.scoring),
            config,
        }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Resolve one OCR mention.
    pub fn resolve(&self, mention: &str) -> Resolution {
        let normalized = normalize(mention);
        if !is_valid_medicine_name(&normalized.text) {
            debug!(mention, "Rejected invalid medicine name");
            return Resolution::Unmatched(UnmatchedEntry {
                original_text: mention.to_string(),
                normalized_text: normalized.text,
                reason: UnmatchedReason::InvalidName,
                error: None,
            });
        }

        let variations = generate_variations(mention);
        debug!(mention, ?variations, "Generated search variations");

        let pool = self.search_variations(&variations);
        if pool.found.is_empty() {
            return Resolution::Unmatched(self.unmatched(mention, normalized, pool));
        }
        if pool.failed_calls > 0 {
            warn!(
                mention,
                failed_calls = pool.failed_calls,
                "Some catalog calls failed; using results from remaining variations"
            );
        }

        let mut scored: Vec<ScoredCandidate> = pool
            .found
            .into_iter()
            .map(|(candidate, variation)| ScoredCandidate {
                score: self.scorer.score(&normalized.text, &candidate),
                candidate,
                matched_variation: variation,
            })
            .collect();

        // Stable: ties keep variation order, then catalog (name) order
        scored.sort_by(|a, b| b.score.cmp(&a.score));

        let mut ranked = scored.into_iter();
        let Some(best) = ranked.next() else {
            return Resolution::Unmatched(UnmatchedEntry {
                original_text: mention.to_string(),
                normalized_text: normalized.text,
                reason: UnmatchedReason::NotFound,
                error: None,
            });
        };
        let alternatives: Vec<ScoredCandidate> =
            ranked.take(self.config.max_alternatives).collect();

        let match_type = determine_match_type(&normalized.text, &best.candidate);
        let confidence = self.match_confidence(&normalized.text, best.score, match_type);

        debug!(
            mention,
            best_id = %best.candidate.id,
            score = best.score,
            confidence,
            %match_type,
            "Resolved mention"
        );

        Resolution::Matched(MatchResult {
            original_text: mention.to_string(),
            normalized_text: normalized.text,
            dosage: normalized.dosage,
            best_match: best,
            alternatives,
            confidence,
            match_type,
            search_variations: variations,
        })
    }

    /// Resolve several mentions, in order.
    pub fn resolve_all<S: AsRef<str>>(&self, mentions: &[S]) -> Vec<Resolution> {
        mentions.iter().map(|m| self.resolve(m.as_ref())).collect()
    }

    /// Confidence in a match: score, tier boost, short-query penalty.
    pub fn match_confidence(&self, query: &str, score: u8, match_type: MatchType) -> u8 {
        let weights = &self.config.confidence;
        let mut confidence = f64::from(score);
        match match_type {
            MatchType::Exact => confidence += weights.exact_boost,
            MatchType::Prefix => confidence += weights.prefix_boost,
            _ => {}
        }
        if query.trim().chars().count() < weights.short_query_len {
            confidence *= weights.short_query_penalty;
        }
        clamp_score(confidence)
    }

    /// Query the catalog once per variation and merge by candidate id.
    fn search_variations(&self, variations: &[String]) -> CandidatePool {
        let mut pool = CandidatePool::default();
        let mut seen: HashSet<String> = HashSet::new();

        for variation in variations {
            let result = self.config.retry.run(variation, || {
                self.catalog.search(variation, self.config.per_query_limit)
            });

            match result {
                Ok(candidates) => {
                    debug!(query = %variation, rows = candidates.len(), "Catalog search");
                    for candidate in candidates {
                        if seen.insert(candidate.id.clone()) {
                            pool.found.push((candidate, variation.clone()));
                        }
                    }
                }
                Err(err) => {
                    warn!(query = %variation, error = %err, "Catalog search failed");
                    pool.failed_calls += 1;
                    pool.last_error = Some(err.to_string());
                }
            }
        }

        pool
    }

    fn unmatched(&self, mention: &str, normalized: NormalizedName, pool: CandidatePool) -> UnmatchedEntry {
        let (reason, error) = match pool.last_error {
            Some(message) => (UnmatchedReason::SearchError, Some(message)),
            None => (UnmatchedReason::NotFound, None),
        };
        debug!(mention, %reason, "No usable catalog candidates");
        UnmatchedEntry {
            original_text: mention.to_string(),
            normalized_text: normalized.text,
            reason,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogError, CatalogResult};
    use crate::db::Database;
    use std::cell::RefCell;

    fn product(id: &str, name: &str, generic: Option<&str>, price: f64) -> CatalogCandidate {
        let mut item = CatalogCandidate::new(id.into(), name.into(), price);
        item.generic_name = generic.map(Into::into);
        item
    }

    fn setup_db_with_catalog() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.upsert_product(&product("P1", "Paracetamol 500mg", Some("Paracetamol"), 25.0))
            .unwrap();
        db.upsert_product(&product("P2", "Paracetamol 650mg", Some("Paracetamol"), 32.0))
            .unwrap();
        db.upsert_product(&product("P3", "Crocin Advance", Some("Paracetamol"), 40.0))
            .unwrap();
        db.upsert_product(&product("P4", "Dolo 650", Some("Paracetamol"), 30.0))
            .unwrap();
        db.upsert_product(&product("P5", "Aspirin 100mg", Some("Acetylsalicylic Acid"), 12.0))
            .unwrap();
        db.upsert_product(&product("P6", "Amoxicillin 250mg", Some("Amoxicillin"), 80.0))
            .unwrap();
        db
    }

    fn resolver(db: &Database) -> Resolver<'_, Database> {
        Resolver::with_config(db, MatcherConfig::immediate())
    }

    /// Catalog that fails for specific queries and records every call.
    struct FlakyCatalog {
        inner: Database,
        failing: Vec<String>,
        calls: RefCell<Vec<String>>,
    }

    impl CatalogSearch for FlakyCatalog {
        fn search(&self, query: &str, limit: usize) -> CatalogResult<Vec<CatalogCandidate>> {
            self.calls.borrow_mut().push(query.to_string());
            if self.failing.iter().any(|q| q == query) {
                return Err(CatalogError::Unavailable("simulated outage".into()));
            }
            self.inner.search_products(query, limit).map_err(Into::into)
        }
    }

    #[test]
    fn test_resolve_exact() {
        let db = setup_db_with_catalog();
        let result = resolver(&db).resolve("Paracetamol 500mg");

        let Resolution::Matched(m) = result else {
            panic!("expected a match");
        };
        assert_eq!(m.best_match.candidate.id, "P1");
        assert_eq!(m.best_match.score, 100);
        assert_eq!(m.match_type, MatchType::Exact);
        assert_eq!(m.confidence, 100);
        assert_eq!(m.dosage.as_deref(), Some("500mg"));
        assert_eq!(m.normalized_text, "Paracetamol 500mg");
    }

    #[test]
    fn test_alternatives_exclude_best_and_are_sorted() {
        let db = setup_db_with_catalog();
        let Resolution::Matched(m) = resolver(&db).resolve("Paracetamol 500mg") else {
            panic!("expected a match");
        };

        assert!(!m.alternatives.is_empty());
        assert!(m.alternatives.len() <= 3);
        assert!(m
            .alternatives
            .iter()
            .all(|a| a.candidate.id != m.best_match.candidate.id));
        assert!(m.alternatives.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(m.alternatives.iter().all(|a| a.score <= m.best_match.score));
    }

    #[test]
    fn test_scores_against_normalized_name() {
        let db = setup_db_with_catalog();
        let Resolution::Matched(m) = resolver(&db).resolve("Paracetamol#650mg") else {
            panic!("expected a match");
        };
        assert_eq!(m.normalized_text, "Paracetamol 650mg");
        assert_eq!(m.best_match.candidate.id, "P2");
        assert_eq!(m.match_type, MatchType::Exact);
        // The raw text never hits the catalog; the normalized variation does
        assert_eq!(m.best_match.matched_variation, "Paracetamol 650mg");
    }

    #[test]
    fn test_resolve_through_ocr_noise() {
        let db = setup_db_with_catalog();
        let Resolution::Matched(m) = resolver(&db).resolve("tab. Amoxicillin 250mg") else {
            panic!("expected a match");
        };
        assert_eq!(m.best_match.candidate.id, "P6");
    }

    #[test]
    fn test_not_found() {
        let db = setup_db_with_catalog();
        let result = resolver(&db).resolve("UnknownXyz123");
        assert_eq!(result.unmatched_reason(), Some(UnmatchedReason::NotFound));
    }

    #[test]
    fn test_invalid_name_skips_catalog() {
        let catalog = FlakyCatalog {
            inner: setup_db_with_catalog(),
            failing: vec![],
            calls: RefCell::new(Vec::new()),
        };
        let resolver = Resolver::with_config(&catalog, MatcherConfig::immediate());

        let result = resolver.resolve("patient name");
        assert_eq!(result.unmatched_reason(), Some(UnmatchedReason::InvalidName));
        assert!(catalog.calls.borrow().is_empty());
    }

    #[test]
    fn test_search_error_when_all_calls_fail() {
        let catalog = FlakyCatalog {
            inner: setup_db_with_catalog(),
            failing: generate_variations("Aspirin 100mg"),
            calls: RefCell::new(Vec::new()),
        };
        let resolver = Resolver::with_config(&catalog, MatcherConfig::immediate());

        let Resolution::Unmatched(entry) = resolver.resolve("Aspirin 100mg") else {
            panic!("expected unmatched");
        };
        assert_eq!(entry.reason, UnmatchedReason::SearchError);
        assert!(entry.error.unwrap().contains("simulated outage"));
    }

    #[test]
    fn test_partial_failure_uses_other_variations() {
        let catalog = FlakyCatalog {
            inner: setup_db_with_catalog(),
            failing: vec!["Aspirin 100mg".into()],
            calls: RefCell::new(Vec::new()),
        };
        let resolver = Resolver::with_config(&catalog, MatcherConfig::immediate());

        let Resolution::Matched(m) = resolver.resolve("Aspirin 100mg") else {
            panic!("expected a match");
        };
        assert_eq!(m.best_match.candidate.id, "P5");
        assert_eq!(m.match_type, MatchType::Exact);
        assert_ne!(m.best_match.matched_variation, "Aspirin 100mg");
    }

    #[test]
    fn test_one_call_per_variation() {
        let catalog = FlakyCatalog {
            inner: setup_db_with_catalog(),
            failing: vec![],
            calls: RefCell::new(Vec::new()),
        };
        let resolver = Resolver::with_config(&catalog, MatcherConfig::immediate());
        resolver.resolve("Dolo 650 tablets");

        assert_eq!(
            *catalog.calls.borrow(),
            generate_variations("Dolo 650 tablets")
        );
    }

    #[test]
    fn test_retry_policy_applied_per_call() {
        let catalog = FlakyCatalog {
            inner: setup_db_with_catalog(),
            failing: generate_variations("Crocin"),
            calls: RefCell::new(Vec::new()),
        };
        let mut config = MatcherConfig::immediate();
        config.retry.max_attempts = 3;
        let resolver = Resolver::with_config(&catalog, config);

        resolver.resolve("Crocin");
        assert_eq!(catalog.calls.borrow().len(), 3 * generate_variations("Crocin").len());
    }

    #[test]
    fn test_short_query_penalty() {
        let db = setup_db_with_catalog();
        let resolver = resolver(&db);
        assert_eq!(resolver.match_confidence("Dol", 90, MatchType::Prefix), 76);
        assert_eq!(resolver.match_confidence("Dolo", 90, MatchType::Prefix), 95);
        assert_eq!(resolver.match_confidence("Dolo 650", 60, MatchType::Fuzzy), 60);
    }

    #[test]
    fn test_generic_match_type() {
        let db = setup_db_with_catalog();
        let Resolution::Matched(m) = resolver(&db).resolve("Crocin Advanse") else {
            panic!("expected a match");
        };
        assert_eq!(m.best_match.candidate.id, "P3");
        assert_eq!(m.match_type, MatchType::Generic);
    }

    #[test]
    fn test_resolve_all_keeps_order() {
        let db = setup_db_with_catalog();
        let results = resolver(&db).resolve_all(&["Aspirin 100mg", "UnknownXyz123", "Dolo 650"]);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_matched());
        assert!(!results[1].is_matched());
        assert!(results[2].is_matched());
    }
}
