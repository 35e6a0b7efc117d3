//! Engine configuration.
//!
//! Everything here is an empirical tuning value. Defaults match the values
//! the matcher was calibrated with; any of them can be overridden from JSON.

use std::path::Path;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::catalog::{CatalogResult, DEFAULT_QUERY_LIMIT};
use crate::resolver::ScoringWeights;

/// Default number of alternatives kept per match.
pub const DEFAULT_MAX_ALTERNATIVES: usize = 3;

/// Default courtesy pause between two names, in milliseconds.
pub const DEFAULT_INTER_NAME_DELAY_MS: u64 = 100;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Top-level matcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MatcherConfig {
    /// Row bound per catalog query
    pub per_query_limit: usize,
    /// Alternatives kept per match
    pub max_alternatives: usize,
    /// Pause between consecutive names (load shedding only)
    pub inter_name_delay_ms: u64,
    /// Abort the batch once this much time has elapsed
    pub batch_deadline_ms: Option<u64>,
    /// Retry policy for single catalog calls
    pub retry: RetryPolicy,
    /// Relevance score constants
    pub scoring: ScoringWeights,
    /// Confidence blending constants
    pub confidence: ConfidenceWeights,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            per_query_limit: DEFAULT_QUERY_LIMIT,
            max_alternatives: DEFAULT_MAX_ALTERNATIVES,
            inter_name_delay_ms: DEFAULT_INTER_NAME_DELAY_MS,
            batch_deadline_ms: None,
            retry: RetryPolicy::default(),
            scoring: ScoringWeights::default(),
            confidence: ConfidenceWeights::default(),
        }
    }
}

impl MatcherConfig {
    /// Load from a JSON file; missing fields take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// No delays and no retries. Intended for tests and offline tools.
    pub fn immediate() -> Self {
        Self {
            inter_name_delay_ms: 0,
            retry: RetryPolicy::none(),
            ..Self::default()
        }
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.per_query_limit == 0 {
            return Err(ConfigError::Invalid("per_query_limit must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        let w = &self.confidence;
        if [w.ocr_weight, w.match_rate_weight, w.match_confidence_weight]
            .iter()
            .any(|v| *v < 0.0 || !v.is_finite())
        {
            return Err(ConfigError::Invalid("confidence weights must be finite and >= 0".into()));
        }
        Ok(())
    }

    pub fn inter_name_delay(&self) -> Duration {
        Duration::from_millis(self.inter_name_delay_ms)
    }

    pub fn batch_deadline(&self) -> Option<Duration> {
        self.batch_deadline_ms.map(Duration::from_millis)
    }
}

/// Weights for per-match and per-batch confidence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConfidenceWeights {
    /// Share of OCR confidence in the batch score
    pub ocr_weight: f64,
    /// Share of match rate in the batch score
    pub match_rate_weight: f64,
    /// Share of mean per-match confidence in the batch score
    pub match_confidence_weight: f64,
    /// Added to a match's confidence on exact textual equality
    pub exact_boost: f64,
    /// Added to a match's confidence on prefix equality
    pub prefix_boost: f64,
    /// Queries shorter than this (in chars) are penalized
    pub short_query_len: usize,
    /// Multiplier applied to short-query confidence
    pub short_query_penalty: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            ocr_weight: 0.3,
            match_rate_weight: 0.4,
            match_confidence_weight: 0.3,
            exact_boost: 10.0,
            prefix_boost: 5.0,
            short_query_len: 4,
            short_query_penalty: 0.8,
        }
    }
}

/// Retry policy for a single catalog call.
///
/// Backoff doubles after each failed attempt, capped at `max_backoff_ms`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_backoff_ms: 200,
            max_backoff_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    /// Backoff to wait after failed attempt number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    /// Run a catalog call under this policy.
    ///
    /// Non-retryable errors are returned immediately.
    pub fn run<T, F>(&self, label: &str, mut call: F) -> CatalogResult<T>
    where
        F: FnMut() -> CatalogResult<T>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match call() {
                Ok(value) => return Ok(value),
                Err(err) if attempt < attempts && err.is_retryable() => {
                    let wait = self.backoff_for(attempt);
                    warn!(
                        query = label,
                        attempt,
                        max_attempts = attempts,
                        backoff_ms = wait.as_millis() as u64,
                        error = %err,
                        "Catalog call failed, retrying"
                    );
                    if !wait.is_zero() {
                        thread::sleep(wait);
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
