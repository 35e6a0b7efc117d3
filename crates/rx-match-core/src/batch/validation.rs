//! Review checks over a finished prescription summary.

use crate::models::{PrescriptionMatchSummary, UnmatchedReason, Validation};

/// Unmatched share (percent) above which the result is unreliable.
pub const UNMATCHED_ISSUE_RATE: f64 = 50.0;

/// Unmatched share (percent) from which a human should look.
pub const UNMATCHED_WARNING_RATE: f64 = 25.0;

/// Match confidence below which a match is flagged.
pub const LOW_CONFIDENCE: u8 = 60;

/// Check a summary for problems worth surfacing to the user.
pub fn validate_results(summary: &PrescriptionMatchSummary) -> Validation {
    let mut issues = Vec::new();
    let mut warnings = Vec::new();
    let mut suggestions: Vec<String> = Vec::new();

    let unmatched_rate = summary.unmatched_rate();
    if unmatched_rate > UNMATCHED_ISSUE_RATE {
        issues.push(format!(
            "High unmatched rate: {unmatched_rate:.0}% of medicines could not be matched"
        ));
    } else if unmatched_rate >= UNMATCHED_WARNING_RATE {
        warnings.push(format!(
            "Moderate unmatched rate: {unmatched_rate:.0}% of medicines could not be matched"
        ));
    }

    let mut low_confidence = false;
    for m in &summary.matched_medicines {
        if m.confidence < LOW_CONFIDENCE {
            low_confidence = true;
            warnings.push(format!(
                "Low confidence match for \"{}\" ({}%): matched to \"{}\"",
                m.original_text, m.confidence, m.best_match.candidate.name
            ));
        }
        if m.best_match.candidate.requires_prescription {
            warnings.push(format!(
                "\"{}\" requires a prescription; verify manually before dispensing",
                m.best_match.candidate.name
            ));
        }
    }

    let mut push_suggestion = |text: &str| {
        if !suggestions.iter().any(|s| s == text) {
            suggestions.push(text.to_string());
        }
    };
    for entry in &summary.unmatched_medicines {
        push_suggestion(entry.reason.suggestion());
    }
    if !summary.rejected_names.is_empty() {
        push_suggestion(UnmatchedReason::InvalidName.suggestion());
    }
    if low_confidence {
        push_suggestion("Review low-confidence matches and their alternatives before ordering");
    }

    let is_valid = issues.is_empty();
    let requires_review = !issues.is_empty() || !warnings.is_empty();

    Validation {
        is_valid,
        issues,
        warnings,
        suggestions,
        requires_review,
    }
}
