//! Shared types for the re-processing pipeline.

use serde::Serialize;

use crate::email::EmailRecord;
use crate::pipeline::decision::Decision;

// ── Per-email outcome ───────────────────────────────────────────────

/// What happened to one email during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Nothing needed re-running, or nothing the stages produced differed.
    Unchanged,
    /// A delta was computed and the store confirmed it.
    Updated,
    /// Every attempted stage failed; nothing to persist.
    StageFailed,
    /// The store rejected the delta; the in-memory record keeps its old values.
    PersistFailed,
}

impl OutcomeStatus {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unchanged => "unchanged",
            Self::Updated => "updated",
            Self::StageFailed => "stage_failed",
            Self::PersistFailed => "persist_failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::StageFailed | Self::PersistFailed)
    }
}

/// Per-email report aggregated into the pass summary.
#[derive(Debug, Clone, Serialize)]
pub struct EmailOutcome {
    pub id: String,
    pub categorized: bool,
    pub extracted: bool,
    pub model_calls: u32,
    pub status: OutcomeStatus,
    /// Stage or persistence errors, in the order they happened.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl EmailOutcome {
    pub(crate) fn new(id: &str, decision: Decision) -> Self {
        Self {
            id: id.to_string(),
            categorized: decision.categorize,
            extracted: decision.extract,
            model_calls: 0,
            status: OutcomeStatus::Unchanged,
            errors: Vec::new(),
        }
    }
}

/// A single email after decide-and-process.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedEmail {
    pub email: EmailRecord,
    pub outcome: EmailOutcome,
}

// ── Pass summary ────────────────────────────────────────────────────

/// Result of one full pass over the email set.
#[derive(Debug, Clone, Serialize)]
pub struct PassSummary {
    pub success: bool,
    pub total_processed: usize,
    pub updated: usize,
    pub failed: usize,
    pub model_calls: usize,
    pub outcomes: Vec<EmailOutcome>,
    /// The in-memory email list after the pass.
    pub data: Vec<EmailRecord>,
}

impl PassSummary {
    pub(crate) fn from_outcomes(outcomes: Vec<EmailOutcome>, data: Vec<EmailRecord>) -> Self {
        let updated = outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Updated)
            .count();
        let failed = outcomes.iter().filter(|o| o.status.is_failure()).count();
        let model_calls = outcomes.iter().map(|o| o.model_calls as usize).sum();

        Self {
            success: true,
            total_processed: data.len(),
            updated,
            failed,
            model_calls,
            outcomes,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::test_support::email;

    fn outcome(id: &str, status: OutcomeStatus, calls: u32) -> EmailOutcome {
        EmailOutcome {
            model_calls: calls,
            status,
            ..EmailOutcome::new(id, Decision::default())
        }
    }

    #[test]
    fn summary_counts_outcomes() {
        let summary = PassSummary::from_outcomes(
            vec![
                outcome("a", OutcomeStatus::Updated, 2),
                outcome("b", OutcomeStatus::Unchanged, 0),
                outcome("c", OutcomeStatus::PersistFailed, 1),
                outcome("d", OutcomeStatus::StageFailed, 2),
            ],
            vec![email("a"), email("b"), email("c"), email("d")],
        );
        assert!(summary.success);
        assert_eq!(summary.total_processed, 4);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.model_calls, 5);
    }

    #[test]
    fn outcome_serialization_omits_empty_errors() {
        let json = serde_json::to_value(outcome("a", OutcomeStatus::Unchanged, 0)).unwrap();
        assert_eq!(json["status"], "unchanged");
        assert!(json.get("errors").is_none());
    }

    #[test]
    fn status_labels() {
        assert_eq!(OutcomeStatus::Updated.label(), "updated");
        assert_eq!(OutcomeStatus::PersistFailed.label(), "persist_failed");
        assert!(!OutcomeStatus::Unchanged.is_failure());
        assert!(OutcomeStatus::StageFailed.is_failure());
    }
}
