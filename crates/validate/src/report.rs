//! Machine-readable outcome of validating one submission.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Messages keyed by field path, e.g. `answers.<question_id>`,
/// `business_rules.<rule_name>` or `respondent_email`.
pub type FieldMessages = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// `true` iff `errors` is empty. Warnings never affect validity.
    pub is_valid: bool,
    pub errors: FieldMessages,
    pub warnings: FieldMessages,
    /// Weighted completion over the currently applicable questions, 0-100.
    pub completion_percentage: u8,
    /// Non-empty answers in the payload.
    pub answer_count: usize,
}

impl ValidationReport {
    pub fn push_error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.entry(path.into()).or_default().push(message.into());
        self.is_valid = false;
    }

    pub fn push_warning(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings
            .entry(path.into())
            .or_default()
            .push(message.into());
    }

    pub fn errors_for(&self, path: &str) -> &[String] {
        self.errors.get(path).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn warnings_for(&self, path: &str) -> &[String] {
        self.warnings.get(path).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn error_count(&self) -> usize {
        self.errors.values().map(Vec::len).sum()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.values().map(Vec::len).sum()
    }

    pub(crate) fn finish(mut self) -> Self {
        self.is_valid = self.errors.is_empty();
        self
    }
}

pub fn answer_path(question_id: &str) -> String {
    format!("answers.{question_id}")
}

pub fn rule_path(rule_name: &str) -> String {
    format!("business_rules.{rule_name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validity_tracks_errors_only() {
        let mut report = ValidationReport::default().finish();
        assert!(report.is_valid);
        report.push_warning(answer_path("q1"), "consider answering");
        assert!(report.is_valid);
        report.push_error(answer_path("q1"), "bad");
        report.push_error(answer_path("q1"), "worse");
        assert!(!report.is_valid);
        assert_eq!(report.errors_for("answers.q1").len(), 2);
        assert_eq!(report.error_count(), 2);
        assert_eq!(report.warning_count(), 1);
        assert!(report.errors_for("answers.q2").is_empty());
    }

    #[test]
    fn serializes_with_field_paths() {
        let mut report = ValidationReport::default();
        report.push_error(rule_path("age_consistency"), "mismatch");
        let json = serde_json::to_value(report.finish()).expect("report serializes");
        assert_eq!(json["is_valid"], false);
        assert_eq!(
            json["errors"]["business_rules.age_consistency"][0],
            "mismatch"
        );
    }
}
