//! Error types produced by the validate crate.
//!
//! Validation findings about a submission are *not* errors: they are collected
//! into a [`ValidationReport`](crate::ValidationReport) so callers see every
//! problem in one round trip. The enums here cover the two things that can be
//! wrong before a submission is even looked at:
//!
//! | Error | When |
//! |-------|------|
//! | [`CatalogError`] | The questionnaire structure itself is incoherent |
//! | [`ConfigError`] | A [`ValidationConfig`](crate::ValidationConfig) is inconsistent |
use thiserror::Error;

/// Structural problems detected while building a [`QuestionCatalog`](crate::QuestionCatalog).
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CatalogError {
    /// The questionnaire JSON could not be decoded.
    #[error("invalid questionnaire document: {0}")]
    Parse(#[from] serde_json::Error),

    /// Two questions share an identifier.
    #[error("duplicate question id '{0}'")]
    DuplicateQuestion(String),

    /// A visibility condition points at a question that does not exist.
    #[error("question '{question}' has a visibility condition on unknown question '{target}'")]
    UnknownConditionTarget { question: String, target: String },

    /// A question's visibility depends on its own answer.
    #[error("question '{0}' has a visibility condition on itself")]
    SelfReference(String),

    /// Visibility conditions form a cycle.
    #[error("visibility conditions form a cycle: {}", .0.join(" -> "))]
    ConditionCycle(Vec<String>),

    /// An `all-of` visibility declaration with no conditions.
    #[error("question '{0}' declares an empty all-of visibility condition")]
    EmptyCondition(String),

    /// A single/multi choice question without options.
    #[error("choice question '{0}' declares no options")]
    MissingOptions(String),

    /// The regex pattern rule failed to compile.
    #[error("question '{question}' has an invalid pattern: {source}")]
    InvalidPattern {
        question: String,
        #[source]
        source: regex::Error,
    },

    /// A `min_*` rule is greater than its `max_*` counterpart.
    #[error("question '{question}' has inverted {rule} bounds")]
    InvertedBounds { question: String, rule: &'static str },
}

/// Inconsistent [`ValidationConfig`](crate::ValidationConfig) values.
///
/// These are start-up problems, surfaced before any traffic is validated.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("max_text_length must be greater than zero")]
    ZeroTextCeiling,

    #[error("default scale bounds are inverted (min {min} > max {max})")]
    InvertedScaleBounds { min: f64, max: f64 },

    #[error("adult_age ({adult}) must be below max_age_years ({max})")]
    InvalidAgeLimits { adult: u32, max: u32 },

    #[error("{0} vocabulary must not be empty")]
    EmptyVocabulary(&'static str),

    #[error("'{0}' appears in both the affirmative and negative vocabularies")]
    OverlappingVocabulary(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_error_lists_path() {
        let err = CatalogError::ConditionCycle(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(
            err.to_string(),
            "visibility conditions form a cycle: a -> b -> a"
        );
    }

    #[test]
    fn unknown_target_names_both_questions() {
        let err = CatalogError::UnknownConditionTarget {
            question: "follow_up".into(),
            target: "missing".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("follow_up"));
        assert!(msg.contains("missing"));
    }
}
