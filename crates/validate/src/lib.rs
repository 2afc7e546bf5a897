//! Field Survey Answer Validation
//!
//! Decides whether a field agent's submission is acceptable before anything is
//! persisted. Validation is pure: the same payload, catalog, mode and date
//! always produce the same report, so batches can run in parallel.
//!
//! ## What we do here
//!
//! - **Index questionnaires** - [`QuestionCatalog`] flattens sections and
//!   rejects incoherent structure (dangling or cyclic visibility conditions,
//!   choice questions without options, broken patterns).
//! - **Evaluate visibility** - [`is_applicable`] decides whether a conditional
//!   question currently applies. Hidden required questions are never demanded.
//! - **Check each answer** - [`AnswerValidator`] dispatches on question type;
//!   the security screen rejects SQL and markup injection and oversize text.
//! - **Check across answers** - [`BusinessRuleEngine`] runs named rules such as
//!   age vs. declared age bracket.
//! - **Score completion** - [`completion_percentage`] weights required answers
//!   at 70% and optional ones at 30%.
//!
//! ## Main entry point
//!
//! [`SubmissionValidator::validate`] runs everything and returns a
//! [`ValidationReport`] keyed by field path.
//!
//! ```
//! use chrono::NaiveDate;
//! use validate::{
//!     Answer, Question, QuestionCatalog, QuestionType, SubmissionMetadata, SubmissionPayload,
//!     SubmissionValidator, ValidationMode,
//! };
//!
//! let catalog = QuestionCatalog::new(
//!     "canvass-2024",
//!     vec![Question::new("is_registered", QuestionType::SingleChoice)
//!         .required()
//!         .with_options(["yes", "no"])],
//! )
//! .unwrap();
//!
//! let payload = SubmissionPayload {
//!     questionnaire_id: "canvass-2024".into(),
//!     respondent_name: "Ana Pérez".into(),
//!     respondent_email: Some("ana@example.org".into()),
//!     respondent_phone: None,
//!     answers: vec![Answer::text("is_registered", "maybe")],
//!     metadata: SubmissionMetadata {
//!         started_at: "2024-01-01T09:00:00Z".into(),
//!         completed_at: None,
//!         device: None,
//!     },
//!     is_draft: false,
//! };
//!
//! let as_of = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
//! let report = SubmissionValidator::default().validate(&payload, &catalog, ValidationMode::Final, as_of);
//!
//! assert!(!report.is_valid);
//! assert_eq!(report.errors_for("answers.is_registered").len(), 1);
//! ```
mod answer;
mod answers;
mod catalog;
mod condition;
mod config;
mod dates;
mod error;
mod report;
mod rules;
mod scoring;
mod security;
mod submission;
mod types;

pub use crate::answer::{is_valid_email, is_valid_phone, AnswerValidator};
pub use crate::answers::AnswerMap;
pub use crate::catalog::QuestionCatalog;
pub use crate::condition::{
    applicable_questions, condition_holds, is_applicable, resolve_visibility, VisibilityMap,
};
pub use crate::config::{
    BusinessRuleConfig, DependentField, ValidationConfig, Vocabulary, VotingHistoryQuestion,
};
pub use crate::dates::{age_on, parse_date, parse_timestamp};
pub use crate::error::{CatalogError, ConfigError};
pub use crate::report::{answer_path, rule_path, FieldMessages, ValidationReport};
pub use crate::rules::{
    parse_age_bracket, AgeBracket, BusinessRule, BusinessRuleEngine, RuleFindings, RuleInput,
    RuleReport,
};
pub use crate::scoring::{completion_breakdown, completion_percentage, CompletionBreakdown};
pub use crate::security::{screen_answer, screen_text, SecurityViolation};
pub use crate::submission::SubmissionValidator;
pub use crate::types::{
    Answer, AnswerValue, ConditionOperator, ConditionValue, FieldRole, Question, QuestionType,
    QuestionnaireDefinition, Section, SubmissionMetadata, SubmissionPayload, ValidationMode,
    ValidationRules, Visibility, VisibilityCondition,
};
