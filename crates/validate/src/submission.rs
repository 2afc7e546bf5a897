//! One-pass validation of a whole submission.
//!
//! Findings fall into three groups:
//!
//! - **structural**: wrong questionnaire, duplicate answers, answers to
//!   questions that do not exist. Always errors, in every mode.
//! - **field**: payload fields and per-answer type/format/range/security
//!   checks, plus missing required answers.
//! - **business rule**: cross-field checks from [`BusinessRuleEngine`].
//!
//! In [`ValidationMode::Final`] field and rule errors are errors. In
//! [`ValidationMode::Draft`] they are demoted to warnings, so a draft report is
//! invalid only when it is structurally broken. Rule warnings are always
//! warnings.
use std::time::Instant;

use chrono::NaiveDate;
use rayon::prelude::*;
use tracing::{info, Level};

use crate::answer::{is_valid_email, is_valid_phone, AnswerValidator};
use crate::answers::AnswerMap;
use crate::catalog::QuestionCatalog;
use crate::condition::is_applicable;
use crate::config::ValidationConfig;
use crate::dates::parse_timestamp;
use crate::report::{answer_path, rule_path, ValidationReport};
use crate::rules::{BusinessRuleEngine, RuleInput};
use crate::scoring::completion_breakdown;
use crate::security::{screen_answer, screen_text};
use crate::types::{SubmissionPayload, ValidationMode};

#[derive(Debug)]
pub struct SubmissionValidator {
    config: ValidationConfig,
    rules: BusinessRuleEngine,
}

impl Default for SubmissionValidator {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}

impl SubmissionValidator {
    /// Validator with the built-in business rules wired from `config.rules`.
    pub fn new(config: ValidationConfig) -> Self {
        let rules = BusinessRuleEngine::from_config(&config.rules, config.adult_age);
        Self { config, rules }
    }

    /// Validator with a caller-assembled rule engine.
    pub fn with_rules(config: ValidationConfig, rules: BusinessRuleEngine) -> Self {
        Self { config, rules }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Validates `payload` against `catalog`. Never short-circuits: the
    /// report holds every finding.
    pub fn validate(
        &self,
        payload: &SubmissionPayload,
        catalog: &QuestionCatalog,
        mode: ValidationMode,
        as_of: NaiveDate,
    ) -> ValidationReport {
        let start = Instant::now();
        let span = tracing::span!(
            Level::INFO,
            "validate.submission",
            questionnaire_id = %payload.questionnaire_id,
            mode = ?mode
        );
        let _guard = span.enter();

        let mut pass = Pass {
            report: ValidationReport::default(),
            mode,
        };

        if payload.questionnaire_id != catalog.questionnaire_id() {
            pass.structural(
                "questionnaire_id",
                format!(
                    "submission targets questionnaire '{}' but was validated against '{}'",
                    payload.questionnaire_id,
                    catalog.questionnaire_id()
                ),
            );
        }
        self.check_payload_fields(payload, &mut pass);

        let (answers, duplicates) = AnswerMap::build(&payload.answers);
        for question_id in duplicates {
            pass.structural(
                answer_path(&question_id),
                "question answered more than once in the same submission",
            );
        }
        for (question_id, _) in answers.iter() {
            if !catalog.contains(question_id) {
                pass.structural(
                    answer_path(question_id),
                    format!("answer references unknown question '{question_id}'"),
                );
            }
        }

        let validator = AnswerValidator::new(&self.config, as_of).with_catalog(catalog);
        for question in catalog.questions() {
            let path = answer_path(&question.id);
            let value = answers.value(&question.id);

            if !is_applicable(question, &answers) {
                // Hidden answers are not validated, but are still stored, so
                // they are still screened.
                if let Some(value) = value {
                    for violation in screen_answer(value, self.config.max_text_length) {
                        pass.field(&path, violation.message());
                    }
                }
                continue;
            }

            let Some(value) = value else {
                if question.required {
                    pass.field(&path, "answer is required");
                }
                continue;
            };
            for message in validator.validate(question, value) {
                pass.field(&path, message);
            }
            for violation in screen_answer(value, self.config.max_text_length) {
                pass.field(&path, violation.message());
            }
        }

        let rule_report = self.rules.evaluate(&RuleInput {
            answers: &answers,
            respondent_email: payload.respondent_email.as_deref(),
            respondent_phone: payload.respondent_phone.as_deref(),
            as_of,
        });
        for (rule, messages) in rule_report.errors {
            for message in messages {
                pass.field(rule_path(&rule), message);
            }
        }
        for (rule, messages) in rule_report.warnings {
            for message in messages {
                pass.report.push_warning(rule_path(&rule), message);
            }
        }

        let breakdown = completion_breakdown(&answers, catalog);
        let mut report = pass.report;
        report.completion_percentage = breakdown.percentage;
        report.answer_count = answers.iter().filter(|(_, a)| !a.is_empty()).count();
        let report = report.finish();

        info!(
            valid = report.is_valid,
            errors = report.error_count(),
            warnings = report.warning_count(),
            completion_percentage = report.completion_percentage,
            elapsed_micros = start.elapsed().as_micros(),
            "validate_submission"
        );
        report
    }

    /// Validates many submissions in parallel. Each payload is validated in
    /// its own mode; reports come back in input order.
    pub fn validate_batch(
        &self,
        payloads: &[SubmissionPayload],
        catalog: &QuestionCatalog,
        as_of: NaiveDate,
    ) -> Vec<ValidationReport> {
        payloads
            .par_iter()
            .map(|payload| self.validate(payload, catalog, payload.mode(), as_of))
            .collect()
    }

    fn check_payload_fields(&self, payload: &SubmissionPayload, pass: &mut Pass) {
        let max_len = self.config.max_text_length;

        let name = payload.respondent_name.trim();
        let min_name = self.config.min_respondent_name_length;
        if name.chars().count() < min_name {
            pass.field(
                "respondent_name",
                format!("respondent name must be at least {min_name} characters"),
            );
        }
        for violation in screen_text(name, max_len) {
            pass.field("respondent_name", violation.message());
        }

        if let Some(email) = non_blank(payload.respondent_email.as_deref()) {
            if !is_valid_email(email) {
                pass.field("respondent_email", "is not a valid email address");
            }
        }
        if let Some(phone) = non_blank(payload.respondent_phone.as_deref()) {
            if !is_valid_phone(phone) {
                pass.field("respondent_phone", "must use the NNN-NNN-NNNN format");
            }
        }

        let metadata = &payload.metadata;
        let started = parse_timestamp(&metadata.started_at);
        if started.is_none() {
            pass.field(
                "metadata.started_at",
                format!("'{}' is not a valid timestamp", metadata.started_at),
            );
        }
        if let Some(completed_at) = non_blank(metadata.completed_at.as_deref()) {
            match parse_timestamp(completed_at) {
                None => pass.field(
                    "metadata.completed_at",
                    format!("'{completed_at}' is not a valid timestamp"),
                ),
                Some(completed) if started.is_some_and(|started| completed < started) => pass
                    .field(
                        "metadata.completed_at",
                        "completion time precedes start time",
                    ),
                Some(_) => {}
            }
        }
        if let Some(device) = metadata.device.as_deref() {
            for violation in screen_text(device, max_len) {
                pass.field("metadata.device", violation.message());
            }
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Report under construction, routing findings by mode.
struct Pass {
    report: ValidationReport,
    mode: ValidationMode,
}

impl Pass {
    fn structural(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.report.push_error(path, message);
    }

    fn field(&mut self, path: impl Into<String>, message: impl Into<String>) {
        match self.mode {
            ValidationMode::Final => self.report.push_error(path, message),
            ValidationMode::Draft => self.report.push_warning(path, message),
        }
    }
}
