//! Per-question, type-aware validation of a single non-empty answer.
use std::borrow::Cow;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::catalog::QuestionCatalog;
use crate::config::ValidationConfig;
use crate::dates::{age_on, parse_date};
use crate::types::{AnswerValue, FieldRole, Question, QuestionType};

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$")
        .unwrap_or_else(|err| panic!("invalid email pattern: {err}"))
});

static PHONE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{3}-\d{3}-\d{4}$").unwrap_or_else(|err| panic!("invalid phone pattern: {err}"))
});

pub fn is_valid_email(value: &str) -> bool {
    let value = value.trim();
    !value.contains("..") && EMAIL.is_match(value)
}

/// Whitespace is ignored, everything else must match `NNN-NNN-NNNN`.
pub fn is_valid_phone(value: &str) -> bool {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    PHONE.is_match(&compact)
}

/// Validates answers against their question's type and rules.
///
/// Emptiness and applicability are decided by the caller; the validator only
/// ever sees answers that carry a value. `as_of` anchors the birth-date checks.
#[derive(Debug, Clone, Copy)]
pub struct AnswerValidator<'a> {
    config: &'a ValidationConfig,
    as_of: NaiveDate,
    catalog: Option<&'a QuestionCatalog>,
}

impl<'a> AnswerValidator<'a> {
    pub fn new(config: &'a ValidationConfig, as_of: NaiveDate) -> Self {
        Self {
            config,
            as_of,
            catalog: None,
        }
    }

    /// Reuse the patterns `catalog` compiled at build time.
    pub fn with_catalog(mut self, catalog: &'a QuestionCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Returns every problem found; an empty list means the answer is valid.
    pub fn validate(&self, question: &Question, value: &AnswerValue) -> Vec<String> {
        match question.kind {
            QuestionType::ShortText | QuestionType::LongText => self.check_text(question, value),
            QuestionType::Email => self.check_with_text(value, |text| {
                if is_valid_email(text) {
                    Vec::new()
                } else {
                    vec!["is not a valid email address".to_string()]
                }
            }),
            QuestionType::Phone => self.check_with_text(value, |text| {
                if is_valid_phone(text) {
                    Vec::new()
                } else {
                    vec!["must use the NNN-NNN-NNNN format".to_string()]
                }
            }),
            QuestionType::Date => {
                self.check_with_text(value, |text| self.check_date(question, text))
            }
            QuestionType::NumericScale => self.check_numeric(question, value),
            QuestionType::SingleChoice => self.check_single_choice(question, value),
            QuestionType::MultiChoice => self.check_multi_choice(question, value),
        }
    }

    fn check_with_text<F>(&self, value: &AnswerValue, check: F) -> Vec<String>
    where
        F: FnOnce(&str) -> Vec<String>,
    {
        match value.as_text() {
            Some(text) => check(text),
            None => vec![format!("expected a text answer, got {}", value.kind_name())],
        }
    }

    fn check_text(&self, question: &Question, value: &AnswerValue) -> Vec<String> {
        let Some(text) = value.as_text() else {
            return vec![format!("expected a text answer, got {}", value.kind_name())];
        };
        let rules = &question.rules;
        let mut errors = Vec::new();
        let length = text.chars().count();

        let min_length = rules.min_length.or_else(|| {
            (question.required && question.kind == QuestionType::LongText)
                .then_some(self.config.min_long_text_length)
        });
        if let Some(min) = min_length {
            if length < min {
                errors.push(format!("must be at least {min} characters"));
            }
        }
        if let Some(max) = rules.max_length {
            if length > max {
                errors.push(format!("must be at most {max} characters"));
            }
        }
        if let Some(pattern) = &rules.pattern {
            match self.compiled(question, pattern) {
                Ok(re) if !re.is_match(text) => {
                    errors.push("does not match the required format".to_string());
                }
                Ok(_) => {}
                Err(err) => errors.push(format!("format rule cannot be applied: {err}")),
            }
        }
        errors
    }

    /// The catalog's compiled copy when it holds this exact pattern, else a
    /// fresh compile.
    fn compiled(&self, question: &Question, pattern: &str) -> Result<Cow<'a, Regex>, regex::Error> {
        let cached = self
            .catalog
            .and_then(|catalog| catalog.pattern(&question.id))
            .filter(|re| re.as_str() == pattern);
        match cached {
            Some(re) => Ok(Cow::Borrowed(re)),
            None => Regex::new(pattern).map(Cow::Owned),
        }
    }

    fn check_date(&self, question: &Question, text: &str) -> Vec<String> {
        let Some(date) = parse_date(text) else {
            return vec![format!("'{text}' is not a recognized date")];
        };
        if question.role != FieldRole::BirthDate {
            return Vec::new();
        }

        if date >= self.as_of {
            return vec!["birth date must be in the past".to_string()];
        }
        let age = age_on(date, self.as_of);
        let max_age = i32::try_from(self.config.max_age_years).unwrap_or(i32::MAX);
        let adult_age = i32::try_from(self.config.adult_age).unwrap_or(i32::MAX);
        if age > max_age {
            return vec![format!(
                "birth date is implausible (more than {max_age} years ago)"
            )];
        }
        if age < adult_age {
            return vec![format!(
                "respondent must be at least {adult_age} years old (computed age {age})"
            )];
        }
        Vec::new()
    }

    fn check_numeric(&self, question: &Question, value: &AnswerValue) -> Vec<String> {
        let number = match value {
            AnswerValue::Number(number) => Some(*number),
            AnswerValue::Text(text) => text.trim().parse::<f64>().ok(),
            AnswerValue::List(_) => None,
        };
        let Some(number) = number.filter(|n| n.is_finite()) else {
            return vec!["must be a number".to_string()];
        };

        let rules = &question.rules;
        let mut errors = Vec::new();
        if rules.integer_only && number.fract() != 0.0 {
            errors.push("must be a whole number".to_string());
        }
        let min = rules.min.unwrap_or(self.config.default_scale_min);
        let max = rules.max.unwrap_or(self.config.default_scale_max);
        if number < min || number > max {
            errors.push(format!("must be between {min} and {max}"));
        }
        errors
    }

    fn check_single_choice(&self, question: &Question, value: &AnswerValue) -> Vec<String> {
        let choice = match value {
            AnswerValue::Text(text) => text.trim().to_string(),
            AnswerValue::Number(number) => number.to_string(),
            AnswerValue::List(_) => {
                return vec!["expected a single selection, got list".to_string()];
            }
        };
        if question.options.iter().any(|option| option == &choice) {
            Vec::new()
        } else {
            vec![format!("'{choice}' is not one of the allowed options")]
        }
    }

    fn check_multi_choice(&self, question: &Question, value: &AnswerValue) -> Vec<String> {
        let AnswerValue::List(selected) = value else {
            return vec![format!(
                "expected a list of selections, got {}",
                value.kind_name()
            )];
        };
        let rules = &question.rules;
        let mut errors = Vec::new();

        let count = selected.len();
        if let Some(min) = rules.min_selections {
            if count < min {
                errors.push(format!(
                    "at least {min} selections required, {count} selected"
                ));
            }
        }
        if let Some(max) = rules.max_selections {
            if count > max {
                errors.push(format!(
                    "at most {max} selections allowed, {count} selected"
                ));
            }
        }

        let mut invalid: Vec<&str> = Vec::new();
        let mut duplicates: Vec<&str> = Vec::new();
        for (position, item) in selected.iter().enumerate() {
            let item = item.as_str();
            if !question.options.iter().any(|option| option == item) && !invalid.contains(&item)
            {
                invalid.push(item);
            }
            if selected[..position].iter().any(|earlier| earlier == item)
                && !duplicates.contains(&item)
            {
                duplicates.push(item);
            }
        }
        if !invalid.is_empty() {
            errors.push(format!(
                "contains options that are not allowed: {}",
                invalid.join(", ")
            ));
        }
        if !duplicates.is_empty() {
            errors.push(format!(
                "contains duplicate selections: {}",
                duplicates.join(", ")
            ));
        }
        errors
    }
}
