//! Configuration types for submission validation.
//!
//! [`ValidationConfig`] carries the numeric limits the validators enforce and a
//! [`BusinessRuleConfig`] naming the questions each cross-field rule reads.
//! Both are cheap to clone and deserialize from JSON/YAML.
//!
//! ```rust
//! use validate::ValidationConfig;
//!
//! let config = ValidationConfig::default();
//! config.validate().expect("defaults are consistent");
//! assert_eq!(config.max_text_length, 10_000);
//! ```
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Limits applied by the answer validator and the payload checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Hard ceiling on any textual value, in characters.
    ///
    /// Default: `10_000`
    pub max_text_length: usize,

    /// Minimum meaningful length for required long-text answers that declare
    /// no explicit `min_length`.
    ///
    /// Default: `10`
    pub min_long_text_length: usize,

    /// Minimum respondent display name length (trimmed, in characters).
    ///
    /// Default: `2`
    pub min_respondent_name_length: usize,

    /// Age a respondent must have reached.
    ///
    /// Default: `18`
    pub adult_age: u32,

    /// Birth dates further back than this are implausible.
    ///
    /// Default: `120`
    pub max_age_years: u32,

    /// Lower bound for numeric-scale questions without an explicit `min`.
    ///
    /// Default: `0.0`
    pub default_scale_min: f64,

    /// Upper bound for numeric-scale questions without an explicit `max`.
    ///
    /// Default: `10.0`
    pub default_scale_max: f64,

    /// Question ids and vocabularies used by the business rules.
    pub rules: BusinessRuleConfig,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_text_length: 10_000,
            min_long_text_length: 10,
            min_respondent_name_length: 2,
            adult_age: 18,
            max_age_years: 120,
            default_scale_min: 0.0,
            default_scale_max: 10.0,
            rules: BusinessRuleConfig::default(),
        }
    }
}

impl ValidationConfig {
    /// Checks internal consistency. Call once at start-up.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_text_length == 0 {
            return Err(ConfigError::ZeroTextCeiling);
        }
        if self.default_scale_min > self.default_scale_max {
            return Err(ConfigError::InvertedScaleBounds {
                min: self.default_scale_min,
                max: self.default_scale_max,
            });
        }
        if self.adult_age >= self.max_age_years {
            return Err(ConfigError::InvalidAgeLimits {
                adult: self.adult_age,
                max: self.max_age_years,
            });
        }
        self.rules.vocabulary.validate()
    }
}

/// A yes/no gate and the follow-up it controls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependentField {
    pub gate: String,
    pub follow_up: String,
}

/// A past-election participation question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingHistoryQuestion {
    pub question_id: String,
    pub year: i32,
}

/// Words recognized as "yes" and "no" answers (compared case-insensitively).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vocabulary {
    pub affirmative: Vec<String>,
    pub negative: Vec<String>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            affirmative: ["yes", "si", "sí", "y", "true"]
                .into_iter()
                .map(String::from)
                .collect(),
            negative: ["no", "n", "false"].into_iter().map(String::from).collect(),
        }
    }
}

impl Vocabulary {
    pub fn is_affirmative(&self, value: &str) -> bool {
        contains_word(&self.affirmative, value)
    }

    pub fn is_negative(&self, value: &str) -> bool {
        contains_word(&self.negative, value)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.affirmative.is_empty() {
            return Err(ConfigError::EmptyVocabulary("affirmative"));
        }
        if self.negative.is_empty() {
            return Err(ConfigError::EmptyVocabulary("negative"));
        }
        if let Some(word) = self.affirmative.iter().find(|w| self.is_negative(w)) {
            return Err(ConfigError::OverlappingVocabulary(word.clone()));
        }
        Ok(())
    }
}

fn contains_word(words: &[String], value: &str) -> bool {
    let value = value.trim().to_lowercase();
    words.iter().any(|w| w.trim().to_lowercase() == value)
}

/// Question ids read by each business rule.
///
/// A rule whose questions are absent from a submission is skipped, so the
/// same config serves questionnaires that only carry some of these fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessRuleConfig {
    pub birth_date: String,
    pub age_range: String,
    pub dependent_fields: Vec<DependentField>,
    pub voting_history: Vec<VotingHistoryQuestion>,
    pub needs_transportation: String,
    pub has_transportation: String,
    pub intends_to_vote: String,
    /// Answers that may stand in for the respondent's email/phone fields.
    pub contact_questions: Vec<String>,
    /// Sentinel meaning "this follow-up does not apply".
    pub not_applicable: String,
    pub vocabulary: Vocabulary,
}

impl Default for BusinessRuleConfig {
    fn default() -> Self {
        Self {
            birth_date: "birth_date".into(),
            age_range: "age_range".into(),
            dependent_fields: vec![DependentField {
                gate: "is_registered".into(),
                follow_up: "registration_location".into(),
            }],
            voting_history: [2016, 2018, 2020, 2022]
                .into_iter()
                .map(|year| VotingHistoryQuestion {
                    question_id: format!("voted_{year}"),
                    year,
                })
                .collect(),
            needs_transportation: "needs_transportation".into(),
            has_transportation: "has_transportation".into(),
            intends_to_vote: "intends_to_vote".into(),
            contact_questions: Vec::new(),
            not_applicable: "not_applicable".into(),
            vocabulary: Vocabulary::default(),
        }
    }
}
