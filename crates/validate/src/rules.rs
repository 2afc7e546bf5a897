//! Cross-field business rules.
//!
//! Each rule is an independent [`BusinessRule`]. Rules read the answers they
//! need by question id and skip themselves when those answers are absent. The
//! engine runs every rule; one failing rule never hides another.
//!
//! Severity follows a simple policy: factual impossibilities and structurally
//! incoherent answer pairs are errors, unusual-but-plausible combinations are
//! warnings for human review.
use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::answers::AnswerMap;
use crate::config::{BusinessRuleConfig, DependentField, Vocabulary, VotingHistoryQuestion};
use crate::dates::{age_on, parse_date};

/// Everything a rule may look at.
#[derive(Debug, Clone, Copy)]
pub struct RuleInput<'a> {
    pub answers: &'a AnswerMap<'a>,
    pub respondent_email: Option<&'a str>,
    pub respondent_phone: Option<&'a str>,
    pub as_of: NaiveDate,
}

/// Messages produced by one rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleFindings {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl RuleFindings {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            errors: vec![message.into()],
            warnings: Vec::new(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            errors: Vec::new(),
            warnings: vec![message.into()],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }
}

pub trait BusinessRule: Send + Sync {
    /// Stable identifier, used as the report key `business_rules.<name>`.
    fn name(&self) -> &'static str;

    fn check(&self, input: &RuleInput<'_>) -> RuleFindings;
}

/// Combined output of all rules, keyed by rule name. Rules that found nothing
/// are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleReport {
    pub errors: BTreeMap<String, Vec<String>>,
    pub warnings: BTreeMap<String, Vec<String>>,
}

pub struct BusinessRuleEngine {
    rules: Vec<Box<dyn BusinessRule>>,
}

impl std::fmt::Debug for BusinessRuleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusinessRuleEngine")
            .field("rules", &self.rule_names())
            .finish()
    }
}

impl Default for BusinessRuleEngine {
    fn default() -> Self {
        Self::from_config(&BusinessRuleConfig::default(), 18)
    }
}

impl BusinessRuleEngine {
    /// An engine with no rules.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// The built-in rule set, wired to the question ids in `config`.
    pub fn from_config(config: &BusinessRuleConfig, adult_age: u32) -> Self {
        let mut engine = Self::empty();
        engine.register(AgeConsistency {
            birth_date: config.birth_date.clone(),
            age_range: config.age_range.clone(),
        });
        engine.register(DependentFields {
            pairs: config.dependent_fields.clone(),
            not_applicable: config.not_applicable.clone(),
            vocabulary: config.vocabulary.clone(),
        });
        engine.register(HistoricalEligibility {
            birth_date: config.birth_date.clone(),
            history: config.voting_history.clone(),
            adult_age: i32::try_from(adult_age).unwrap_or(i32::MAX),
            vocabulary: config.vocabulary.clone(),
        });
        engine.register(TransportationMismatch {
            needs: config.needs_transportation.clone(),
            has: config.has_transportation.clone(),
            vocabulary: config.vocabulary.clone(),
        });
        engine.register(MissingContact {
            contact_questions: config.contact_questions.clone(),
        });
        engine.register(VotingIntent {
            history: config.voting_history.clone(),
            intends_to_vote: config.intends_to_vote.clone(),
            vocabulary: config.vocabulary.clone(),
        });
        engine
    }

    pub fn register<R: BusinessRule + 'static>(&mut self, rule: R) -> &mut Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }

    /// Runs every rule and collects their findings.
    pub fn evaluate(&self, input: &RuleInput<'_>) -> RuleReport {
        let mut report = RuleReport::default();
        for rule in &self.rules {
            let findings = rule.check(input);
            if !findings.errors.is_empty() {
                report
                    .errors
                    .entry(rule.name().to_string())
                    .or_default()
                    .extend(findings.errors);
            }
            if !findings.warnings.is_empty() {
                report
                    .warnings
                    .entry(rule.name().to_string())
                    .or_default()
                    .extend(findings.warnings);
            }
        }
        report
    }
}

/// Inclusive age bracket parsed from labels like `18-25`, `18_25`, `65+` or
/// `under 18`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeBracket {
    pub min: Option<i32>,
    pub max: Option<i32>,
}

impl AgeBracket {
    pub fn contains(&self, age: i32) -> bool {
        self.min.is_none_or(|min| age >= min) && self.max.is_none_or(|max| age <= max)
    }
}

static RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,3})\s*(?:-|_|to)\s*(\d{1,3})$")
        .unwrap_or_else(|err| panic!("invalid age range pattern: {err}"))
});
static OPEN_ENDED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,3})\s*(?:\+|_?plus|or\s+(?:more|older))$")
        .unwrap_or_else(|err| panic!("invalid age range pattern: {err}"))
});
static UNDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:under|<|menos\s+de)[\s_]*(\d{1,3})$")
        .unwrap_or_else(|err| panic!("invalid age range pattern: {err}"))
});

pub fn parse_age_bracket(label: &str) -> Option<AgeBracket> {
    let label = label.trim().to_lowercase();

    if let Some(caps) = RANGE.captures(&label) {
        return Some(AgeBracket {
            min: Some(capture_number(&caps, 1)?),
            max: Some(capture_number(&caps, 2)?),
        });
    }
    if let Some(caps) = OPEN_ENDED.captures(&label) {
        return Some(AgeBracket {
            min: Some(capture_number(&caps, 1)?),
            max: None,
        });
    }
    if let Some(caps) = UNDER.captures(&label) {
        return Some(AgeBracket {
            min: None,
            max: Some(capture_number(&caps, 1)? - 1),
        });
    }
    None
}

fn capture_number(caps: &regex::Captures<'_>, group: usize) -> Option<i32> {
    caps.get(group)?.as_str().parse().ok()
}

fn birth_date(input: &RuleInput<'_>, question_id: &str) -> Option<NaiveDate> {
    input.answers.text(question_id).and_then(parse_date)
}

/// Age computed from the birth date must fall inside the declared bracket.
struct AgeConsistency {
    birth_date: String,
    age_range: String,
}

impl BusinessRule for AgeConsistency {
    fn name(&self) -> &'static str {
        "age_consistency"
    }

    fn check(&self, input: &RuleInput<'_>) -> RuleFindings {
        let Some(birth) = birth_date(input, &self.birth_date) else {
            return RuleFindings::default();
        };
        let Some(label) = input.answers.text(&self.age_range) else {
            return RuleFindings::default();
        };
        let Some(bracket) = parse_age_bracket(label) else {
            return RuleFindings::default();
        };
        let age = age_on(birth, input.as_of);
        if bracket.contains(age) {
            RuleFindings::default()
        } else {
            RuleFindings::error(format!(
                "age {age} computed from the birth date does not match the declared age range '{label}'"
            ))
        }
    }
}

/// Gate answered yes requires its follow-up; gate answered no forbids it.
struct DependentFields {
    pairs: Vec<DependentField>,
    not_applicable: String,
    vocabulary: Vocabulary,
}

impl BusinessRule for DependentFields {
    fn name(&self) -> &'static str {
        "dependent_fields"
    }

    fn check(&self, input: &RuleInput<'_>) -> RuleFindings {
        let mut findings = RuleFindings::default();
        for pair in &self.pairs {
            let Some(gate) = input.answers.text(&pair.gate) else {
                continue;
            };
            let follow_up = input
                .answers
                .value(&pair.follow_up)
                .filter(|value| {
                    value
                        .as_text()
                        .is_none_or(|text| !text.eq_ignore_ascii_case(&self.not_applicable))
                });

            if self.vocabulary.is_affirmative(gate) && follow_up.is_none() {
                findings.errors.push(format!(
                    "'{}' is required when '{}' is answered yes",
                    pair.follow_up, pair.gate
                ));
            } else if self.vocabulary.is_negative(gate) && follow_up.is_some() {
                findings.errors.push(format!(
                    "'{}' must be empty or '{}' when '{}' is answered no",
                    pair.follow_up, self.not_applicable, pair.gate
                ));
            }
        }
        findings
    }
}

/// Claiming to have voted in a year when the respondent was a minor.
struct HistoricalEligibility {
    birth_date: String,
    history: Vec<VotingHistoryQuestion>,
    adult_age: i32,
    vocabulary: Vocabulary,
}

impl BusinessRule for HistoricalEligibility {
    fn name(&self) -> &'static str {
        "historical_eligibility"
    }

    fn check(&self, input: &RuleInput<'_>) -> RuleFindings {
        let Some(birth) = birth_date(input, &self.birth_date) else {
            return RuleFindings::default();
        };
        let mut findings = RuleFindings::default();
        for question in &self.history {
            let voted = input
                .answers
                .text(&question.question_id)
                .is_some_and(|answer| self.vocabulary.is_affirmative(answer));
            let age_then = question.year - birth.year();
            if voted && age_then < self.adult_age {
                findings.errors.push(format!(
                    "reported voting in {} but was {age_then} years old at the time",
                    question.year
                ));
            }
        }
        findings
    }
}

struct TransportationMismatch {
    needs: String,
    has: String,
    vocabulary: Vocabulary,
}

impl BusinessRule for TransportationMismatch {
    fn name(&self) -> &'static str {
        "transportation"
    }

    fn check(&self, input: &RuleInput<'_>) -> RuleFindings {
        let yes = |id: &str| {
            input
                .answers
                .text(id)
                .is_some_and(|answer| self.vocabulary.is_affirmative(answer))
        };
        if yes(&self.needs) && yes(&self.has) {
            RuleFindings::warning(
                "respondent requests transportation but also reports having transportation available",
            )
        } else {
            RuleFindings::default()
        }
    }
}

struct MissingContact {
    contact_questions: Vec<String>,
}

impl BusinessRule for MissingContact {
    fn name(&self) -> &'static str {
        "contact_method"
    }

    fn check(&self, input: &RuleInput<'_>) -> RuleFindings {
        let present = |value: Option<&str>| value.is_some_and(|v| !v.trim().is_empty());
        let reachable = present(input.respondent_email)
            || present(input.respondent_phone)
            || self
                .contact_questions
                .iter()
                .any(|id| input.answers.is_answered(id));
        if reachable {
            RuleFindings::default()
        } else {
            RuleFindings::warning("no contact method provided for follow-up")
        }
    }
}

/// Never voted in any recorded election, yet intends to vote now.
struct VotingIntent {
    history: Vec<VotingHistoryQuestion>,
    intends_to_vote: String,
    vocabulary: Vocabulary,
}

impl BusinessRule for VotingIntent {
    fn name(&self) -> &'static str {
        "voting_intent"
    }

    fn check(&self, input: &RuleInput<'_>) -> RuleFindings {
        let intends = input
            .answers
            .text(&self.intends_to_vote)
            .is_some_and(|answer| self.vocabulary.is_affirmative(answer));
        if !intends {
            return RuleFindings::default();
        }
        let mut answered = self
            .history
            .iter()
            .filter_map(|question| input.answers.text(&question.question_id))
            .peekable();
        if answered.peek().is_none() {
            return RuleFindings::default();
        }
        if answered.all(|answer| self.vocabulary.is_negative(answer)) {
            RuleFindings::warning(
                "respondent has not voted in any recorded election but intends to vote; review for first-time voter outreach",
            )
        } else {
            RuleFindings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Answer;

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date")
    }

    fn run(answers: &[Answer], email: Option<&str>) -> RuleReport {
        let map = AnswerMap::from_answers(answers);
        let input = RuleInput {
            answers: &map,
            respondent_email: email,
            respondent_phone: None,
            as_of: as_of(),
        };
        BusinessRuleEngine::default().evaluate(&input)
    }

    #[test]
    fn brackets_parse() {
        let closed = parse_age_bracket("18-25").expect("closed range");
        assert_eq!((closed.min, closed.max), (Some(18), Some(25)));
        assert_eq!(parse_age_bracket("18_25"), Some(closed));
        assert_eq!(
            parse_age_bracket("65+"),
            Some(AgeBracket {
                min: Some(65),
                max: None
            })
        );
        assert_eq!(
            parse_age_bracket("Under 18"),
            Some(AgeBracket {
                min: None,
                max: Some(17)
            })
        );
        assert_eq!(parse_age_bracket("prefer not to say"), None);
    }

    #[test]
    fn minor_in_adult_bracket_is_an_error() {
        let report = run(
            &[
                Answer::text("birth_date", "2010-01-01"),
                Answer::text("age_range", "18-25"),
            ],
            Some("a@b.co"),
        );
        let errors = &report.errors["age_consistency"];
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("age 14"));
    }

    #[test]
    fn matching_bracket_passes() {
        let report = run(
            &[
                Answer::text("birth_date", "1990-06-15"),
                Answer::text("age_range", "26-35"),
            ],
            Some("a@b.co"),
        );
        assert!(report.errors.is_empty());
    }

    #[test]
    fn missing_inputs_skip_rules() {
        let report = run(&[Answer::text("age_range", "18-25")], Some("a@b.co"));
        assert!(report.errors.is_empty());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn dependent_fields_are_symmetric() {
        let missing = run(&[Answer::text("is_registered", "yes")], Some("a@b.co"));
        assert!(missing.errors.contains_key("dependent_fields"));

        let sentinel = run(
            &[
                Answer::text("is_registered", "yes"),
                Answer::text("registration_location", "not_applicable"),
            ],
            Some("a@b.co"),
        );
        assert!(sentinel.errors.contains_key("dependent_fields"));

        let unexpected = run(
            &[
                Answer::text("is_registered", "no"),
                Answer::text("registration_location", "Precinct 4"),
            ],
            Some("a@b.co"),
        );
        assert!(unexpected.errors.contains_key("dependent_fields"));

        let consistent_no = run(
            &[
                Answer::text("is_registered", "No"),
                Answer::text("registration_location", "not_applicable"),
            ],
            Some("a@b.co"),
        );
        assert!(consistent_no.errors.is_empty());
    }

    #[test]
    fn voting_as_a_minor_is_impossible() {
        let report = run(
            &[
                Answer::text("birth_date", "2003-03-01"),
                Answer::text("voted_2016", "yes"),
                Answer::text("voted_2022", "yes"),
            ],
            Some("a@b.co"),
        );
        let errors = &report.errors["historical_eligibility"];
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("2016"));
    }

    #[test]
    fn advisory_patterns_are_warnings_only() {
        let report = run(
            &[
                Answer::text("needs_transportation", "yes"),
                Answer::text("has_transportation", "sí"),
                Answer::text("voted_2018", "no"),
                Answer::text("voted_2020", "no"),
                Answer::text("intends_to_vote", "yes"),
            ],
            None,
        );
        assert!(report.errors.is_empty());
        let names: Vec<_> = report.warnings.keys().map(String::as_str).collect();
        assert_eq!(names, ["contact_method", "transportation", "voting_intent"]);
    }

    #[test]
    fn one_prior_vote_clears_intent_warning() {
        let report = run(
            &[
                Answer::text("voted_2018", "no"),
                Answer::text("voted_2020", "yes"),
                Answer::text("intends_to_vote", "yes"),
            ],
            Some("a@b.co"),
        );
        assert!(!report.warnings.contains_key("voting_intent"));
    }

    #[test]
    fn custom_rules_can_be_registered() {
        struct AlwaysWarn;
        impl BusinessRule for AlwaysWarn {
            fn name(&self) -> &'static str {
                "always"
            }
            fn check(&self, _: &RuleInput<'_>) -> RuleFindings {
                RuleFindings::warning("flagged")
            }
        }

        let mut engine = BusinessRuleEngine::empty();
        engine.register(AlwaysWarn);
        let answers: Vec<Answer> = Vec::new();
        let map = AnswerMap::from_answers(&answers);
        let report = engine.evaluate(&RuleInput {
            answers: &map,
            respondent_email: None,
            respondent_phone: None,
            as_of: as_of(),
        });
        assert_eq!(report.warnings["always"], vec!["flagged".to_string()]);
        assert_eq!(engine.rule_names(), ["always"]);
    }
}
