//! Core data model for questionnaires and submissions.
//!
//! Questions are immutable once loaded into a [`QuestionCatalog`](crate::QuestionCatalog).
//! Answers arrive as a flat list of `(question id, typed value)` pairs inside a
//! [`SubmissionPayload`].
//!
//! # Type Hierarchy
//!
//! ```text
//! QuestionnaireDefinition
//! └── sections: Vec<Section>
//!     └── questions: Vec<Question>
//!         ├── kind: QuestionType
//!         ├── rules: ValidationRules
//!         └── visible_if: Option<Visibility>
//!             ├── Single(VisibilityCondition)
//!             └── AllOf { conditions }
//!
//! SubmissionPayload
//! ├── respondent_name / email / phone
//! ├── answers: Vec<Answer>
//! │   └── value: Option<AnswerValue>
//! │       ├── Text(String)
//! │       ├── Number(f64)
//! │       └── List(Vec<String>)
//! └── metadata: SubmissionMetadata
//! ```
use serde::{Deserialize, Serialize};

/// Question kinds understood by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    ShortText,
    LongText,
    SingleChoice,
    MultiChoice,
    NumericScale,
    Date,
    Email,
    Phone,
}

impl QuestionType {
    /// Whether the question declares a fixed option set.
    pub fn is_choice(self) -> bool {
        matches!(self, QuestionType::SingleChoice | QuestionType::MultiChoice)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::ShortText => "short_text",
            QuestionType::LongText => "long_text",
            QuestionType::SingleChoice => "single_choice",
            QuestionType::MultiChoice => "multi_choice",
            QuestionType::NumericScale => "numeric_scale",
            QuestionType::Date => "date",
            QuestionType::Email => "email",
            QuestionType::Phone => "phone",
        }
    }
}

/// Semantic role a question plays beyond its type.
///
/// `BirthDate` switches on the past/plausibility/adult checks for date answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldRole {
    #[default]
    General,
    BirthDate,
}

/// Per-question validation rules. Every rule is optional.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationRules {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Numeric answers must be whole numbers.
    pub integer_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_selections: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_selections: Option<usize>,
}

/// A single question inside a questionnaire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default)]
    pub rules: ValidationRules,
    #[serde(default)]
    pub role: FieldRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible_if: Option<Visibility>,
}

impl Question {
    pub fn new(id: impl Into<String>, kind: QuestionType) -> Self {
        let id = id.into();
        Self {
            text: id.clone(),
            id,
            kind,
            required: false,
            options: Vec::new(),
            rules: ValidationRules::default(),
            role: FieldRole::General,
            visible_if: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_rules(mut self, rules: ValidationRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_role(mut self, role: FieldRole) -> Self {
        self.role = role;
        self
    }

    pub fn visible_if(mut self, visibility: Visibility) -> Self {
        self.visible_if = Some(visibility);
        self
    }
}

/// Comparison applied by a [`VisibilityCondition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    #[default]
    Equals,
    NotEquals,
    In,
    NotIn,
}

/// Right-hand side of a visibility comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Text(String),
    Number(f64),
    List(Vec<String>),
}

impl From<&str> for ConditionValue {
    fn from(value: &str) -> Self {
        ConditionValue::Text(value.to_string())
    }
}

impl From<f64> for ConditionValue {
    fn from(value: f64) -> Self {
        ConditionValue::Number(value)
    }
}

impl From<Vec<&str>> for ConditionValue {
    fn from(values: Vec<&str>) -> Self {
        ConditionValue::List(values.into_iter().map(str::to_string).collect())
    }
}

/// "Show this question when `question_id <operator> value`".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisibilityCondition {
    pub question_id: String,
    #[serde(default)]
    pub operator: ConditionOperator,
    pub value: ConditionValue,
}

impl VisibilityCondition {
    pub fn new(
        question_id: impl Into<String>,
        operator: ConditionOperator,
        value: impl Into<ConditionValue>,
    ) -> Self {
        Self {
            question_id: question_id.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn equals(question_id: impl Into<String>, value: impl Into<ConditionValue>) -> Self {
        Self::new(question_id, ConditionOperator::Equals, value)
    }
}

/// Visibility declaration for a question.
///
/// Serialized with an explicit `kind` tag so a single condition and a list of
/// conditions cannot be confused:
///
/// ```json
/// { "kind": "single", "question_id": "is_registered", "value": "yes" }
/// { "kind": "all-of", "conditions": [ ... ] }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Visibility {
    Single(VisibilityCondition),
    AllOf { conditions: Vec<VisibilityCondition> },
}

impl Visibility {
    pub fn conditions(&self) -> &[VisibilityCondition] {
        match self {
            Visibility::Single(condition) => std::slice::from_ref(condition),
            Visibility::AllOf { conditions } => conditions,
        }
    }
}

/// Ordered group of questions as authored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub questions: Vec<Question>,
}

/// Questionnaire as supplied by the calling layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionnaireDefinition {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub sections: Vec<Section>,
}

/// Typed answer value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Text(String),
    Number(f64),
    List(Vec<String>),
}

impl AnswerValue {
    /// Empty strings (after trimming) and empty lists count as no answer.
    pub fn is_empty(&self) -> bool {
        match self {
            AnswerValue::Text(text) => text.trim().is_empty(),
            AnswerValue::Number(_) => false,
            AnswerValue::List(items) => items.is_empty(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AnswerValue::Text(text) => Some(text.trim()),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            AnswerValue::Text(_) => "text",
            AnswerValue::Number(_) => "number",
            AnswerValue::List(_) => "list",
        }
    }
}

/// One answer inside a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub question_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<AnswerValue>,
    #[serde(default)]
    pub skipped: bool,
}

impl Answer {
    pub fn text(question_id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            question_id: question_id.into(),
            value: Some(AnswerValue::Text(value.into())),
            skipped: false,
        }
    }

    pub fn number(question_id: impl Into<String>, value: f64) -> Self {
        Self {
            question_id: question_id.into(),
            value: Some(AnswerValue::Number(value)),
            skipped: false,
        }
    }

    pub fn list<I, S>(question_id: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            question_id: question_id.into(),
            value: Some(AnswerValue::List(
                values.into_iter().map(Into::into).collect(),
            )),
            skipped: false,
        }
    }

    pub fn skipped(question_id: impl Into<String>) -> Self {
        Self {
            question_id: question_id.into(),
            value: None,
            skipped: true,
        }
    }

    /// Skipped, missing, blank and empty-list answers are all empty.
    pub fn is_empty(&self) -> bool {
        self.skipped || self.value.as_ref().is_none_or(AnswerValue::is_empty)
    }
}

/// Client-side capture metadata. Timestamps are kept as sent so that
/// unparsable values can be reported instead of rejected at decode time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionMetadata {
    pub started_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

/// Everything a field agent sends for one respondent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionPayload {
    pub questionnaire_id: String,
    pub respondent_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub respondent_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub respondent_phone: Option<String>,
    #[serde(default)]
    pub answers: Vec<Answer>,
    pub metadata: SubmissionMetadata,
    #[serde(default)]
    pub is_draft: bool,
}

impl SubmissionPayload {
    pub fn mode(&self) -> ValidationMode {
        if self.is_draft {
            ValidationMode::Draft
        } else {
            ValidationMode::Final
        }
    }
}

/// Drafts demote field and rule findings to warnings; final submissions do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    Draft,
    Final,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visibility_single_uses_kind_tag() {
        let json = r#"{"kind":"single","question_id":"is_registered","value":"yes"}"#;
        let parsed: Visibility = serde_json::from_str(json).expect("single visibility parses");
        match parsed {
            Visibility::Single(cond) => {
                assert_eq!(cond.question_id, "is_registered");
                assert_eq!(cond.operator, ConditionOperator::Equals);
                assert_eq!(cond.value, ConditionValue::Text("yes".into()));
            }
            other => panic!("expected single, got {other:?}"),
        }
    }

    #[test]
    fn visibility_all_of_parses_list() {
        let json = r#"{"kind":"all-of","conditions":[
            {"question_id":"a","operator":"in","value":["x","y"]},
            {"question_id":"b","operator":"not_equals","value":3}
        ]}"#;
        let parsed: Visibility = serde_json::from_str(json).expect("all-of visibility parses");
        assert_eq!(parsed.conditions().len(), 2);
        assert_eq!(parsed.conditions()[1].value, ConditionValue::Number(3.0));
    }

    #[test]
    fn untagged_visibility_shape_is_rejected() {
        let json = r#"{"question_id":"a","value":"x"}"#;
        assert!(serde_json::from_str::<Visibility>(json).is_err());
    }

    #[test]
    fn answer_values_decode_by_shape() {
        let answers: Vec<Answer> = serde_json::from_str(
            r#"[
                {"question_id":"q1","value":"hola"},
                {"question_id":"q2","value":7},
                {"question_id":"q3","value":["a","b"]},
                {"question_id":"q4","skipped":true}
            ]"#,
        )
        .expect("answers decode");
        assert_eq!(answers[0].value, Some(AnswerValue::Text("hola".into())));
        assert_eq!(answers[1].value, Some(AnswerValue::Number(7.0)));
        assert_eq!(
            answers[2].value,
            Some(AnswerValue::List(vec!["a".into(), "b".into()]))
        );
        assert!(answers[3].is_empty());
    }

    #[test]
    fn emptiness_is_uniform() {
        assert!(Answer::text("q", "   ").is_empty());
        assert!(Answer::list("q", Vec::<String>::new()).is_empty());
        assert!(Answer::skipped("q").is_empty());
        assert!(!Answer::number("q", 0.0).is_empty());
        let mut skipped_with_value = Answer::text("q", "value");
        skipped_with_value.skipped = true;
        assert!(skipped_with_value.is_empty());
    }
}
