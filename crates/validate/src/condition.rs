//! Conditional visibility of questions.
//!
//! A question is *applicable* when its visibility declaration holds against the
//! current answers. Evaluation is a pure function of the answer set.
use std::collections::BTreeMap;

use crate::answers::AnswerMap;
use crate::catalog::QuestionCatalog;
use crate::types::{AnswerValue, ConditionOperator, ConditionValue, Question, VisibilityCondition};

pub type VisibilityMap = BTreeMap<String, bool>;

/// Questions without a condition are always applicable. Otherwise every
/// condition must hold (a single condition is a one-element `all-of`).
pub fn is_applicable(question: &Question, answers: &AnswerMap<'_>) -> bool {
    question.visible_if.as_ref().is_none_or(|visibility| {
        visibility
            .conditions()
            .iter()
            .all(|condition| condition_holds(condition, answers))
    })
}

/// A condition holds only if the referenced question has a non-empty answer
/// that satisfies the operator.
pub fn condition_holds(condition: &VisibilityCondition, answers: &AnswerMap<'_>) -> bool {
    let Some(answer) = answers.value(&condition.question_id) else {
        return false;
    };
    match condition.operator {
        ConditionOperator::Equals => matches_scalar(answer, &condition.value),
        ConditionOperator::NotEquals => !matches_scalar(answer, &condition.value),
        ConditionOperator::In => matches_any(answer, &condition.value),
        ConditionOperator::NotIn => !matches_any(answer, &condition.value),
    }
}

/// Currently applicable questions, in catalog order.
pub fn applicable_questions<'c>(
    catalog: &'c QuestionCatalog,
    answers: &AnswerMap<'_>,
) -> Vec<&'c Question> {
    catalog
        .questions()
        .iter()
        .filter(|question| is_applicable(question, answers))
        .collect()
}

pub fn resolve_visibility(catalog: &QuestionCatalog, answers: &AnswerMap<'_>) -> VisibilityMap {
    catalog
        .questions()
        .iter()
        .map(|question| (question.id.clone(), is_applicable(question, answers)))
        .collect()
}

fn matches_scalar(answer: &AnswerValue, expected: &ConditionValue) -> bool {
    match expected {
        ConditionValue::Text(text) => answer_matches(answer, text),
        ConditionValue::Number(number) => answer_matches_number(answer, *number),
        // `equals` against a list means "equals one of these".
        ConditionValue::List(items) => items.iter().any(|item| answer_matches(answer, item)),
    }
}

fn matches_any(answer: &AnswerValue, expected: &ConditionValue) -> bool {
    match expected {
        ConditionValue::List(items) => items.iter().any(|item| answer_matches(answer, item)),
        scalar => matches_scalar(answer, scalar),
    }
}

/// Text compares trimmed and case-insensitively; a multi-choice answer matches
/// when it contains the expected option.
fn answer_matches(answer: &AnswerValue, expected: &str) -> bool {
    let expected = expected.trim();
    match answer {
        AnswerValue::Text(text) => text.trim().eq_ignore_ascii_case(expected),
        AnswerValue::Number(number) => expected
            .parse::<f64>()
            .is_ok_and(|parsed| numbers_equal(*number, parsed)),
        AnswerValue::List(items) => items
            .iter()
            .any(|item| item.trim().eq_ignore_ascii_case(expected)),
    }
}

fn answer_matches_number(answer: &AnswerValue, expected: f64) -> bool {
    match answer {
        AnswerValue::Number(number) => numbers_equal(*number, expected),
        AnswerValue::Text(text) => text
            .trim()
            .parse::<f64>()
            .is_ok_and(|parsed| numbers_equal(parsed, expected)),
        AnswerValue::List(_) => false,
    }
}

fn numbers_equal(a: f64, b: f64) -> bool {
    (a - b).abs() < f64::EPSILON
}
