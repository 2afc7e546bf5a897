//! Answer lookup keyed by question id.
use std::collections::BTreeMap;

use crate::types::{Answer, AnswerValue};

/// Borrowed view of a submission's answers, one entry per question id.
///
/// Built with [`AnswerMap::build`], which keeps the first answer for a question
/// and reports every later duplicate instead of silently overwriting.
#[derive(Debug, Clone, Default)]
pub struct AnswerMap<'a> {
    by_id: BTreeMap<&'a str, &'a Answer>,
}

impl<'a> AnswerMap<'a> {
    /// Index `answers` by question id. Returns the map and the ids that
    /// appeared more than once (each reported once).
    pub fn build(answers: &'a [Answer]) -> (Self, Vec<String>) {
        let mut by_id = BTreeMap::new();
        let mut duplicates: Vec<String> = Vec::new();
        for answer in answers {
            let id = answer.question_id.as_str();
            if by_id.contains_key(id) {
                if !duplicates.iter().any(|d| d == id) {
                    duplicates.push(id.to_string());
                }
                continue;
            }
            by_id.insert(id, answer);
        }
        (Self { by_id }, duplicates)
    }

    /// Convenience for callers that already know there are no duplicates.
    pub fn from_answers(answers: &'a [Answer]) -> Self {
        Self::build(answers).0
    }

    pub fn get(&self, question_id: &str) -> Option<&'a Answer> {
        self.by_id.get(question_id).copied()
    }

    /// The answer's value, or `None` when the answer is absent or empty.
    pub fn value(&self, question_id: &str) -> Option<&'a AnswerValue> {
        self.get(question_id)
            .filter(|answer| !answer.is_empty())
            .and_then(|answer| answer.value.as_ref())
    }

    /// Trimmed text of a non-empty text answer.
    pub fn text(&self, question_id: &str) -> Option<&'a str> {
        self.value(question_id).and_then(AnswerValue::as_text)
    }

    pub fn is_answered(&self, question_id: &str) -> bool {
        self.value(question_id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a Answer)> + '_ {
        self.by_id.iter().map(|(id, answer)| (*id, *answer))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
