//! Weighted completion scoring.
//!
//! Only currently applicable questions count. Required questions carry 70% of
//! the score and optional ones 30%, so a draft with every required answer but
//! no optional ones still scores 70.
use serde::Serialize;

use crate::answers::AnswerMap;
use crate::catalog::QuestionCatalog;
use crate::condition::applicable_questions;
use crate::types::Answer;

const REQUIRED_WEIGHT: f64 = 0.7;
const OPTIONAL_WEIGHT: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompletionBreakdown {
    pub required_total: usize,
    pub required_answered: usize,
    pub optional_total: usize,
    pub optional_answered: usize,
    pub percentage: u8,
}

/// Completion percentage (0-100) of `answers` against `catalog`.
pub fn completion_percentage(answers: &[Answer], catalog: &QuestionCatalog) -> u8 {
    completion_breakdown(&AnswerMap::from_answers(answers), catalog).percentage
}

pub fn completion_breakdown(answers: &AnswerMap<'_>, catalog: &QuestionCatalog) -> CompletionBreakdown {
    let mut breakdown = CompletionBreakdown {
        required_total: 0,
        required_answered: 0,
        optional_total: 0,
        optional_answered: 0,
        percentage: 0,
    };
    for question in applicable_questions(catalog, answers) {
        let answered = answers.is_answered(&question.id);
        if question.required {
            breakdown.required_total += 1;
            breakdown.required_answered += usize::from(answered);
        } else {
            breakdown.optional_total += 1;
            breakdown.optional_answered += usize::from(answered);
        }
    }

    let required = fraction(breakdown.required_answered, breakdown.required_total);
    let optional = fraction(breakdown.optional_answered, breakdown.optional_total);
    let score = (REQUIRED_WEIGHT * required + OPTIONAL_WEIGHT * optional) * 100.0;
    breakdown.percentage = score.round().clamp(0.0, 100.0) as u8;
    breakdown
}

/// An empty set counts as fully answered.
fn fraction(answered: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        answered as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Question, QuestionType, Visibility, VisibilityCondition};

    fn catalog() -> QuestionCatalog {
        QuestionCatalog::new(
            "q",
            vec![
                Question::new("r1", QuestionType::ShortText).required(),
                Question::new("r2", QuestionType::ShortText).required(),
                Question::new("o1", QuestionType::ShortText),
                Question::new("gate", QuestionType::ShortText),
                Question::new("hidden", QuestionType::ShortText)
                    .required()
                    .visible_if(Visibility::Single(VisibilityCondition::equals("gate", "yes"))),
            ],
        )
        .expect("catalog builds")
    }

    #[test]
    fn empty_submission_scores_zero() {
        assert_eq!(completion_percentage(&[], &catalog()), 0);
    }

    #[test]
    fn required_only_scores_seventy() {
        let answers = vec![Answer::text("r1", "x"), Answer::text("r2", "y")];
        assert_eq!(completion_percentage(&answers, &catalog()), 70);
    }

    #[test]
    fn hidden_questions_do_not_count() {
        let answers = vec![
            Answer::text("r1", "x"),
            Answer::text("r2", "y"),
            Answer::text("o1", "z"),
            Answer::text("gate", "no"),
        ];
        assert_eq!(completion_percentage(&answers, &catalog()), 100);
    }

    #[test]
    fn opening_a_gate_adds_a_required_question() {
        let answers = vec![
            Answer::text("r1", "x"),
            Answer::text("r2", "y"),
            Answer::text("o1", "z"),
            Answer::text("gate", "yes"),
        ];
        let breakdown =
            completion_breakdown(&AnswerMap::from_answers(&answers), &catalog());
        assert_eq!(breakdown.required_total, 3);
        assert_eq!(breakdown.required_answered, 2);
        // 0.7 * 2/3 + 0.3 = 0.7667
        assert_eq!(breakdown.percentage, 77);
    }

    #[test]
    fn blank_answers_are_not_progress() {
        let answers = vec![Answer::text("r1", "   "), Answer::skipped("r2")];
        assert_eq!(completion_percentage(&answers, &catalog()), 0);
    }

    #[test]
    fn no_required_questions_defaults_required_fraction() {
        let catalog = QuestionCatalog::new(
            "q",
            vec![
                Question::new("a", QuestionType::ShortText),
                Question::new("b", QuestionType::ShortText),
            ],
        )
        .expect("catalog builds");
        let answers = vec![Answer::text("a", "x")];
        assert_eq!(completion_percentage(&answers, &catalog), 85);
    }
}
