//! Read-only index over a questionnaire's questions.
//!
//! Sections are flattened in authoring order. Building a catalog checks the
//! structure once so that validation never has to second-guess it:
//!
//! - question ids are unique
//! - choice questions declare options
//! - `pattern` rules compile and `min`/`max` pairs are ordered
//! - visibility conditions reference existing questions other than themselves
//! - the condition graph (question -> question it depends on) is acyclic
use std::collections::HashMap;

use regex::Regex;

use crate::error::CatalogError;
use crate::types::{Question, QuestionnaireDefinition, Section};

#[derive(Debug, Clone)]
pub struct QuestionCatalog {
    questionnaire_id: String,
    questions: Vec<Question>,
    index: HashMap<String, usize>,
    /// Compiled `pattern` rules by question id.
    patterns: HashMap<String, Regex>,
}

impl QuestionCatalog {
    /// Build a catalog from a flat question list.
    pub fn new(
        questionnaire_id: impl Into<String>,
        questions: Vec<Question>,
    ) -> Result<Self, CatalogError> {
        let mut index = HashMap::with_capacity(questions.len());
        for (position, question) in questions.iter().enumerate() {
            if index.insert(question.id.clone(), position).is_some() {
                return Err(CatalogError::DuplicateQuestion(question.id.clone()));
            }
        }

        let mut catalog = Self {
            questionnaire_id: questionnaire_id.into(),
            questions,
            index,
            patterns: HashMap::new(),
        };
        catalog.patterns = catalog.check_questions()?;
        catalog.check_condition_graph()?;
        Ok(catalog)
    }

    /// Flatten ordered sections into one catalog.
    pub fn from_sections(
        questionnaire_id: impl Into<String>,
        sections: Vec<Section>,
    ) -> Result<Self, CatalogError> {
        let questions = sections
            .into_iter()
            .flat_map(|section| section.questions)
            .collect();
        Self::new(questionnaire_id, questions)
    }

    pub fn from_definition(definition: QuestionnaireDefinition) -> Result<Self, CatalogError> {
        Self::from_sections(definition.id, definition.sections)
    }

    /// Decode a [`QuestionnaireDefinition`] document and build its catalog.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let definition: QuestionnaireDefinition = serde_json::from_str(json)?;
        Self::from_definition(definition)
    }

    pub fn questionnaire_id(&self) -> &str {
        &self.questionnaire_id
    }

    /// Questions in authoring order.
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn get(&self, question_id: &str) -> Option<&Question> {
        self.index.get(question_id).map(|&pos| &self.questions[pos])
    }

    /// The compiled `pattern` rule of `question_id`, if it declares one.
    pub fn pattern(&self, question_id: &str) -> Option<&Regex> {
        self.patterns.get(question_id)
    }

    pub fn contains(&self, question_id: &str) -> bool {
        self.index.contains_key(question_id)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Checks every question and returns the compiled patterns.
    fn check_questions(&self) -> Result<HashMap<String, Regex>, CatalogError> {
        let mut patterns = HashMap::new();
        for question in &self.questions {
            if question.kind.is_choice() && question.options.is_empty() {
                return Err(CatalogError::MissingOptions(question.id.clone()));
            }

            let rules = &question.rules;
            if let Some(pattern) = &rules.pattern {
                let compiled = Regex::new(pattern).map_err(|source| CatalogError::InvalidPattern {
                    question: question.id.clone(),
                    source,
                })?;
                patterns.insert(question.id.clone(), compiled);
            }
            if matches!((rules.min_length, rules.max_length), (Some(lo), Some(hi)) if lo > hi) {
                return Err(inverted(question, "length"));
            }
            if matches!((rules.min, rules.max), (Some(lo), Some(hi)) if lo > hi) {
                return Err(inverted(question, "numeric"));
            }
            if matches!((rules.min_selections, rules.max_selections), (Some(lo), Some(hi)) if lo > hi)
            {
                return Err(inverted(question, "selection"));
            }

            let Some(visibility) = &question.visible_if else {
                continue;
            };
            if visibility.conditions().is_empty() {
                return Err(CatalogError::EmptyCondition(question.id.clone()));
            }
            for condition in visibility.conditions() {
                if condition.question_id == question.id {
                    return Err(CatalogError::SelfReference(question.id.clone()));
                }
                if !self.contains(&condition.question_id) {
                    return Err(CatalogError::UnknownConditionTarget {
                        question: question.id.clone(),
                        target: condition.question_id.clone(),
                    });
                }
            }
        }
        Ok(patterns)
    }

    /// Depth-first search over condition edges; a back edge is a cycle.
    fn check_condition_graph(&self) -> Result<(), CatalogError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        let mut marks = vec![Mark::Unvisited; self.questions.len()];

        for start in 0..self.questions.len() {
            if marks[start] != Mark::Unvisited {
                continue;
            }
            // Stack of (question position, next dependency to explore).
            let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
            marks[start] = Mark::InProgress;

            while let Some(top) = stack.last_mut() {
                let node = top.0;
                let deps = self.dependencies(node);
                if top.1 >= deps.len() {
                    marks[node] = Mark::Done;
                    stack.pop();
                    continue;
                }
                let dep = deps[top.1];
                top.1 += 1;
                match marks[dep] {
                    Mark::Unvisited => {
                        marks[dep] = Mark::InProgress;
                        stack.push((dep, 0));
                    }
                    Mark::InProgress => {
                        let mut path: Vec<String> = stack
                            .iter()
                            .skip_while(|(pos, _)| *pos != dep)
                            .map(|(pos, _)| self.questions[*pos].id.clone())
                            .collect();
                        path.push(self.questions[dep].id.clone());
                        return Err(CatalogError::ConditionCycle(path));
                    }
                    Mark::Done => {}
                }
            }
        }
        Ok(())
    }

    fn dependencies(&self, position: usize) -> Vec<usize> {
        self.questions[position]
            .visible_if
            .as_ref()
            .map(|visibility| {
                visibility
                    .conditions()
                    .iter()
                    .filter_map(|condition| self.index.get(&condition.question_id).copied())
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn inverted(question: &Question, rule: &'static str) -> CatalogError {
    CatalogError::InvertedBounds {
        question: question.id.clone(),
        rule,
    }
}
