//! Security screen for free-form values.
//!
//! Every textual piece of a submission is checked for SQL injection
//! heuristics, script/markup injection markers and an absolute length
//! ceiling. Offending values are reported, never rewritten: a stripped answer
//! would silently differ from what the respondent said.
use once_cell::sync::Lazy;
use regex::{Regex, RegexSet};

use crate::types::AnswerValue;

static SQL_PATTERNS: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"(?i)\bunion\s+(all\s+)?select\b",
        r"(?i)\bselect\s+(\*|[\w.]+(\s*,\s*[\w.]+)*)\s+from\s+\w+\s*(\bwhere\b|;|--)",
        r"(?i)\b(insert\s+into|delete\s+from|drop\s+(table|database|schema)|truncate\s+table|alter\s+table)\b",
        r"(?i)'\s*(or|and)\s+'?\w+'?\s*=\s*'?\w+",
        r"(?i)(;|')\s*--",
        r"/\*.*?\*/",
        r"(?i)\b(xp|sp)_\w+\s*\(|\bexec(ute)?\s+(xp|sp)_\w+",
        r"(?i);\s*(drop|delete|insert|update|truncate|alter|create|exec)\b",
    ])
    .unwrap_or_else(|err| panic!("invalid SQL screen pattern: {err}"))
});

static MARKUP_PATTERNS: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"(?i)<\s*/?\s*(script|iframe|object|embed|applet|meta|link|style|svg|img|form|base)\b",
        r"(?i)\b(javascript|vbscript)\s*:",
        r"(?i)<[^>]*\bon[a-z]+\s*=",
        r"(?i)data\s*:\s*text/html",
    ])
    .unwrap_or_else(|err| panic!("invalid markup screen pattern: {err}"))
});

static CONTROL_CHARS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F]")
        .unwrap_or_else(|err| panic!("invalid control character pattern: {err}"))
});

/// One reason a value failed the screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityViolation {
    SqlInjection,
    MarkupInjection,
    ControlCharacters,
    TooLong { length: usize, max: usize },
}

impl SecurityViolation {
    pub fn message(&self) -> String {
        match self {
            SecurityViolation::SqlInjection => "contains disallowed SQL syntax".to_string(),
            SecurityViolation::MarkupInjection => {
                "contains disallowed script or markup content".to_string()
            }
            SecurityViolation::ControlCharacters => {
                "contains disallowed control characters".to_string()
            }
            SecurityViolation::TooLong { length, max } => {
                format!("is {length} characters long, exceeding the maximum of {max}")
            }
        }
    }
}

/// Screens a single string.
pub fn screen_text(value: &str, max_length: usize) -> Vec<SecurityViolation> {
    let mut violations = Vec::new();
    let length = value.chars().count();
    if length > max_length {
        violations.push(SecurityViolation::TooLong {
            length,
            max: max_length,
        });
    }
    if SQL_PATTERNS.is_match(value) {
        violations.push(SecurityViolation::SqlInjection);
    }
    if MARKUP_PATTERNS.is_match(value) {
        violations.push(SecurityViolation::MarkupInjection);
    }
    if CONTROL_CHARS.is_match(value) {
        violations.push(SecurityViolation::ControlCharacters);
    }
    violations
}

/// Screens every textual piece of an answer. Numbers carry no text and always
/// pass. A violation found in several list items is reported once.
pub fn screen_answer(value: &AnswerValue, max_length: usize) -> Vec<SecurityViolation> {
    match value {
        AnswerValue::Text(text) => screen_text(text, max_length),
        AnswerValue::Number(_) => Vec::new(),
        AnswerValue::List(items) => {
            let mut violations: Vec<SecurityViolation> = Vec::new();
            for violation in items.iter().flat_map(|item| screen_text(item, max_length)) {
                if !violations.contains(&violation) {
                    violations.push(violation);
                }
            }
            violations
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 10_000;

    #[test]
    fn ordinary_answers_pass() {
        for value in [
            "Calle 5 #23, Colonia Centro",
            "I'd select one candidate from the list",
            "O'Brien",
            "Drop-off at the school, then update me by phone",
            "Me gustaría más transporte público; es difícil llegar",
            "5 < 7 and 8 > 3",
        ] {
            assert!(screen_text(value, MAX).is_empty(), "flagged: {value}");
        }
    }

    #[test]
    fn sql_heuristics_fire() {
        for value in [
            "' OR 1=1 --",
            "x' or 'a'='a",
            "1; DROP TABLE submissions",
            "name UNION ALL SELECT password FROM users",
            "SELECT * FROM users WHERE 1",
            "admin'--",
            "exec xp_cmdshell 'dir'",
            "a /* hidden */ b",
        ] {
            assert!(
                screen_text(value, MAX).contains(&SecurityViolation::SqlInjection),
                "missed: {value}"
            );
        }
    }

    #[test]
    fn markup_markers_fire() {
        for value in [
            "<script>alert(1)</script>",
            "< SCRIPT src=x>",
            "<img src=x onerror=alert(1)>",
            "javascript:alert(1)",
            "<iframe src='//evil'>",
            "data:text/html;base64,AAAA",
        ] {
            assert!(
                screen_text(value, MAX).contains(&SecurityViolation::MarkupInjection),
                "missed: {value}"
            );
        }
    }

    #[test]
    fn length_ceiling_counts_characters() {
        let exact = "ñ".repeat(MAX);
        assert!(screen_text(&exact, MAX).is_empty());
        let over = "a".repeat(MAX + 1);
        assert_eq!(
            screen_text(&over, MAX),
            vec![SecurityViolation::TooLong {
                length: MAX + 1,
                max: MAX
            }]
        );
    }

    #[test]
    fn list_items_are_screened_and_deduplicated() {
        let value = AnswerValue::List(vec![
            "<script>".into(),
            "fine".into(),
            "<svg onload=x>".into(),
        ]);
        assert_eq!(
            screen_answer(&value, MAX),
            vec![SecurityViolation::MarkupInjection]
        );
        assert!(screen_answer(&AnswerValue::Number(3.0), MAX).is_empty());
    }

    #[test]
    fn control_characters_rejected() {
        assert!(screen_text("abc\u{0007}", MAX).contains(&SecurityViolation::ControlCharacters));
        assert!(screen_text("line one\nline two\ttab", MAX).is_empty());
    }
}
