//! Persisted submission entities.
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validate::{Answer, AnswerValue, SubmissionPayload, ValidationReport};

/// Who is submitting: the tenant scope and the field agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Submitter {
    pub tenant_id: String,
    pub volunteer_id: String,
}

impl Submitter {
    pub fn new(tenant_id: impl Into<String>, volunteer_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            volunteer_id: volunteer_id.into(),
        }
    }
}

/// Lifecycle state. `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Draft,
    Completed,
}

impl SubmissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionStatus::Draft => "draft",
            SubmissionStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Computed and client-reported facts stored alongside a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub completion_percentage: u8,
    pub answer_count: usize,
    pub started_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

impl RecordMetadata {
    fn from_payload(payload: &SubmissionPayload, report: &ValidationReport) -> Self {
        Self {
            completion_percentage: report.completion_percentage,
            answer_count: report.answer_count,
            started_at: payload.metadata.started_at.clone(),
            completed_at: payload.metadata.completed_at.clone(),
            device: payload.metadata.device.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub id: Uuid,
    pub tenant_id: String,
    pub volunteer_id: String,
    pub questionnaire_id: String,
    pub respondent_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub respondent_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub respondent_phone: Option<String>,
    pub status: SubmissionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: RecordMetadata,
}

impl SubmissionRecord {
    /// Builds a fresh record with a new id from a validated payload.
    pub fn new(
        submitter: &Submitter,
        payload: &SubmissionPayload,
        report: &ValidationReport,
        status: SubmissionStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: submitter.tenant_id.clone(),
            volunteer_id: submitter.volunteer_id.clone(),
            questionnaire_id: payload.questionnaire_id.clone(),
            respondent_name: payload.respondent_name.trim().to_string(),
            respondent_email: payload.respondent_email.clone(),
            respondent_phone: payload.respondent_phone.clone(),
            status,
            created_at: now,
            updated_at: now,
            metadata: RecordMetadata::from_payload(payload, report),
        }
    }

    pub fn is_final(&self) -> bool {
        self.status == SubmissionStatus::Completed
    }

    /// Replaces respondent fields and metadata with the payload's, then
    /// advances `updated_at`.
    pub fn apply(&mut self, payload: &SubmissionPayload, report: &ValidationReport, now: DateTime<Utc>) {
        self.respondent_name = payload.respondent_name.trim().to_string();
        self.respondent_email = payload.respondent_email.clone();
        self.respondent_phone = payload.respondent_phone.clone();
        self.metadata = RecordMetadata::from_payload(payload, report);
        self.touch(now);
    }

    /// Moves `updated_at` to `now`, or one microsecond past its current value
    /// when `now` is not later.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        let floor = self.updated_at + TimeDelta::microseconds(1);
        self.updated_at = now.max(floor);
    }
}

/// One answer row linked to a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAnswer {
    pub record_id: Uuid,
    pub question_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<AnswerValue>,
    #[serde(default)]
    pub skipped: bool,
}

impl StoredAnswer {
    pub fn link(record_id: Uuid, answers: &[Answer]) -> Vec<Self> {
        answers
            .iter()
            .map(|answer| StoredAnswer {
                record_id,
                question_id: answer.question_id.clone(),
                value: answer.value.clone(),
                skipped: answer.skipped,
            })
            .collect()
    }
}
