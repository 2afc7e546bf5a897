#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use fieldsurvey::{
    MemoryStore, StoreError, StoredAnswer, SubmissionPipeline, SubmissionRecord, SubmissionStore,
    Submitter,
};
use resilience::{IdempotencyCache, ResilientExecutor, RetryConfig};
use uuid::Uuid;
use validate::{
    Answer, Question, QuestionCatalog, QuestionType, SubmissionMetadata, SubmissionPayload,
    SubmissionValidator, ValidationRules, Visibility, VisibilityCondition,
};

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub fn catalog() -> QuestionCatalog {
    QuestionCatalog::new(
        "canvass-2024",
        vec![
            Question::new("is_registered", QuestionType::SingleChoice)
                .required()
                .with_options(["yes", "no"]),
            Question::new("registration_location", QuestionType::ShortText)
                .required()
                .visible_if(Visibility::Single(VisibilityCondition::equals(
                    "is_registered",
                    "yes",
                ))),
            Question::new("issues", QuestionType::MultiChoice)
                .with_options(["housing", "transit", "schools", "safety", "jobs", "parks"])
                .with_rules(ValidationRules {
                    max_selections: Some(5),
                    ..ValidationRules::default()
                }),
        ],
    )
    .expect("catalog is coherent")
}

pub fn agent() -> Submitter {
    Submitter::new("county-12", "vol-17")
}

pub fn payload(answers: Vec<Answer>, is_draft: bool) -> SubmissionPayload {
    SubmissionPayload {
        questionnaire_id: "canvass-2024".into(),
        respondent_name: "Ana Pérez".into(),
        respondent_email: Some("ana@example.org".into()),
        respondent_phone: None,
        answers,
        metadata: SubmissionMetadata {
            started_at: "2024-01-01T09:00:00Z".into(),
            completed_at: (!is_draft).then(|| "2024-01-01T09:12:00Z".into()),
            device: Some("android".into()),
        },
        is_draft,
    }
}

pub fn complete_payload() -> SubmissionPayload {
    payload(
        vec![
            Answer::text("is_registered", "no"),
            Answer::list("issues", ["housing", "transit"]),
        ],
        false,
    )
}

pub fn pipeline<S: SubmissionStore>(store: Arc<S>) -> SubmissionPipeline<S> {
    let executor = ResilientExecutor::new(
        RetryConfig::default().without_jitter(),
        Arc::new(IdempotencyCache::default()),
    );
    SubmissionPipeline::new(store, SubmissionValidator::default(), executor).with_clock(now)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    FindDraft,
    FindFinal,
    Get,
    InsertRecord,
    UpdateRecord,
    DeleteRecord,
    InsertAnswers,
    DeleteAnswers,
}

/// Wraps a [`MemoryStore`] and fails chosen operations a chosen number of
/// times before letting them through.
#[derive(Debug, Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    faults: Mutex<HashMap<Op, (u32, StoreError)>>,
    calls: Mutex<HashMap<Op, u32>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next `times` calls of `op` with `error`.
    pub fn fail(&self, op: Op, times: u32, error: StoreError) {
        self.faults.lock().unwrap().insert(op, (times, error));
    }

    pub fn calls(&self, op: Op) -> u32 {
        self.calls.lock().unwrap().get(&op).copied().unwrap_or(0)
    }

    fn trip(&self, op: Op) -> Result<(), StoreError> {
        *self.calls.lock().unwrap().entry(op).or_default() += 1;
        let mut faults = self.faults.lock().unwrap();
        match faults.get_mut(&op) {
            Some((remaining, error)) if *remaining > 0 => {
                *remaining -= 1;
                Err(error.clone())
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl SubmissionStore for FlakyStore {
    async fn find_draft(
        &self,
        tenant_id: &str,
        volunteer_id: &str,
        questionnaire_id: &str,
    ) -> Result<Option<SubmissionRecord>, StoreError> {
        self.trip(Op::FindDraft)?;
        self.inner
            .find_draft(tenant_id, volunteer_id, questionnaire_id)
            .await
    }

    async fn find_final(
        &self,
        tenant_id: &str,
        volunteer_id: &str,
        questionnaire_id: &str,
        respondent_name: &str,
    ) -> Result<Option<SubmissionRecord>, StoreError> {
        self.trip(Op::FindFinal)?;
        self.inner
            .find_final(tenant_id, volunteer_id, questionnaire_id, respondent_name)
            .await
    }

    async fn get(&self, id: Uuid) -> Result<Option<SubmissionRecord>, StoreError> {
        self.trip(Op::Get)?;
        self.inner.get(id).await
    }

    async fn answers(&self, record_id: Uuid) -> Result<Vec<StoredAnswer>, StoreError> {
        self.inner.answers(record_id).await
    }

    async fn insert_record(&self, record: &SubmissionRecord) -> Result<(), StoreError> {
        self.trip(Op::InsertRecord)?;
        self.inner.insert_record(record).await
    }

    async fn update_record(&self, record: &SubmissionRecord) -> Result<(), StoreError> {
        self.trip(Op::UpdateRecord)?;
        self.inner.update_record(record).await
    }

    async fn delete_record(&self, id: Uuid) -> Result<bool, StoreError> {
        self.trip(Op::DeleteRecord)?;
        self.inner.delete_record(id).await
    }

    async fn insert_answers(
        &self,
        record_id: Uuid,
        answers: &[StoredAnswer],
    ) -> Result<(), StoreError> {
        self.trip(Op::InsertAnswers)?;
        self.inner.insert_answers(record_id, answers).await
    }

    async fn delete_answers(&self, record_id: Uuid) -> Result<usize, StoreError> {
        self.trip(Op::DeleteAnswers)?;
        self.inner.delete_answers(record_id).await
    }
}
