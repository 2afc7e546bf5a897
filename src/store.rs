//! Persistence boundary for submission records.
//!
//! The pipeline assumes single-row atomicity and nothing more: inserting a
//! record and inserting its answers are separate calls, and a failure between
//! them is repaired by the pipeline, not by the store.
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use resilience::{Classify, ErrorCategory};
use thiserror::Error;
use uuid::Uuid;

use crate::record::{StoredAnswer, SubmissionRecord, SubmissionStatus};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Unavailable(String),

    #[error("store timed out: {0}")]
    Timeout(String),

    #[error("store answered {status}: {message}")]
    Status { status: u16, message: String },

    #[error("record {0} not found")]
    NotFound(Uuid),

    #[error("record {0} already exists")]
    AlreadyExists(Uuid),

    #[error("store rejected the request: {0}")]
    Rejected(String),
}

impl Classify for StoreError {
    fn category(&self) -> ErrorCategory {
        match self {
            StoreError::Unavailable(_) => ErrorCategory::Network,
            StoreError::Timeout(_) => ErrorCategory::Timeout,
            StoreError::Status { status, .. } => ErrorCategory::from_status(*status),
            StoreError::NotFound(_) => ErrorCategory::NotFound,
            StoreError::AlreadyExists(_) => ErrorCategory::Conflict,
            StoreError::Rejected(_) => ErrorCategory::MalformedRequest,
        }
    }
}

/// A transactional record store reachable through simple row operations.
///
/// Deleting a record also deletes its answers.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// The volunteer's outstanding draft for a questionnaire, if any.
    async fn find_draft(
        &self,
        tenant_id: &str,
        volunteer_id: &str,
        questionnaire_id: &str,
    ) -> Result<Option<SubmissionRecord>, StoreError>;

    /// A completed record for the same respondent, if any.
    async fn find_final(
        &self,
        tenant_id: &str,
        volunteer_id: &str,
        questionnaire_id: &str,
        respondent_name: &str,
    ) -> Result<Option<SubmissionRecord>, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<SubmissionRecord>, StoreError>;

    async fn answers(&self, record_id: Uuid) -> Result<Vec<StoredAnswer>, StoreError>;

    async fn insert_record(&self, record: &SubmissionRecord) -> Result<(), StoreError>;

    async fn update_record(&self, record: &SubmissionRecord) -> Result<(), StoreError>;

    /// Returns whether a record was removed.
    async fn delete_record(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn insert_answers(
        &self,
        record_id: Uuid,
        answers: &[StoredAnswer],
    ) -> Result<(), StoreError>;

    /// Returns the number of answers removed.
    async fn delete_answers(&self, record_id: Uuid) -> Result<usize, StoreError>;
}

/// In-process store. Each operation touches one map entry under its shard
/// lock, which gives the single-row atomicity the pipeline relies on.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<Uuid, SubmissionRecord>,
    answers: DashMap<Uuid, Vec<StoredAnswer>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn records(&self) -> Vec<SubmissionRecord> {
        self.records.iter().map(|entry| entry.value().clone()).collect()
    }

    fn find(&self, predicate: impl Fn(&SubmissionRecord) -> bool) -> Option<SubmissionRecord> {
        self.records
            .iter()
            .find(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn find_draft(
        &self,
        tenant_id: &str,
        volunteer_id: &str,
        questionnaire_id: &str,
    ) -> Result<Option<SubmissionRecord>, StoreError> {
        Ok(self.find(|record| {
            record.status == SubmissionStatus::Draft
                && record.tenant_id == tenant_id
                && record.volunteer_id == volunteer_id
                && record.questionnaire_id == questionnaire_id
        }))
    }

    async fn find_final(
        &self,
        tenant_id: &str,
        volunteer_id: &str,
        questionnaire_id: &str,
        respondent_name: &str,
    ) -> Result<Option<SubmissionRecord>, StoreError> {
        Ok(self.find(|record| {
            record.status == SubmissionStatus::Completed
                && record.tenant_id == tenant_id
                && record.volunteer_id == volunteer_id
                && record.questionnaire_id == questionnaire_id
                && record.respondent_name == respondent_name
        }))
    }

    async fn get(&self, id: Uuid) -> Result<Option<SubmissionRecord>, StoreError> {
        Ok(self.records.get(&id).map(|entry| entry.value().clone()))
    }

    async fn answers(&self, record_id: Uuid) -> Result<Vec<StoredAnswer>, StoreError> {
        Ok(self
            .answers
            .get(&record_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    async fn insert_record(&self, record: &SubmissionRecord) -> Result<(), StoreError> {
        match self.records.entry(record.id) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists(record.id)),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(())
            }
        }
    }

    async fn update_record(&self, record: &SubmissionRecord) -> Result<(), StoreError> {
        match self.records.get_mut(&record.id) {
            Some(mut entry) => {
                *entry = record.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(record.id)),
        }
    }

    async fn delete_record(&self, id: Uuid) -> Result<bool, StoreError> {
        self.answers.remove(&id);
        Ok(self.records.remove(&id).is_some())
    }

    async fn insert_answers(
        &self,
        record_id: Uuid,
        answers: &[StoredAnswer],
    ) -> Result<(), StoreError> {
        if !self.records.contains_key(&record_id) {
            return Err(StoreError::NotFound(record_id));
        }
        self.answers
            .entry(record_id)
            .or_default()
            .extend_from_slice(answers);
        Ok(())
    }

    async fn delete_answers(&self, record_id: Uuid) -> Result<usize, StoreError> {
        Ok(self
            .answers
            .remove(&record_id)
            .map(|(_, rows)| rows.len())
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Submitter;
    use chrono::Utc;
    use validate::{Answer, SubmissionMetadata, SubmissionPayload, ValidationReport};

    fn record(status: SubmissionStatus) -> SubmissionRecord {
        let payload = SubmissionPayload {
            questionnaire_id: "canvass-2024".into(),
            respondent_name: "Ana".into(),
            respondent_email: None,
            respondent_phone: None,
            answers: Vec::new(),
            metadata: SubmissionMetadata {
                started_at: "2024-03-01T10:00:00Z".into(),
                completed_at: None,
                device: None,
            },
            is_draft: status == SubmissionStatus::Draft,
        };
        SubmissionRecord::new(
            &Submitter::new("t1", "vol-1"),
            &payload,
            &ValidationReport::default(),
            status,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn lookups_filter_by_status() {
        let store = MemoryStore::new();
        let draft = record(SubmissionStatus::Draft);
        let done = record(SubmissionStatus::Completed);
        store.insert_record(&draft).await.expect("insert draft");
        store.insert_record(&done).await.expect("insert final");

        let found = store
            .find_draft("t1", "vol-1", "canvass-2024")
            .await
            .expect("lookup");
        assert_eq!(found.map(|r| r.id), Some(draft.id));

        let found = store
            .find_final("t1", "vol-1", "canvass-2024", "Ana")
            .await
            .expect("lookup");
        assert_eq!(found.map(|r| r.id), Some(done.id));

        let other_tenant = store
            .find_final("t2", "vol-1", "canvass-2024", "Ana")
            .await
            .expect("lookup");
        assert!(other_tenant.is_none());
    }

    #[tokio::test]
    async fn insert_rejects_existing_id() {
        let store = MemoryStore::new();
        let draft = record(SubmissionStatus::Draft);
        store.insert_record(&draft).await.expect("first insert");
        let err = store.insert_record(&draft).await.expect_err("second insert");
        assert_eq!(err, StoreError::AlreadyExists(draft.id));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn answers_require_record_and_cascade_on_delete() {
        let store = MemoryStore::new();
        let draft = record(SubmissionStatus::Draft);
        let rows = StoredAnswer::link(draft.id, &[Answer::text("q1", "yes")]);

        let err = store.insert_answers(draft.id, &rows).await.expect_err("no record");
        assert_eq!(err, StoreError::NotFound(draft.id));

        store.insert_record(&draft).await.expect("insert");
        store.insert_answers(draft.id, &rows).await.expect("answers");
        assert_eq!(store.answers(draft.id).await.expect("read").len(), 1);

        assert!(store.delete_record(draft.id).await.expect("delete"));
        assert!(store.answers(draft.id).await.expect("read").is_empty());
        assert!(!store.delete_record(draft.id).await.expect("delete again"));
    }

    #[test]
    fn transient_failures_are_retryable() {
        assert!(StoreError::Unavailable("reset".into()).is_retryable());
        assert!(StoreError::Timeout("5s".into()).is_retryable());
        assert!(
            StoreError::Status {
                status: 503,
                message: "busy".into()
            }
            .is_retryable()
        );
        assert!(!StoreError::Rejected("bad row".into()).is_retryable());
    }
}
