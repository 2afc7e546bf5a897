//! Draft/finalize lifecycle over a [`SubmissionStore`].
//!
//! ```text
//! absent ──save_draft──▶ draft ──finalize──▶ completed
//!                        │   ▲
//!                        └───┘ save_draft / update_draft
//! ```
//!
//! Every store call runs through the [`ResilientExecutor`], so transient
//! failures are retried and exhausted retries surface with their context.
//! `completed` records are never updated or deleted here; the only delete of a
//! completed record is the compensating action for a finalize whose answers
//! could not be written.
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use resilience::{
    CancellationToken, ExecuteOptions, ExecutorError, IdempotencyCache, ResilientExecutor,
    RetryConfig,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;
use validate::{
    QuestionCatalog, SubmissionPayload, SubmissionValidator, ValidationMode, ValidationReport,
};

use crate::config::SurveyConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::record::{StoredAnswer, SubmissionRecord, SubmissionStatus, Submitter};
use crate::store::{StoreError, SubmissionStore};

/// Source of "now" for record timestamps and the validation date.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// What a successful pipeline operation reports back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub record_id: Uuid,
    pub status: SubmissionStatus,
    pub completion_percentage: u8,
    /// Warnings are kept so the caller can show them.
    pub report: ValidationReport,
}

pub struct SubmissionPipeline<S> {
    store: Arc<S>,
    validator: Arc<SubmissionValidator>,
    executor: ResilientExecutor,
    compensation: RetryConfig,
    clock: Clock,
    cancellation: Option<CancellationToken>,
}

impl<S> std::fmt::Debug for SubmissionPipeline<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionPipeline")
            .field("executor", &self.executor)
            .field("compensation", &self.compensation)
            .finish_non_exhaustive()
    }
}

impl<S: SubmissionStore> SubmissionPipeline<S> {
    pub fn new(store: Arc<S>, validator: SubmissionValidator, executor: ResilientExecutor) -> Self {
        let compensation = executor.config().with_max_attempts(3);
        Self {
            store,
            validator: Arc::new(validator),
            executor,
            compensation,
            clock: Arc::new(Utc::now),
            cancellation: None,
        }
    }

    /// Wires validator, retry policy and a fresh idempotency cache from one
    /// configuration document.
    pub fn from_config(store: Arc<S>, config: &SurveyConfig) -> Self {
        let cache = Arc::new(IdempotencyCache::new(config.idempotency));
        let executor = ResilientExecutor::new(config.retry, cache);
        Self::new(store, SubmissionValidator::new(config.validation.clone()), executor)
            .with_compensation_attempts(config.pipeline.compensation_attempts)
    }

    pub fn with_compensation_attempts(mut self, attempts: u32) -> Self {
        self.compensation = self.compensation.with_max_attempts(attempts);
        self
    }

    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Store calls observe `token`; cancelling it aborts pending retries.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn executor(&self) -> &ResilientExecutor {
        &self.executor
    }

    /// Creates the volunteer's draft for this questionnaire, or replaces the
    /// content of the one that already exists.
    ///
    /// Field and rule findings are warnings here and never block the save.
    /// Structural problems (orphaned or duplicate answers) still do.
    pub async fn save_draft(
        &self,
        submitter: &Submitter,
        payload: &SubmissionPayload,
        catalog: &QuestionCatalog,
    ) -> PipelineResult<SubmissionOutcome> {
        let span = info_span!(
            "pipeline.save_draft",
            volunteer_id = %submitter.volunteer_id,
            questionnaire_id = %payload.questionnaire_id
        );
        async {
            let start = Instant::now();
            ensure_questionnaire(payload, catalog)?;
            let report = self.check(payload, catalog, ValidationMode::Draft)?;

            let store = self.store.as_ref();
            let existing = self
                .call("find_draft", None, move |_| {
                    store.find_draft(
                        &submitter.tenant_id,
                        &submitter.volunteer_id,
                        &payload.questionnaire_id,
                    )
                })
                .await?;

            let outcome = match existing {
                Some(record) => self.replace_draft(record, payload, report).await?,
                None => {
                    let record = SubmissionRecord::new(
                        submitter,
                        payload,
                        &report,
                        SubmissionStatus::Draft,
                        self.now(),
                    );
                    self.insert_with_answers(record, payload, report).await?
                }
            };

            info!(
                record_id = %outcome.record_id,
                completion = outcome.completion_percentage,
                warnings = outcome.report.warning_count(),
                elapsed_micros = start.elapsed().as_micros(),
                "draft_saved"
            );
            Ok::<_, PipelineError>(outcome)
        }
        .instrument(span)
        .await
    }

    /// Replaces the content of draft `record_id`.
    pub async fn update_draft(
        &self,
        record_id: Uuid,
        payload: &SubmissionPayload,
        catalog: &QuestionCatalog,
    ) -> PipelineResult<SubmissionOutcome> {
        let span = info_span!("pipeline.update_draft", record_id = %record_id);
        async {
            let start = Instant::now();
            ensure_questionnaire(payload, catalog)?;
            let record = self.load_draft(record_id).await?;
            if record.questionnaire_id != payload.questionnaire_id {
                return Err(PipelineError::InvalidQuestionnaire {
                    expected: record.questionnaire_id,
                    found: payload.questionnaire_id.clone(),
                });
            }
            let report = self.check(payload, catalog, ValidationMode::Draft)?;
            let outcome = self.replace_draft(record, payload, report).await?;

            info!(
                completion = outcome.completion_percentage,
                warnings = outcome.report.warning_count(),
                elapsed_micros = start.elapsed().as_micros(),
                "draft_updated"
            );
            Ok::<_, PipelineError>(outcome)
        }
        .instrument(span)
        .await
    }

    pub async fn delete_draft(&self, record_id: Uuid) -> PipelineResult<()> {
        let span = info_span!("pipeline.delete_draft", record_id = %record_id);
        async {
            let start = Instant::now();
            self.load_draft(record_id).await?;
            let store = self.store.as_ref();
            self.call("delete_draft", None, move |_| store.delete_record(record_id))
                .await?;
            info!(elapsed_micros = start.elapsed().as_micros(), "draft_deleted");
            Ok::<_, PipelineError>(())
        }
        .instrument(span)
        .await
    }

    /// Validates in final mode and persists a completed record with its
    /// answers.
    ///
    /// With an `idempotency_key`, a success is replayed to repeat calls carrying
    /// the same key for the cache TTL, and concurrent calls with that key run
    /// once. Failures are not replayed.
    pub async fn finalize(
        &self,
        submitter: &Submitter,
        payload: &SubmissionPayload,
        catalog: &QuestionCatalog,
        idempotency_key: Option<&str>,
    ) -> PipelineResult<SubmissionOutcome> {
        let span = info_span!(
            "pipeline.finalize",
            volunteer_id = %submitter.volunteer_id,
            questionnaire_id = %payload.questionnaire_id
        );
        async {
            let start = Instant::now();
            let outcome = match idempotency_key {
                Some(key) => {
                    // Store calls inside already retry; the outer run only dedupes.
                    let options = ExecuteOptions::named("finalize")
                        .with_retry(RetryConfig::default().with_max_attempts(1));
                    self.executor
                        .execute(&options, Some(key), move |_| {
                            self.finalize_once(submitter, payload, catalog)
                        })
                        .await
                        .map_err(unwrap_finalize)?
                }
                None => self.finalize_once(submitter, payload, catalog).await?,
            };

            info!(
                record_id = %outcome.record_id,
                completion = outcome.completion_percentage,
                elapsed_micros = start.elapsed().as_micros(),
                "submission_finalized"
            );
            Ok::<_, PipelineError>(outcome)
        }
        .instrument(span)
        .await
    }

    async fn finalize_once(
        &self,
        submitter: &Submitter,
        payload: &SubmissionPayload,
        catalog: &QuestionCatalog,
    ) -> PipelineResult<SubmissionOutcome> {
        ensure_questionnaire(payload, catalog)?;
        let report = self.check(payload, catalog, ValidationMode::Final)?;

        let respondent = payload.respondent_name.trim();
        let store = self.store.as_ref();
        let existing = self
            .call("find_final", None, move |_| {
                store.find_final(
                    &submitter.tenant_id,
                    &submitter.volunteer_id,
                    &payload.questionnaire_id,
                    respondent,
                )
            })
            .await?;
        if let Some(existing) = existing {
            warn!(existing_record_id = %existing.id, "duplicate_submission");
            return Err(PipelineError::Duplicate {
                existing: existing.id,
                respondent_name: respondent.to_string(),
            });
        }

        let record = SubmissionRecord::new(
            submitter,
            payload,
            &report,
            SubmissionStatus::Completed,
            self.now(),
        );
        let outcome = self.insert_with_answers(record, payload, report).await?;
        self.retire_draft(submitter, &payload.questionnaire_id, respondent)
            .await;
        Ok(outcome)
    }

    /// Record first, then answers. The store gives no multi-row transaction,
    /// so an answer failure deletes the record again before the error is
    /// returned.
    async fn insert_with_answers(
        &self,
        record: SubmissionRecord,
        payload: &SubmissionPayload,
        report: ValidationReport,
    ) -> PipelineResult<SubmissionOutcome> {
        let store = self.store.as_ref();
        let record_ref = &record;
        self.call("insert_record", None, move |attempt| async move {
            match store.insert_record(record_ref).await {
                // The previous attempt landed but its response was lost.
                Err(StoreError::AlreadyExists(id)) if attempt > 1 && id == record_ref.id => Ok(()),
                other => other,
            }
        })
        .await?;

        let rows = StoredAnswer::link(record.id, &payload.answers);
        let rows_ref = rows.as_slice();
        let inserted = self
            .call("insert_answers", None, move |attempt| async move {
                if attempt > 1 {
                    store.delete_answers(record_ref.id).await?;
                }
                store.insert_answers(record_ref.id, rows_ref).await
            })
            .await;

        if let Err(err) = inserted {
            self.compensate(record.id, &err).await;
            return Err(err);
        }
        Ok(outcome(&record, report))
    }

    /// Best effort, bounded by the compensation policy. A failure here is
    /// logged and never replaces `cause`.
    async fn compensate(&self, record_id: Uuid, cause: &PipelineError) {
        let options = ExecuteOptions::named("compensate_delete").with_retry(self.compensation);
        let store = self.store.as_ref();
        match self
            .executor
            .retry(&options, move |_| store.delete_record(record_id))
            .await
        {
            Ok(_) => warn!(record_id = %record_id, cause = %cause, "record_compensated"),
            Err(err) => error!(
                record_id = %record_id,
                cause = %cause,
                attempts = err.attempts(),
                request_id = %err.request_id(),
                error = %err,
                "compensation_failed"
            ),
        }
    }

    /// Overwrites a draft's record and answers. The three writes are not
    /// atomic, so a failure puts the previous content back before the error
    /// is returned.
    async fn replace_draft(
        &self,
        mut record: SubmissionRecord,
        payload: &SubmissionPayload,
        report: ValidationReport,
    ) -> PipelineResult<SubmissionOutcome> {
        let key = draft_key(&record, payload);
        let store = self.store.as_ref();
        let record_id = record.id;
        let previous_rows = self
            .call("load_answers", None, move |_| store.answers(record_id))
            .await?;
        let previous = record.clone();

        record.apply(payload, &report, self.now());
        let rows = StoredAnswer::link(record.id, &payload.answers);
        let replaced = self
            .call("replace_draft", key.as_deref(), |_| {
                write_draft(store, &record, &rows)
            })
            .await;

        if let Err(err) = replaced {
            self.restore_draft(previous, record.updated_at, &previous_rows, &err)
                .await;
            return Err(err);
        }
        Ok(outcome(&record, report))
    }

    /// Best effort, bounded by the compensation policy. The restored record
    /// still moves `updated_at` past `attempted_at`, the timestamp the failed
    /// replacement may have written.
    async fn restore_draft(
        &self,
        mut previous: SubmissionRecord,
        attempted_at: DateTime<Utc>,
        rows: &[StoredAnswer],
        cause: &PipelineError,
    ) {
        previous.updated_at = previous.updated_at.max(attempted_at);
        previous.touch(self.now());

        let options = ExecuteOptions::named("restore_draft").with_retry(self.compensation);
        let store = self.store.as_ref();
        let previous_ref = &previous;
        match self
            .executor
            .retry(&options, move |_| write_draft(store, previous_ref, rows))
            .await
        {
            Ok(()) => warn!(
                record_id = %previous.id,
                answers = rows.len(),
                cause = %cause,
                "draft_restored"
            ),
            Err(err) => error!(
                record_id = %previous.id,
                cause = %cause,
                attempts = err.attempts(),
                request_id = %err.request_id(),
                error = %err,
                "draft_restore_failed"
            ),
        }
    }

    /// Deletes the volunteer's outstanding draft once it has been finalized,
    /// i.e. when it belongs to `respondent`. A draft for anyone else is left
    /// alone. Failures are logged only.
    async fn retire_draft(&self, submitter: &Submitter, questionnaire_id: &str, respondent: &str) {
        let store = self.store.as_ref();
        let found = self
            .call("find_draft", None, move |_| {
                store.find_draft(&submitter.tenant_id, &submitter.volunteer_id, questionnaire_id)
            })
            .await;

        let result = match found {
            Ok(Some(draft)) if draft.respondent_name != respondent => {
                debug!(draft_id = %draft.id, "draft_kept_for_other_respondent");
                Ok(())
            }
            Ok(Some(draft)) => {
                let draft_id = draft.id;
                self.call("delete_draft", None, move |_| store.delete_record(draft_id))
                    .await
                    .map(|_| ())
            }
            Ok(None) => Ok(()),
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            warn!(code = err.code(), error = %err, "draft_cleanup_failed");
        }
    }

    async fn load_draft(&self, record_id: Uuid) -> PipelineResult<SubmissionRecord> {
        let store = self.store.as_ref();
        let record = self
            .call("get_record", None, move |_| store.get(record_id))
            .await?
            .ok_or(PipelineError::NotFound(record_id))?;
        if record.is_final() {
            warn!(record_id = %record_id, "immutable_record");
            return Err(PipelineError::Immutable(record_id));
        }
        Ok(record)
    }

    fn check(
        &self,
        payload: &SubmissionPayload,
        catalog: &QuestionCatalog,
        mode: ValidationMode,
    ) -> PipelineResult<ValidationReport> {
        let as_of = self.now().date_naive();
        let report = self.validator.validate(payload, catalog, mode, as_of);
        if report.is_valid {
            Ok(report)
        } else {
            warn!(mode = ?mode, errors = report.error_count(), "validation_failed");
            Err(PipelineError::validation(report))
        }
    }

    async fn call<T, F, Fut>(
        &self,
        operation: &'static str,
        idempotency_key: Option<&str>,
        run: F,
    ) -> PipelineResult<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut options = ExecuteOptions::named(operation);
        if let Some(token) = &self.cancellation {
            options = options.with_cancellation(token.clone());
        }
        self.executor
            .execute(&options, idempotency_key, run)
            .await
            .map_err(|err| PipelineError::from_executor(operation, err))
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

async fn write_draft<S: SubmissionStore>(
    store: &S,
    record: &SubmissionRecord,
    rows: &[StoredAnswer],
) -> Result<(), StoreError> {
    store.update_record(record).await?;
    store.delete_answers(record.id).await?;
    store.insert_answers(record.id, rows).await
}

fn ensure_questionnaire(payload: &SubmissionPayload, catalog: &QuestionCatalog) -> PipelineResult<()> {
    if payload.questionnaire_id == catalog.questionnaire_id() {
        Ok(())
    } else {
        Err(PipelineError::InvalidQuestionnaire {
            expected: catalog.questionnaire_id().to_string(),
            found: payload.questionnaire_id.clone(),
        })
    }
}

fn outcome(record: &SubmissionRecord, report: ValidationReport) -> SubmissionOutcome {
    SubmissionOutcome {
        record_id: record.id,
        status: record.status,
        completion_percentage: record.metadata.completion_percentage,
        report,
    }
}

/// Key for an in-place draft replacement: the record id plus a digest of the
/// record version being replaced and the new payload. A repeated request for
/// the same version is replayed; a later edit of the same draft is not.
fn draft_key(record: &SubmissionRecord, payload: &SubmissionPayload) -> Option<String> {
    let body = match serde_json::to_vec(payload) {
        Ok(body) => body,
        Err(err) => {
            warn!(record_id = %record.id, error = %err, "payload_digest_failed");
            return None;
        }
    };
    let mut hasher = Sha256::new();
    hasher.update(record.updated_at.to_rfc3339().as_bytes());
    hasher.update(&body);
    Some(format!("draft:{}:{}", record.id, hex::encode(hasher.finalize())))
}

fn unwrap_finalize(err: ExecutorError<PipelineError>) -> PipelineError {
    match err {
        ExecutorError::NonRetryable { error, .. } => error,
        ExecutorError::RetryExhausted { last_error, .. } => last_error,
        ExecutorError::Cancelled {
            attempts,
            request_id,
            ..
        } => PipelineError::Cancelled {
            operation: "finalize",
            attempts,
            request_id,
        },
    }
}
