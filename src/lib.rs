//! Field Survey Submissions
//!
//! Field agents collect survey answers on phones with patchy coverage. This
//! crate decides whether what they send is acceptable and persists it so that
//! a resubmitted request never produces a second record.
//!
//! ## What we do here
//!
//! - **Validate** - every payload goes through the
//!   [`SubmissionValidator`](validate::SubmissionValidator) from the `validate`
//!   crate, in draft or final mode.
//! - **Persist drafts** - [`SubmissionPipeline::save_draft`] creates the
//!   volunteer's draft or replaces its content; field problems become warnings
//!   and never block a draft.
//! - **Finalize** - [`SubmissionPipeline::finalize`] rejects invalid and
//!   duplicate submissions, writes the record and its answers, and deletes the
//!   record again if the answers could not be written.
//! - **Survive the network** - store calls run through the `resilience` crate's
//!   [`ResilientExecutor`](resilience::ResilientExecutor): transient failures
//!   are retried with backoff, and an idempotency key replays an earlier
//!   success instead of running it again.
//!
//! Failures carry a short machine code (see [`PipelineError::code`]) and
//! serialize to an [`ErrorBody`].
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use fieldsurvey::{MemoryStore, SubmissionPipeline, SubmissionStatus, Submitter, SurveyConfig};
//! use validate::{Answer, Question, QuestionCatalog, QuestionType, SubmissionMetadata, SubmissionPayload};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let catalog = QuestionCatalog::new(
//!     "canvass-2024",
//!     vec![Question::new("is_registered", QuestionType::SingleChoice)
//!         .required()
//!         .with_options(["yes", "no"])],
//! )
//! .unwrap();
//!
//! let config = SurveyConfig::default();
//! let pipeline = SubmissionPipeline::from_config(Arc::new(MemoryStore::new()), &config);
//! let payload = SubmissionPayload {
//!     questionnaire_id: "canvass-2024".into(),
//!     respondent_name: "Ana Pérez".into(),
//!     respondent_email: Some("ana@example.org".into()),
//!     respondent_phone: None,
//!     answers: vec![Answer::text("is_registered", "yes")],
//!     metadata: SubmissionMetadata {
//!         started_at: "2024-01-01T09:00:00Z".into(),
//!         completed_at: Some("2024-01-01T09:12:00Z".into()),
//!         device: None,
//!     },
//!     is_draft: false,
//! };
//!
//! // No tenant from the calling layer: the configured default applies.
//! let agent = config.pipeline.submitter(None, "vol-17");
//! assert_eq!(agent, Submitter::new("default", "vol-17"));
//! let outcome = pipeline.finalize(&agent, &payload, &catalog, Some("submit-1")).await.unwrap();
//! assert_eq!(outcome.status, SubmissionStatus::Completed);
//! assert_eq!(outcome.completion_percentage, 100);
//!
//! let again = pipeline.finalize(&agent, &payload, &catalog, None).await.unwrap_err();
//! assert_eq!(again.code(), "DUPLICATE_SUBMISSION");
//! # }
//! ```
mod config;
mod error;
mod logging;
mod pipeline;
mod record;
mod store;

pub use crate::config::{ConfigLoadError, LoggingConfig, PipelineConfig, SurveyConfig};
pub use crate::error::{ErrorBody, PipelineError, PipelineResult};
pub use crate::logging::{InitError, LOG_ENV, init_tracing};
pub use crate::pipeline::{Clock, SubmissionOutcome, SubmissionPipeline};
pub use crate::record::{RecordMetadata, StoredAnswer, SubmissionRecord, SubmissionStatus, Submitter};
pub use crate::store::{MemoryStore, StoreError, SubmissionStore};
