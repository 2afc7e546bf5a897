//! Pipeline failures and their machine-readable codes.
use resilience::{Classify, ErrorCategory, ExecutorError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;
use validate::ValidationReport;

use crate::store::StoreError;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PipelineError {
    /// The report is returned so the caller can map messages to fields.
    #[error("submission failed validation with {} error(s)", report.error_count())]
    Validation { report: Box<ValidationReport> },

    #[error("a completed submission for '{respondent_name}' already exists (record {existing})")]
    Duplicate {
        existing: Uuid,
        respondent_name: String,
    },

    #[error("record {0} is completed and can no longer be changed")]
    Immutable(Uuid),

    #[error("record {0} not found")]
    NotFound(Uuid),

    #[error("submission targets questionnaire '{found}' but '{expected}' was expected")]
    InvalidQuestionnaire { expected: String, found: String },

    #[error("{operation} cancelled after {attempts} attempt(s) (request {request_id})")]
    Cancelled {
        operation: &'static str,
        attempts: u32,
        request_id: Uuid,
    },

    #[error("{operation} failed: {source}")]
    Store {
        operation: &'static str,
        #[source]
        source: ExecutorError<StoreError>,
    },
}

/// Wire shape of a pipeline failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl PipelineError {
    pub(crate) fn validation(report: ValidationReport) -> Self {
        PipelineError::Validation {
            report: Box::new(report),
        }
    }

    /// Maps an executor failure for a store call.
    pub(crate) fn from_executor(operation: &'static str, err: ExecutorError<StoreError>) -> Self {
        match err {
            ExecutorError::Cancelled {
                attempts,
                request_id,
                ..
            } => PipelineError::Cancelled {
                operation,
                attempts,
                request_id,
            },
            source => PipelineError::Store { operation, source },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Validation { .. } => "VALIDATION_FAILED",
            PipelineError::Duplicate { .. } => "DUPLICATE_SUBMISSION",
            PipelineError::Immutable(_) => "RECORD_IMMUTABLE",
            PipelineError::NotFound(_) => "RECORD_NOT_FOUND",
            PipelineError::InvalidQuestionnaire { .. } => "INVALID_QUESTIONNAIRE",
            PipelineError::Cancelled { .. } => "CANCELLED",
            PipelineError::Store { source, .. } => {
                if source.last_error().is_some_and(|err| err.is_retryable()) {
                    "NETWORK_ERROR"
                } else {
                    "STORE_ERROR"
                }
            }
        }
    }

    /// The validation report behind a `VALIDATION_FAILED` error.
    pub fn report(&self) -> Option<&ValidationReport> {
        match self {
            PipelineError::Validation { report } => Some(report),
            _ => None,
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        let details = match self {
            PipelineError::Validation { report } => serde_json::to_value(report.as_ref()).ok(),
            PipelineError::Duplicate { existing, .. } => {
                Some(json!({ "existing_record_id": existing }))
            }
            PipelineError::Immutable(id) | PipelineError::NotFound(id) => {
                Some(json!({ "record_id": id }))
            }
            PipelineError::InvalidQuestionnaire { expected, found } => {
                Some(json!({ "expected": expected, "found": found }))
            }
            PipelineError::Cancelled {
                operation,
                attempts,
                request_id,
            } => Some(json!({
                "operation": operation,
                "attempts": attempts,
                "request_id": request_id,
            })),
            PipelineError::Store { operation, source } => Some(json!({
                "operation": operation,
                "attempts": source.attempts(),
                "request_id": source.request_id(),
                "category": source.last_error().map(|err| err.category()),
            })),
        };
        ErrorBody {
            code: self.code().to_string(),
            message: self.to_string(),
            details,
        }
    }
}

impl Classify for PipelineError {
    fn category(&self) -> ErrorCategory {
        match self {
            PipelineError::Validation { .. } => ErrorCategory::Validation,
            PipelineError::Duplicate { .. } | PipelineError::Immutable(_) => {
                ErrorCategory::Conflict
            }
            PipelineError::NotFound(_) => ErrorCategory::NotFound,
            PipelineError::InvalidQuestionnaire { .. } => ErrorCategory::MalformedRequest,
            PipelineError::Cancelled { .. } => ErrorCategory::Other,
            PipelineError::Store { source, .. } => source
                .last_error()
                .map_or(ErrorCategory::Other, Classify::category),
        }
    }
}
