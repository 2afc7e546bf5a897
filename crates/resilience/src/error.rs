//! Error classification and executor errors.
//!
//! Wrapped operations return their own error type; implementing [`Classify`]
//! for it tells the executor whether a failure is worth another attempt.
//!
//! | Category | Retried |
//! |----------|---------|
//! | `Network`, `Server`, `Timeout`, `RateLimited` | yes |
//! | `Validation`, `MalformedRequest`, `Conflict`, `NotFound`, `Other` | no |
use std::fmt;
use std::io;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Network,
    Server,
    Timeout,
    RateLimited,
    Validation,
    MalformedRequest,
    Conflict,
    NotFound,
    Other,
}

impl ErrorCategory {
    /// The retry allow-list. Everything not listed fails on the first attempt.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorCategory::Network
                | ErrorCategory::Server
                | ErrorCategory::Timeout
                | ErrorCategory::RateLimited
        )
    }

    /// Maps an HTTP status code from a remote store.
    pub fn from_status(status: u16) -> Self {
        match status {
            408 | 504 => ErrorCategory::Timeout,
            429 => ErrorCategory::RateLimited,
            500..=599 => ErrorCategory::Server,
            404 => ErrorCategory::NotFound,
            409 => ErrorCategory::Conflict,
            422 => ErrorCategory::Validation,
            400..=499 => ErrorCategory::MalformedRequest,
            _ => ErrorCategory::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Network => "network",
            ErrorCategory::Server => "server",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::RateLimited => "rate_limited",
            ErrorCategory::Validation => "validation",
            ErrorCategory::MalformedRequest => "malformed_request",
            ErrorCategory::Conflict => "conflict",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::Other => "other",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait Classify {
    fn category(&self) -> ErrorCategory;

    fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

impl Classify for ErrorCategory {
    fn category(&self) -> ErrorCategory {
        *self
    }
}

impl Classify for io::Error {
    fn category(&self) -> ErrorCategory {
        match self.kind() {
            io::ErrorKind::TimedOut => ErrorCategory::Timeout,
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::Interrupted
            | io::ErrorKind::UnexpectedEof => ErrorCategory::Network,
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => {
                ErrorCategory::MalformedRequest
            }
            io::ErrorKind::NotFound => ErrorCategory::NotFound,
            io::ErrorKind::AlreadyExists => ErrorCategory::Conflict,
            _ => ErrorCategory::Other,
        }
    }
}

/// Why [`ResilientExecutor`](crate::ResilientExecutor) gave up.
///
/// Every variant carries the request id generated for the call, so a failure
/// seen by a caller can be matched to the per-attempt log lines.
#[derive(Debug, Error)]
pub enum ExecutorError<E> {
    /// The operation failed with an error outside the retry allow-list.
    #[error("request {request_id} failed: {error}")]
    NonRetryable { request_id: Uuid, error: E },

    /// Every attempt failed with a retryable error.
    #[error("request {request_id} failed after {attempts} attempts in {elapsed:?}: {last_error}")]
    RetryExhausted {
        attempts: u32,
        elapsed: Duration,
        request_id: Uuid,
        last_error: E,
    },

    /// The caller cancelled before an attempt succeeded.
    #[error("request {request_id} cancelled after {attempts} attempts")]
    Cancelled {
        attempts: u32,
        request_id: Uuid,
        last_error: Option<E>,
    },
}

impl<E> ExecutorError<E> {
    pub fn request_id(&self) -> Uuid {
        match self {
            ExecutorError::NonRetryable { request_id, .. }
            | ExecutorError::RetryExhausted { request_id, .. }
            | ExecutorError::Cancelled { request_id, .. } => *request_id,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            ExecutorError::NonRetryable { .. } => 1,
            ExecutorError::RetryExhausted { attempts, .. }
            | ExecutorError::Cancelled { attempts, .. } => *attempts,
        }
    }

    /// The underlying operation error, when there was one.
    pub fn last_error(&self) -> Option<&E> {
        match self {
            ExecutorError::NonRetryable { error, .. } => Some(error),
            ExecutorError::RetryExhausted { last_error, .. } => Some(last_error),
            ExecutorError::Cancelled { last_error, .. } => last_error.as_ref(),
        }
    }

    pub fn into_last_error(self) -> Option<E> {
        match self {
            ExecutorError::NonRetryable { error, .. } => Some(error),
            ExecutorError::RetryExhausted { last_error, .. } => Some(last_error),
            ExecutorError::Cancelled { last_error, .. } => last_error,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExecutorError::Cancelled { .. })
    }
}

/// Inconsistent [`RetryConfig`](crate::RetryConfig) or
/// [`IdempotencyConfig`](crate::IdempotencyConfig) values.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,

    #[error("multiplier must be a finite value >= 1.0, got {0}")]
    InvalidMultiplier(f64),

    #[error("jitter_ratio must be within [0, 1], got {0}")]
    InvalidJitter(f64),

    #[error("base_delay ({base:?}) exceeds max_delay ({max:?})")]
    InvertedDelays { base: Duration, max: Duration },

    #[error("idempotency ttl must be greater than zero")]
    ZeroTtl,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_list_is_explicit() {
        let retryable: Vec<_> = [
            ErrorCategory::Network,
            ErrorCategory::Server,
            ErrorCategory::Timeout,
            ErrorCategory::RateLimited,
            ErrorCategory::Validation,
            ErrorCategory::MalformedRequest,
            ErrorCategory::Conflict,
            ErrorCategory::NotFound,
            ErrorCategory::Other,
        ]
        .into_iter()
        .filter(|c| c.is_retryable())
        .collect();
        assert_eq!(
            retryable,
            [
                ErrorCategory::Network,
                ErrorCategory::Server,
                ErrorCategory::Timeout,
                ErrorCategory::RateLimited
            ]
        );
    }

    #[test]
    fn status_codes_classify() {
        assert_eq!(ErrorCategory::from_status(503), ErrorCategory::Server);
        assert_eq!(ErrorCategory::from_status(504), ErrorCategory::Timeout);
        assert_eq!(ErrorCategory::from_status(429), ErrorCategory::RateLimited);
        assert_eq!(ErrorCategory::from_status(400), ErrorCategory::MalformedRequest);
        assert_eq!(ErrorCategory::from_status(409), ErrorCategory::Conflict);
        assert!(!ErrorCategory::from_status(401).is_retryable());
    }

    #[test]
    fn io_errors_classify() {
        let reset = io::Error::from(io::ErrorKind::ConnectionReset);
        assert!(reset.is_retryable());
        let bad = io::Error::from(io::ErrorKind::InvalidData);
        assert!(!bad.is_retryable());
    }

    #[test]
    fn exhaustion_message_carries_context() {
        let id = Uuid::new_v4();
        let err = ExecutorError::RetryExhausted {
            attempts: 3,
            elapsed: Duration::from_secs(3),
            request_id: id,
            last_error: "connection reset",
        };
        let msg = err.to_string();
        assert!(msg.contains(&id.to_string()));
        assert!(msg.contains("3 attempts"));
        assert!(msg.contains("connection reset"));
        assert_eq!(err.attempts(), 3);
        assert_eq!(err.last_error(), Some(&"connection reset"));
    }
}
