//! Retry-with-backoff executor with idempotent replay and batch execution.
use std::borrow::Cow;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RetryConfig;
use crate::error::{Classify, ExecutorError};
use crate::idempotency::IdempotencyCache;

/// Per-call settings.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Operation name used in log fields.
    pub name: Cow<'static, str>,
    /// Replaces the executor's retry policy for this call.
    pub retry: Option<RetryConfig>,
    /// Cancels pending backoff sleeps and the in-flight attempt.
    pub cancellation: Option<CancellationToken>,
}

impl ExecuteOptions {
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// Outcome of one operation in [`ResilientExecutor::execute_batch`].
#[derive(Debug)]
pub struct BatchOutcome<T, E> {
    /// Position of the operation in the input.
    pub index: usize,
    pub result: Result<T, ExecutorError<E>>,
}

impl<T, E> BatchOutcome<T, E> {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Makes fallible async operations safe to re-invoke.
///
/// Cloning is cheap; clones share the idempotency cache.
#[derive(Debug, Clone)]
pub struct ResilientExecutor {
    config: RetryConfig,
    cache: Arc<IdempotencyCache>,
}

impl ResilientExecutor {
    pub fn new(config: RetryConfig, cache: Arc<IdempotencyCache>) -> Self {
        Self { config, cache }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<IdempotencyCache> {
        &self.cache
    }

    /// Runs `operation` with retries. With an `idempotency_key`, a success is
    /// cached for the cache TTL and later calls with the same key return it
    /// without invoking `operation`. Failures are never cached.
    ///
    /// `operation` receives the 1-based attempt number.
    pub async fn execute<T, E, F, Fut>(
        &self,
        options: &ExecuteOptions,
        idempotency_key: Option<&str>,
        operation: F,
    ) -> Result<T, ExecutorError<E>>
    where
        T: Clone + Send + Sync + 'static,
        E: Classify + Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(key) = idempotency_key else {
            return self.retry(options, operation).await;
        };

        if let Some(hit) = self.cache.get::<T>(key) {
            debug!(operation = %options.name, key, "idempotency_hit");
            return Ok(hit);
        }

        let _guard = self.cache.lock(key).await;
        // Another caller holding the same key may have finished meanwhile.
        if let Some(hit) = self.cache.get::<T>(key) {
            debug!(operation = %options.name, key, "idempotency_hit_after_wait");
            return Ok(hit);
        }

        let value = self.retry(options, operation).await?;
        self.cache.insert(key, value.clone());
        Ok(value)
    }

    /// Runs `operation` with retries and no idempotency caching.
    pub async fn retry<T, E, F, Fut>(
        &self,
        options: &ExecuteOptions,
        mut operation: F,
    ) -> Result<T, ExecutorError<E>>
    where
        E: Classify + Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let policy = options.retry.as_ref().unwrap_or(&self.config);
        let max_attempts = policy.max_attempts.max(1);
        let request_id = Uuid::new_v4();
        let start = Instant::now();
        let mut last_error: Option<E> = None;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let outcome = match &options.cancellation {
                Some(token) => {
                    if token.is_cancelled() {
                        return Err(cancelled(&options.name, attempt - 1, request_id, last_error));
                    }
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => {
                            return Err(cancelled(&options.name, attempt, request_id, last_error));
                        }
                        outcome = operation(attempt) => outcome,
                    }
                }
                None => operation(attempt).await,
            };

            let err = match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        info!(
                            operation = %options.name,
                            request_id = %request_id,
                            attempts = attempt,
                            elapsed_micros = start.elapsed().as_micros(),
                            "retry_recovered"
                        );
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            let category = err.category();
            if !category.is_retryable() {
                warn!(
                    operation = %options.name,
                    request_id = %request_id,
                    attempt,
                    category = %category,
                    error = %err,
                    "operation_failed"
                );
                return Err(ExecutorError::NonRetryable {
                    request_id,
                    error: err,
                });
            }

            if attempt >= max_attempts {
                let elapsed = start.elapsed();
                warn!(
                    operation = %options.name,
                    request_id = %request_id,
                    attempts = attempt,
                    elapsed_micros = elapsed.as_micros(),
                    category = %category,
                    error = %err,
                    "retry_exhausted"
                );
                return Err(ExecutorError::RetryExhausted {
                    attempts: attempt,
                    elapsed,
                    request_id,
                    last_error: err,
                });
            }

            let delay = policy.delay_for(attempt);
            warn!(
                operation = %options.name,
                request_id = %request_id,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                category = %category,
                error = %err,
                "attempt_failed"
            );
            last_error = Some(err);

            match &options.cancellation {
                Some(token) => {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => {
                            return Err(cancelled(&options.name, attempt, request_id, last_error));
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => tokio::time::sleep(delay).await,
            }
        }
    }

    /// Runs independent operations concurrently, each with its own retries.
    /// One failure never aborts the others; outcomes come back in input
    /// order.
    pub async fn execute_batch<T, E, F, Fut, I>(
        &self,
        options: &ExecuteOptions,
        operations: I,
    ) -> Vec<BatchOutcome<T, E>>
    where
        E: Classify + Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        I: IntoIterator<Item = F>,
    {
        let start = Instant::now();
        let runs = operations
            .into_iter()
            .enumerate()
            .map(|(index, operation)| async move {
                BatchOutcome {
                    index,
                    result: self.retry(options, operation).await,
                }
            });
        let outcomes = join_all(runs).await;

        let failed = outcomes.iter().filter(|o| !o.is_success()).count();
        info!(
            operation = %options.name,
            total = outcomes.len(),
            failed,
            elapsed_micros = start.elapsed().as_micros(),
            "batch_complete"
        );
        outcomes
    }
}

fn cancelled<E>(
    name: &str,
    attempts: u32,
    request_id: Uuid,
    last_error: Option<E>,
) -> ExecutorError<E> {
    warn!(operation = %name, request_id = %request_id, attempts, "operation_cancelled");
    ExecutorError::Cancelled {
        attempts,
        request_id,
        last_error,
    }
}
