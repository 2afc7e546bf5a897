use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use resilience::{
    CancellationToken, Classify, ErrorCategory, ExecuteOptions, ExecutorError, IdempotencyCache,
    IdempotencyConfig, ResilientExecutor, RetryConfig,
};

#[derive(Debug, Clone, PartialEq)]
enum StoreFault {
    ConnectionReset,
    Unavailable,
    Rejected(&'static str),
}

impl fmt::Display for StoreFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreFault::ConnectionReset => f.write_str("connection reset by peer"),
            StoreFault::Unavailable => f.write_str("503 service unavailable"),
            StoreFault::Rejected(why) => write!(f, "rejected: {why}"),
        }
    }
}

impl Classify for StoreFault {
    fn category(&self) -> ErrorCategory {
        match self {
            StoreFault::ConnectionReset => ErrorCategory::Network,
            StoreFault::Unavailable => ErrorCategory::Server,
            StoreFault::Rejected(_) => ErrorCategory::Validation,
        }
    }
}

fn executor() -> ResilientExecutor {
    ResilientExecutor::new(
        RetryConfig::default().without_jitter(),
        Arc::new(IdempotencyCache::new(IdempotencyConfig::default())),
    )
}

#[tokio::test(start_paused = true)]
async fn same_key_within_ttl_runs_once() {
    let executor = executor();
    let calls = Arc::new(AtomicU32::new(0));
    let options = ExecuteOptions::named("finalize");

    let run = || {
        let calls = Arc::clone(&calls);
        move |_attempt: u32| {
            let calls = Arc::clone(&calls);
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Ok::<_, StoreFault>(format!("record-{n}"))
            }
        }
    };

    let first = executor
        .execute(&options, Some("submit-42"), run())
        .await
        .expect("first call succeeds");

    tokio::time::advance(Duration::from_secs(60)).await;

    let second = executor
        .execute(&options, Some("submit-42"), run())
        .await
        .expect("second call is replayed");

    assert_eq!(first, "record-1");
    assert_eq!(second, first);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn key_expires_after_ttl() {
    let executor = executor();
    let calls = Arc::new(AtomicU32::new(0));
    let options = ExecuteOptions::named("finalize");

    for _ in 0..2 {
        let calls = Arc::clone(&calls);
        executor
            .execute(&options, Some("submit-7"), move |_| {
                let calls = Arc::clone(&calls);
                async move { Ok::<_, StoreFault>(calls.fetch_add(1, Ordering::SeqCst)) }
            })
            .await
            .expect("call succeeds");
        tokio::time::advance(Duration::from_secs(11 * 60)).await;
    }

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn failures_are_not_cached() {
    let executor = executor();
    let options = ExecuteOptions::named("finalize");

    let failed = executor
        .execute(&options, Some("k"), |_| async {
            Err::<u32, _>(StoreFault::Rejected("bad payload"))
        })
        .await;
    assert!(failed.is_err());

    let ok = executor
        .execute(&options, Some("k"), |_| async { Ok::<_, StoreFault>(5_u32) })
        .await;
    assert_eq!(ok.ok(), Some(5));
}

#[tokio::test(start_paused = true)]
async fn non_retryable_error_is_attempted_once() {
    let executor = executor();
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);

    let result = executor
        .retry(&ExecuteOptions::named("insert_answers"), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(StoreFault::Rejected("malformed")) }
        })
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    match result {
        Err(ExecutorError::NonRetryable { error, .. }) => {
            assert_eq!(error, StoreFault::Rejected("malformed"));
        }
        other => panic!("expected non-retryable failure, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn transient_errors_retry_with_backoff() {
    let executor = executor();
    let start = tokio::time::Instant::now();

    let result = executor
        .retry(&ExecuteOptions::named("create_draft"), |attempt| async move {
            if attempt < 3 {
                Err(StoreFault::ConnectionReset)
            } else {
                Ok(attempt)
            }
        })
        .await;

    assert_eq!(result.ok(), Some(3));
    // 1s after the first failure, 2s after the second.
    assert_eq!(start.elapsed(), Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn exhaustion_carries_retry_context() {
    let executor = executor();

    let result = executor
        .retry(&ExecuteOptions::named("create_draft"), |_| async {
            Err::<(), _>(StoreFault::Unavailable)
        })
        .await;

    let Err(err) = result else {
        panic!("expected exhaustion");
    };
    assert!(err.to_string().contains(&err.request_id().to_string()));
    match err {
        ExecutorError::RetryExhausted {
            attempts,
            elapsed,
            last_error,
            ..
        } => {
            assert_eq!(attempts, 3);
            assert_eq!(elapsed, Duration::from_secs(3));
            assert_eq!(last_error, StoreFault::Unavailable);
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn per_call_policy_overrides_default() {
    let executor = executor();
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let options = ExecuteOptions::named("compensate")
        .with_retry(RetryConfig::default().with_max_attempts(2).without_jitter());

    let result = executor
        .retry(&options, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(StoreFault::ConnectionReset) }
        })
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(result.map_err(|e| e.attempts()).err(), Some(2));
}

#[tokio::test(start_paused = true)]
async fn cancellation_aborts_pending_backoff() {
    let executor = executor();
    let token = CancellationToken::new();
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        canceller.cancel();
    });

    let start = tokio::time::Instant::now();
    let result = executor
        .retry(
            &ExecuteOptions::named("finalize").with_cancellation(token),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(StoreFault::ConnectionReset) }
            },
        )
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(start.elapsed() < Duration::from_secs(1));
    match result {
        Err(ExecutorError::Cancelled {
            attempts,
            last_error,
            ..
        }) => {
            assert_eq!(attempts, 1);
            assert_eq!(last_error, Some(StoreFault::ConnectionReset));
        }
        other => panic!("expected cancellation, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn cancelled_token_prevents_first_attempt() {
    let executor = executor();
    let token = CancellationToken::new();
    token.cancel();
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);

    let result = executor
        .retry(
            &ExecuteOptions::named("finalize").with_cancellation(token),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, StoreFault>(()) }
            },
        )
        .await;

    assert!(matches!(result, Err(ExecutorError::Cancelled { attempts: 0, .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn concurrent_calls_with_same_key_run_once() {
    let executor = executor();
    let calls = Arc::new(AtomicU32::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let executor = executor.clone();
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                executor
                    .execute(&ExecuteOptions::named("finalize"), Some("submit-99"), move |_| {
                        let calls = Arc::clone(&calls);
                        async move {
                            tokio::time::sleep(Duration::from_millis(100)).await;
                            Ok::<_, StoreFault>(calls.fetch_add(1, Ordering::SeqCst) + 1)
                        }
                    })
                    .await
            })
        })
        .collect();

    for handle in handles {
        let value = handle.await.expect("task joins").expect("call succeeds");
        assert_eq!(value, 1);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn batch_reports_each_outcome() {
    let executor = executor();
    let inputs = vec![1_u32, 0, 3];

    let outcomes = executor
        .execute_batch(
            &ExecuteOptions::named("insert_answers"),
            inputs.into_iter().map(|value| {
                move |_attempt: u32| async move {
                    if value == 0 {
                        Err(StoreFault::Rejected("empty"))
                    } else {
                        Ok(value * 10)
                    }
                }
            }),
        )
        .await;

    assert_eq!(outcomes.len(), 3);
    let summary: Vec<(usize, bool)> = outcomes.iter().map(|o| (o.index, o.is_success())).collect();
    assert_eq!(summary, [(0, true), (1, false), (2, true)]);
    assert_eq!(outcomes[2].result.as_ref().ok(), Some(&30));
}

#[tokio::test(start_paused = true)]
async fn one_shot_keys_do_not_accumulate() {
    let executor = executor();
    let options = ExecuteOptions::named("replace_draft");

    for n in 0..1000_u32 {
        let key = format!("draft:{n}");
        executor
            .execute(&options, Some(&key), |_| async move { Ok::<_, StoreFault>(n) })
            .await
            .expect("succeeds");
    }
    assert_eq!(executor.cache().len(), 1000);

    tokio::time::advance(Duration::from_secs(3600)).await;
    for n in 0..10_u32 {
        let key = format!("fresh:{n}");
        executor
            .execute(&options, Some(&key), |_| async move { Ok::<_, StoreFault>(n) })
            .await
            .expect("succeeds");
    }
    assert_eq!(executor.cache().len(), 10);
}
