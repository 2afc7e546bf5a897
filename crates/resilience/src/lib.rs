//! Resilient execution for persistence calls over unreliable networks.
//!
//! A field agent's phone times out, the agent taps "submit" again, and the
//! same request arrives twice. This crate makes that safe.
//!
//! ## What we do here
//!
//! - **Retry transient failures** - exponential backoff with jitter, driven by
//!   [`RetryConfig`]. Only errors whose [`ErrorCategory`] is on the allow-list
//!   (network, server, timeout, rate limit) are retried.
//! - **Replay successes** - with an idempotency key, a successful result is
//!   kept in the [`IdempotencyCache`] for its TTL and returned to repeat calls
//!   without running the operation again.
//! - **Honor cancellation** - a [`CancellationToken`](tokio_util::sync::CancellationToken)
//!   in [`ExecuteOptions`] aborts backoff sleeps and further attempts.
//! - **Run batches** - [`ResilientExecutor::execute_batch`] reports a per-item
//!   outcome; one failure never aborts the rest.
//!
//! Giving up yields an [`ExecutorError`] carrying the attempt count, elapsed
//! time, a generated request id and the last underlying error.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use resilience::{ErrorCategory, ExecuteOptions, IdempotencyCache, ResilientExecutor, RetryConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let executor = ResilientExecutor::new(RetryConfig::default(), Arc::new(IdempotencyCache::default()));
//! let options = ExecuteOptions::named("create_draft");
//!
//! let id = executor
//!     .execute(&options, Some("submit-42"), |_attempt| async { Ok::<_, ErrorCategory>(42_u64) })
//!     .await
//!     .unwrap();
//! assert_eq!(id, 42);
//! assert_eq!(executor.cache().len(), 1);
//! # }
//! ```
mod config;
mod error;
mod executor;
mod idempotency;
mod serde_millis;

pub use crate::config::{IdempotencyConfig, RetryConfig};
pub use crate::error::{Classify, ConfigError, ErrorCategory, ExecutorError};
pub use crate::executor::{BatchOutcome, ExecuteOptions, ResilientExecutor};
pub use crate::idempotency::IdempotencyCache;
pub use tokio_util::sync::CancellationToken;
