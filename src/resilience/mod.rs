//! 弹性模块：重试策略、单次尝试超时与请求去重。
//!
//! # Resilience Primitives Module
//!
//! The building blocks [`ApiClient`](crate::ApiClient) composes around every
//! network call.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`RetryPolicy`] | Retryable/terminal classification and exponential backoff |
//! | [`TimeoutGuard`] | Per-attempt deadline with cooperative cancellation |
//! | [`RequestDeduplicator`] | Single-flight sharing of identical in-flight requests |
//!
//! ## Retry Policy
//!
//! ```rust
//! use resilient_api_client::resilience::{Decision, RetryPolicy};
//! use resilient_api_client::Error;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(3, Duration::from_millis(100));
//! let err = Error::connection("connection reset");
//! assert_eq!(policy.decide(&err, 1), Decision::Retry { delay: Duration::from_millis(200) });
//! assert_eq!(policy.decide(&err, 3), Decision::Fail);
//! ```
//!
//! ## Timeouts
//!
//! The guard hands each attempt a fresh child [`CancellationToken`](tokio_util::sync::CancellationToken).
//! When the deadline passes the token fires and the attempt future is dropped.
//!
//! ```rust
//! use resilient_api_client::resilience::TimeoutGuard;
//! use resilient_api_client::Error;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # tokio_test::block_on(async {
//! let guard = TimeoutGuard::new(Duration::from_millis(10));
//! let res: Result<(), Error> = guard
//!     .run(&CancellationToken::new(), |_token| futures::future::pending())
//!     .await;
//! assert!(matches!(res, Err(Error::Timeout { .. })));
//! # });
//! ```

mod dedup;
mod retry;
mod timeout;

pub use dedup::RequestDeduplicator;
pub use retry::{Classification, Decision, RetryPolicy};
pub use timeout::TimeoutGuard;
