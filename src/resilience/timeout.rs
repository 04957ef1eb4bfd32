use crate::{Error, ErrorContext, Result};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Bounds a single attempt with a deadline.
///
/// The attempt receives a child of `parent`; that token is cancelled when the
/// deadline passes, when `parent` is cancelled, and when the guarded future is
/// dropped before finishing.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutGuard {
    timeout: Duration,
}

impl TimeoutGuard {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn run<F, Fut, T>(&self, parent: &CancellationToken, attempt: F) -> Result<T>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let token = parent.child_token();
        let _cancel_on_exit = token.clone().drop_guard();
        let fut = attempt(token.clone());
        tokio::pin!(fut);

        tokio::select! {
            biased;
            _ = parent.cancelled() => Err(Error::cancelled().with_context(
                ErrorContext::new().with_source("timeout_guard"),
            )),
            res = &mut fut => res,
            _ = tokio::time::sleep(self.timeout) => {
                token.cancel();
                Err(Error::timeout(self.timeout).with_context(
                    ErrorContext::new().with_source("timeout_guard"),
                ))
            }
        }
    }
}
