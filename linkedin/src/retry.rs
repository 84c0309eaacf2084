//! Bounded retries for the few responses LinkedIn is known to return transiently.

use crate::config::ClientConfig;
use crate::error::Result;
use std::future::Future;
use std::time::Duration;

/// What a single attempt produced.
pub(crate) enum Attempt<T> {
    /// Final answer, success or failure. Never retried.
    Done(Result<T>),
    /// A condition that may clear up on its own. Carries the error to surface if the budget runs
    /// out.
    Transient(crate::Error),
}

/// Linear backoff with a fixed retry budget.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    retries: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub(crate) fn new(retries: u32, base_delay: Duration) -> Self {
        Self {
            retries,
            base_delay,
        }
    }

    pub(crate) fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.retry_attempts, config.delay_between_requests)
    }

    /// Delay before the `retry`-th retry (1-based). Grows with every retry.
    pub(crate) fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(retry) + Duration::from_millis(1)
    }

    /// Runs `attempt` until it is [`Attempt::Done`] or the retry budget is spent.
    pub(crate) async fn run<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Attempt<T>>,
    {
        let mut retry = 0;
        loop {
            match attempt().await {
                Attempt::Done(result) => return result,
                Attempt::Transient(error) if retry < self.retries => {
                    retry += 1;
                    let delay = self.delay_for(retry);
                    tracing::warn!(
                        operation,
                        retry,
                        budget = self.retries,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "transient failure, trying again"
                    );
                    tokio::time::sleep(delay).await;
                }
                Attempt::Transient(error) => {
                    tracing::warn!(operation, retries = retry, %error, "giving up");
                    return Err(error);
                }
            }
        }
    }
}
