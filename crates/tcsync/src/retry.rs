//! Retry strategies for bounded waits.

use std::time::Duration;

use crate::shutdown::ShutdownSignal;

/// Decides whether, and after how long, a failed attempt is retried.
pub trait RetryStrategy {
    /// Delay before retry number `retry` (starting at 1), or `None` to give up.
    fn next_delay(&self, retry: u32) -> Option<Duration>;
}

/// The same delay between every retry, up to `max_retries`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelay {
    pub delay: Duration,
    pub max_retries: u32,
}

impl FixedDelay {
    pub fn new(delay: Duration, max_retries: u32) -> Self {
        Self { delay, max_retries }
    }
}

impl RetryStrategy for FixedDelay {
    fn next_delay(&self, retry: u32) -> Option<Duration> {
        (retry <= self.max_retries).then_some(self.delay)
    }
}

/// Outcome of [`retry_until`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome<T> {
    Done(T),
    Exhausted,
    Shutdown,
}

/// Run `attempt` until it yields a value, the strategy gives up, or shutdown
/// is signaled during a wait.
pub fn retry_until<T, E>(
    strategy: &dyn RetryStrategy,
    shutdown: &ShutdownSignal,
    mut attempt: impl FnMut() -> Result<Option<T>, E>,
) -> Result<RetryOutcome<T>, E> {
    let mut retry = 0u32;
    loop {
        if let Some(value) = attempt()? {
            return Ok(RetryOutcome::Done(value));
        }
        retry += 1;
        let Some(delay) = strategy.next_delay(retry) else {
            return Ok(RetryOutcome::Exhausted);
        };
        if shutdown.wait(delay) {
            return Ok(RetryOutcome::Shutdown);
        }
    }
}
