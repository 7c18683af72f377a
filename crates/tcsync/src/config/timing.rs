use std::time::Duration;

use serde::Deserialize;

use crate::memory::layout::timing;
use crate::retry::FixedDelay;

/// Loop cadence and retry budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub poll_interval_ms: u64,
    pub reattach_delay_ms: u64,
    pub item_retry_delay_ms: u64,
    pub item_retry_attempts: u32,
    pub check_resend_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: timing::POLL_INTERVAL_MS,
            reattach_delay_ms: timing::REATTACH_DELAY_MS,
            item_retry_delay_ms: timing::ITEM_RETRY_DELAY_MS,
            item_retry_attempts: timing::ITEM_RETRY_ATTEMPTS,
            check_resend_interval_ms: timing::CHECK_RESEND_INTERVAL_MS,
        }
    }
}

impl TimingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn reattach_delay(&self) -> Duration {
        Duration::from_millis(self.reattach_delay_ms)
    }

    pub fn check_resend_interval(&self) -> Duration {
        Duration::from_millis(self.check_resend_interval_ms)
    }

    /// Retry policy for a live item effect while the game is not in a save.
    pub fn item_retry(&self) -> FixedDelay {
        FixedDelay::new(
            Duration::from_millis(self.item_retry_delay_ms),
            self.item_retry_attempts,
        )
    }
}
