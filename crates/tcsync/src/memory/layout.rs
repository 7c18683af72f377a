//! Fixed layout and timing constants shared by the sync components.

/// Persisted expected-index field inside the target process
pub mod expected_index {
    /// Usable ASCII digits (a 16-byte name field minus its terminator)
    pub const WIDTH: usize = 15;
}

/// Goal display text
pub mod goal_display {
    /// Usable bytes of the display field; one more byte holds the terminator
    pub const MAX_TEXT: usize = 15;
}

/// Default timing for the sync loop
pub mod timing {
    /// Interval between attached cycles (ms)
    pub const POLL_INTERVAL_MS: u64 = 100;

    /// Delay between reattachment attempts (ms)
    pub const REATTACH_DELAY_MS: u64 = 5000;

    /// Delay between attempts to apply one live item effect (ms)
    pub const ITEM_RETRY_DELAY_MS: u64 = 10;

    /// Attempts before a stalled item effect is left for the next cycle
    pub const ITEM_RETRY_ATTEMPTS: u32 = 50;

    /// Interval for re-reporting unconfirmed location checks (ms)
    pub const CHECK_RESEND_INTERVAL_MS: u64 = 5000;
}
