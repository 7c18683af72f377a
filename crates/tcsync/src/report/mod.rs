//! Outgoing check reports and goal completion.

mod goal;

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use crate::poll::LocationId;

pub use goal::{CapabilityCount, Goal, GoalDef, GoalDisplay, goal_display_text};

/// Decides which satisfied locations to send this cycle.
///
/// New ids go out immediately; ids still outstanding are sent again once per
/// `resend_interval` in case an earlier report was lost.
#[derive(Debug, Clone)]
pub struct CheckReporter {
    reported: BTreeSet<LocationId>,
    last_resend: Option<Instant>,
    resend_interval: Duration,
}

impl CheckReporter {
    pub fn new(resend_interval: Duration) -> Self {
        Self {
            reported: BTreeSet::new(),
            last_resend: None,
            resend_interval,
        }
    }

    /// Ids to report, restricted to those the session still lists as missing.
    pub fn select(
        &mut self,
        satisfied: &BTreeSet<LocationId>,
        outstanding: &BTreeSet<LocationId>,
        now: Instant,
    ) -> BTreeSet<LocationId> {
        let candidates: BTreeSet<LocationId> =
            satisfied.intersection(outstanding).copied().collect();

        let resend_due = self
            .last_resend
            .is_none_or(|last| now.duration_since(last) >= self.resend_interval);
        if resend_due {
            self.last_resend = Some(now);
            return candidates;
        }
        candidates.difference(&self.reported).copied().collect()
    }

    pub fn mark_reported(&mut self, ids: &BTreeSet<LocationId>) {
        self.reported.extend(ids.iter().copied());
    }

    pub fn reset(&mut self) {
        self.reported.clear();
        self.last_resend = None;
    }
}
