//! Location checkers that turn memory observations into check events.
//!
//! A checker emits every location whose condition currently holds and keeps
//! it in its working set until the session confirms it, so an emission lost
//! to a disconnect is simply repeated on a later cycle.

mod bits;
mod cache;
mod flag;
mod gated;
mod rule;
mod threshold;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::Result;
use crate::memory::MemoryPort;

pub use bits::BitsChecker;
pub use cache::ReadCache;
pub use flag::FlagChecker;
pub use gated::ContextGatedChecker;
pub use rule::{
    BitLocation, FlagDef, GatedOutcome, LocationRule, Threshold, ThresholdNode, WindowField,
    WindowGate,
};
pub use threshold::ThresholdChecker;

/// Opaque id of one location check.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LocationId(pub u64);

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-cycle inputs shared by all checkers.
pub struct PollContext<'a> {
    /// Locations the session has already confirmed.
    pub checked: &'a BTreeSet<LocationId>,
    pub cache: ReadCache<'a>,
}

impl<'a> PollContext<'a> {
    pub fn new(port: &'a dyn MemoryPort, checked: &'a BTreeSet<LocationId>) -> Self {
        Self {
            checked,
            cache: ReadCache::new(port),
        }
    }
}

pub trait LocationChecker {
    fn name(&self) -> &str;

    /// Add every currently satisfied, unconfirmed location to `out`.
    fn poll(&mut self, cx: &mut PollContext<'_>, out: &mut BTreeSet<LocationId>) -> Result<()>;

    /// Locations not yet confirmed by the session.
    fn remaining(&self) -> &BTreeSet<LocationId>;

    /// Restore the full working set for a new session lifetime.
    fn reset(&mut self);
}

/// Drop confirmed ids from a working set.
pub(crate) fn prune(remaining: &mut BTreeSet<LocationId>, checked: &BTreeSet<LocationId>) {
    remaining.retain(|id| !checked.contains(id));
}

/// All checkers, polled in configuration order.
#[derive(Default)]
pub struct LocationPollSet {
    checkers: Vec<Box<dyn LocationChecker>>,
}

impl LocationPollSet {
    pub fn new(checkers: Vec<Box<dyn LocationChecker>>) -> Self {
        Self { checkers }
    }

    pub fn from_rules(rules: &[LocationRule]) -> Self {
        Self::new(rules.iter().map(LocationRule::build).collect())
    }

    /// Run every checker against one fresh set of reads.
    pub fn poll(
        &mut self,
        port: &dyn MemoryPort,
        checked: &BTreeSet<LocationId>,
    ) -> Result<BTreeSet<LocationId>> {
        let mut cx = PollContext::new(port, checked);
        let mut out = BTreeSet::new();
        for checker in &mut self.checkers {
            checker.poll(&mut cx, &mut out)?;
        }
        trace!(
            "Polled {} checkers ({} reads), {} satisfied",
            self.checkers.len(),
            cx.cache.reads(),
            out.len()
        );
        Ok(out)
    }

    pub fn remaining(&self) -> usize {
        self.checkers.iter().map(|c| c.remaining().len()).sum()
    }

    pub fn reset(&mut self) {
        for checker in &mut self.checkers {
            checker.reset();
        }
    }

    pub fn len(&self) -> usize {
        self.checkers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkers.is_empty()
    }
}
