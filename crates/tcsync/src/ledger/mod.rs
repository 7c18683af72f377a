//! Ordered item receipts and the capabilities they have granted.

mod granted;
mod rollback;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::capability::CapabilityId;
use crate::error::Result;

pub use granted::GrantedCapabilitySet;
pub use rollback::{RollbackAction, detect_rollback};

/// One received item: its position in the session's log and what it grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub index: u64,
    pub capability: CapabilityId,
}

impl LedgerEntry {
    pub fn new(index: u64, capability: u64) -> Self {
        Self {
            index,
            capability: CapabilityId(capability),
        }
    }
}

/// Whether a grant may touch the live process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Effects are applied to the process and the persisted index is advanced.
    Live,
    /// Only engine-local state is rebuilt; the process already holds the result.
    Silent,
}

/// Outcome of handing one entry to a [`GrantHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Applied,
    /// The live effect could not be applied yet; stop and retry later.
    Deferred,
}

/// Per-capability effects invoked by the ledger.
pub trait GrantHandler {
    /// Apply `entry`. `occurrence` is how many times the capability was
    /// granted before this entry.
    fn grant(
        &mut self,
        entry: &LedgerEntry,
        occurrence: u32,
        mode: DeliveryMode,
    ) -> Result<Delivery>;

    /// Called after `grant` succeeds and before the ledger advances.
    fn committed(&mut self, _next_index: u64, _mode: DeliveryMode) -> Result<()> {
        Ok(())
    }
}

/// Converts the session's append-only item log into granted capabilities.
#[derive(Debug, Clone, Default)]
pub struct ItemReceiptLedger {
    entries: Vec<LedgerEntry>,
    applied_index: u64,
    granted: GrantedCapabilitySet,
}

impl ItemReceiptLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append entries from the session, returning how many were new.
    ///
    /// Entries already held are ignored. An entry whose index skips ahead is
    /// dropped with a warning, as is everything after it in the batch.
    pub fn receive(&mut self, entries: impl IntoIterator<Item = LedgerEntry>) -> usize {
        let mut appended = 0;
        for entry in entries {
            let expected = self.entries.len() as u64;
            if entry.index < expected {
                continue;
            }
            if entry.index > expected {
                warn!(
                    "Ledger gap: expected index {}, received {} (capability {})",
                    expected, entry.index, entry.capability
                );
                break;
            }
            self.entries.push(entry);
            appended += 1;
        }
        appended
    }

    /// Receive `entries` and apply everything not yet applied.
    pub fn apply_new_entries<H: GrantHandler + ?Sized>(
        &mut self,
        entries: impl IntoIterator<Item = LedgerEntry>,
        mode: DeliveryMode,
        handler: &mut H,
    ) -> Result<usize> {
        self.receive(entries);
        self.apply_until(self.entries.len() as u64, mode, handler)
    }

    /// Apply held entries with `index < until`, returning how many were applied.
    ///
    /// Stops early (without error) when the handler defers an entry.
    pub fn apply_until<H: GrantHandler + ?Sized>(
        &mut self,
        until: u64,
        mode: DeliveryMode,
        handler: &mut H,
    ) -> Result<usize> {
        let until = until.min(self.entries.len() as u64);
        let mut applied = 0;
        while self.applied_index < until {
            let entry = self.entries[self.applied_index as usize];
            let occurrence = self.granted.count(entry.capability);
            if handler.grant(&entry, occurrence, mode)? == Delivery::Deferred {
                debug!("Delivery of index {} deferred", entry.index);
                break;
            }
            handler.committed(entry.index + 1, mode)?;
            self.granted.grant(entry.capability);
            self.applied_index = entry.index + 1;
            applied += 1;
        }
        Ok(applied)
    }

    /// Classify the persisted index against what this ledger has applied.
    pub fn detect_rollback(&self, persisted_index: u64) -> RollbackAction {
        detect_rollback(persisted_index, self.applied_index)
    }

    /// Forget applied state but keep the received entries for replay.
    pub fn rewind(&mut self) {
        self.applied_index = 0;
        self.granted.clear();
    }

    /// Forget everything; used when a new session lifetime begins.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.rewind();
    }

    pub fn applied_index(&self) -> u64 {
        self.applied_index
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn pending(&self) -> &[LedgerEntry] {
        &self.entries[self.applied_index as usize..]
    }

    pub fn granted(&self) -> &GrantedCapabilitySet {
        &self.granted
    }
}
