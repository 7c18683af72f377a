//! Temporary relocks that let the game register a purchase.
//!
//! The game refuses to sell a slot whose item is already unlocked. While the
//! player has such a slot selected and has not bought it, the engine clears
//! the unlock bit for one pass; once the purchase record shows the slot as
//! bought, the override stops and the next pass restores the unlock.

use serde::Deserialize;
use tracing::debug;

use crate::error::Result;
use crate::memory::{Field, MemoryPort};

use super::{BitfieldReconciler, locate_bit};

/// A one-pass forced "locked" value for one bit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOverride {
    pub region: String,
    pub bit: u32,
}

/// A field that must hold `equals` for the shop to be considered open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Gate {
    pub offset: u64,
    #[serde(default = "default_width")]
    pub width: usize,
    pub equals: u32,
}

impl Gate {
    pub fn field(&self) -> Field {
        Field::new(self.offset, self.width)
    }
}

fn default_width() -> usize {
    1
}

/// Static description of one in-game shop.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ShopDef {
    pub name: String,
    /// Region holding the unlock bits of the items sold here.
    pub unlock_region: String,
    /// Purchase record, laid out bit-for-bit like the unlock region.
    pub purchase_offset: u64,
    pub purchase_length: usize,
    pub active_slot: Field,
    /// Slot index -> bit index. Identity when absent.
    #[serde(default)]
    pub slots: Option<Vec<u32>>,
    #[serde(default)]
    pub gates: Vec<Gate>,
}

/// Computes the override for one shop from transient process state.
#[derive(Debug, Clone)]
pub struct ShopOverride {
    def: ShopDef,
}

impl ShopOverride {
    pub fn new(def: ShopDef) -> Self {
        Self { def }
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    fn slot_bit(&self, slot: u32) -> Option<u32> {
        match &self.def.slots {
            Some(slots) => slots.get(slot as usize).copied(),
            None => Some(slot),
        }
    }

    /// Read the shop state and decide whether a bit must be relocked now.
    ///
    /// Returns `None` when the shop is closed, the selected slot has no owned
    /// unlock bit, the item is not unlocked, or the slot is already bought.
    pub fn compute(
        &self,
        port: &dyn MemoryPort,
        reconciler: &BitfieldReconciler,
    ) -> Result<Option<PendingOverride>> {
        for gate in &self.def.gates {
            if port.read_field(&gate.field())? != gate.equals {
                return Ok(None);
            }
        }

        let slot = port.read_field(&self.def.active_slot)?;
        let Some(bit) = self.slot_bit(slot) else {
            return Ok(None);
        };
        let region = &self.def.unlock_region;
        if !reconciler.is_owned(region, bit) {
            debug!("Shop '{}' slot {} has no owned unlock bit", self.def.name, slot);
            return Ok(None);
        }
        if !reconciler.desired(region, bit) {
            return Ok(None);
        }

        let (byte, mask) = locate_bit(bit);
        if byte >= self.def.purchase_length {
            return Ok(None);
        }
        let record = port.read_u8(self.def.purchase_offset + byte as u64)?;
        if record & mask != 0 {
            return Ok(None);
        }

        debug!(
            "Shop '{}' slot {} selected but not purchased, relocking bit {}",
            self.def.name, slot, bit
        );
        Ok(Some(PendingOverride {
            region: region.clone(),
            bit,
        }))
    }
}
