use std::collections::BTreeSet;

use crate::error::Result;
use crate::reconcile::locate_bit;

use super::{BitLocation, LocationChecker, LocationId, PollContext, prune};

/// Reports locations for set bits of one record read in a single call.
pub struct BitsChecker {
    name: String,
    offset: u64,
    length: usize,
    bits: Vec<BitLocation>,
    remaining: BTreeSet<LocationId>,
}

impl BitsChecker {
    pub fn new(name: &str, offset: u64, length: usize, bits: Vec<BitLocation>) -> Self {
        let remaining = bits.iter().map(|b| b.location).collect();
        Self {
            name: name.to_string(),
            offset,
            length,
            bits,
            remaining,
        }
    }
}

impl LocationChecker for BitsChecker {
    fn name(&self) -> &str {
        &self.name
    }

    fn poll(&mut self, cx: &mut PollContext<'_>, out: &mut BTreeSet<LocationId>) -> Result<()> {
        prune(&mut self.remaining, cx.checked);
        if self.remaining.is_empty() {
            return Ok(());
        }

        let record = cx.cache.read(self.offset, self.length)?;
        for entry in &self.bits {
            if !self.remaining.contains(&entry.location) {
                continue;
            }
            let (byte, mask) = locate_bit(entry.bit);
            if record.get(byte).is_some_and(|&b| b & mask != 0) {
                out.insert(entry.location);
            }
        }
        Ok(())
    }

    fn remaining(&self) -> &BTreeSet<LocationId> {
        &self.remaining
    }

    fn reset(&mut self) {
        self.remaining = self.bits.iter().map(|b| b.location).collect();
    }
}
