//! Keeps engine-owned bits of process bitfields at their desired values.

mod overrides;
mod region;

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::error::Result;
use crate::memory::MemoryPort;

pub use overrides::{Gate, PendingOverride, ShopDef, ShopOverride};
pub use region::{BitRegion, RegionBit, RegionDef, locate_bit};

/// Merge desired owned bits into freshly read live bytes.
///
/// Foreign bits keep their live value. When `override_bit` names an owned
/// bit it is cleared for this pass regardless of its desired value.
pub fn reconcile(
    live: &[u8],
    owned: &[u8],
    desired: &[u8],
    override_bit: Option<u32>,
) -> Vec<u8> {
    let mut out: Vec<u8> = live
        .iter()
        .zip(owned)
        .zip(desired)
        .map(|((&live, &owned), &desired)| (live & !owned) | (desired & owned))
        .collect();

    if let Some(bit) = override_bit {
        let (byte, mask) = locate_bit(bit);
        if owned.get(byte).is_some_and(|&o| o & mask != 0) {
            out[byte] &= !mask;
        }
    }
    out
}

/// Maximal `(start, end)` byte runs where `a` and `b` differ, in order.
fn changed_runs(a: &[u8], b: &[u8]) -> Vec<(usize, usize)> {
    let mut runs: Vec<(usize, usize)> = Vec::new();
    for (i, _) in a.iter().zip(b).enumerate().filter(|(_, (x, y))| x != y) {
        match runs.last_mut() {
            Some((_, end)) if *end == i => *end = i + 1,
            _ => runs.push((i, i + 1)),
        }
    }
    runs
}

/// All bit regions the engine owns bits in.
#[derive(Debug, Clone, Default)]
pub struct BitfieldReconciler {
    regions: Vec<BitRegion>,
    by_name: HashMap<String, usize>,
}

impl BitfieldReconciler {
    pub fn new(regions: Vec<BitRegion>) -> Self {
        let by_name = regions
            .iter()
            .enumerate()
            .map(|(i, region)| (region.name().to_string(), i))
            .collect();
        Self { regions, by_name }
    }

    pub fn region(&self, name: &str) -> Option<&BitRegion> {
        self.by_name.get(name).map(|&i| &self.regions[i])
    }

    pub fn is_owned(&self, region: &str, bit: u32) -> bool {
        self.region(region).is_some_and(|r| r.is_owned(bit))
    }

    pub fn desired(&self, region: &str, bit: u32) -> bool {
        self.region(region).is_some_and(|r| r.desired_bit(bit))
    }

    /// Set the desired value of an owned bit. Returns false when the region
    /// is unknown or the bit is not owned.
    pub fn set_desired(&mut self, target: &RegionBit, value: bool) -> bool {
        match self.by_name.get(&target.region) {
            Some(&i) => self.regions[i].set_desired(target.bit, value),
            None => false,
        }
    }

    /// Drive a wholly owned byte to `value`. Returns false when the region
    /// is unknown or any bit of the byte is not owned.
    pub fn set_desired_byte(&mut self, region: &str, byte: usize, value: u8) -> bool {
        match self.by_name.get(region) {
            Some(&i) => self.regions[i].set_desired_byte(byte, value),
            None => false,
        }
    }

    /// Return every owned bit to its reset value.
    pub fn reset_desired(&mut self) {
        for region in &mut self.regions {
            region.clear_desired();
        }
    }

    /// Read, merge and write one region. Returns whether anything was written.
    pub fn reconcile_region(
        &self,
        port: &dyn MemoryPort,
        region: &BitRegion,
        pending: Option<&PendingOverride>,
    ) -> Result<bool> {
        if region.owned_bit_count() == 0 {
            return Ok(false);
        }

        let live = port.read_bytes(region.offset(), region.len())?;
        let override_bit = pending
            .filter(|p| p.region == region.name())
            .map(|p| p.bit);
        let merged = reconcile(&live, region.owned(), region.desired(), override_bit);

        let runs = changed_runs(&live, &merged);
        if runs.is_empty() {
            trace!("Region '{}' already reconciled", region.name());
            return Ok(false);
        }
        for (start, end) in runs {
            debug!(
                "Region '{}': writing bytes {}..{} (override: {:?})",
                region.name(),
                start,
                end,
                override_bit
            );
            port.write_bytes(region.offset() + start as u64, &merged[start..end])?;
        }
        Ok(true)
    }

    /// Reconcile every region, returning how many were written.
    pub fn reconcile_all(
        &self,
        port: &dyn MemoryPort,
        pending: Option<&PendingOverride>,
    ) -> Result<usize> {
        let mut written = 0;
        for region in &self.regions {
            if self.reconcile_region(port, region, pending)? {
                written += 1;
            }
        }
        Ok(written)
    }
}
