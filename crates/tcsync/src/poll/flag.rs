use std::collections::BTreeSet;

use crate::error::Result;

use super::{FlagDef, LocationChecker, LocationId, PollContext, prune};

/// Reports a location while its completion byte is set.
///
/// Only the current value matters, so a missed transition is caught on the
/// next cycle.
pub struct FlagChecker {
    name: String,
    flags: Vec<FlagDef>,
    remaining: BTreeSet<LocationId>,
}

impl FlagChecker {
    pub fn new(name: &str, flags: Vec<FlagDef>) -> Self {
        let remaining = flags.iter().map(|f| f.location).collect();
        Self {
            name: name.to_string(),
            flags,
            remaining,
        }
    }
}

impl LocationChecker for FlagChecker {
    fn name(&self) -> &str {
        &self.name
    }

    fn poll(&mut self, cx: &mut PollContext<'_>, out: &mut BTreeSet<LocationId>) -> Result<()> {
        prune(&mut self.remaining, cx.checked);
        for flag in &self.flags {
            if !self.remaining.contains(&flag.location) {
                continue;
            }
            let value = cx.cache.read(flag.offset, 1)?[0];
            if value & flag.mask != 0 {
                out.insert(flag.location);
            }
        }
        Ok(())
    }

    fn remaining(&self) -> &BTreeSet<LocationId> {
        &self.remaining
    }

    fn reset(&mut self) {
        self.remaining = self.flags.iter().map(|f| f.location).collect();
    }
}
