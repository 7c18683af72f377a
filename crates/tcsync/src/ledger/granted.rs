use std::collections::BTreeMap;

use crate::capability::CapabilityId;

/// Capabilities granted so far, with how many times each was received.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantedCapabilitySet {
    counts: BTreeMap<CapabilityId, u32>,
}

impl GrantedCapabilitySet {
    /// Record one grant, returning the count before it.
    pub fn grant(&mut self, capability: CapabilityId) -> u32 {
        let count = self.counts.entry(capability).or_insert(0);
        let prior = *count;
        *count += 1;
        prior
    }

    pub fn count(&self, capability: CapabilityId) -> u32 {
        self.counts.get(&capability).copied().unwrap_or(0)
    }

    pub fn contains(&self, capability: CapabilityId) -> bool {
        self.counts.contains_key(&capability)
    }

    pub fn iter(&self) -> impl Iterator<Item = (CapabilityId, u32)> + '_ {
        self.counts.iter().map(|(&id, &count)| (id, count))
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }
}
