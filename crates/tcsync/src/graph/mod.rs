//! Area unlocks driven by granted capabilities.

use std::collections::{BTreeSet, HashMap};

use serde::Deserialize;
use tracing::{debug, info};

use crate::capability::CapabilityId;
use crate::reconcile::RegionBit;

/// Requirement satisfied by receiving `capability` at least `at_least` times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CountedRequirement {
    pub capability: CapabilityId,
    pub at_least: u32,
}

/// Static definition of one unlockable area.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AreaDef {
    pub id: String,
    #[serde(default)]
    pub requires: Vec<CapabilityId>,
    #[serde(default)]
    pub counted: Option<CountedRequirement>,
    /// Bit that holds the area's unlocked flag in the process.
    #[serde(default)]
    pub unlock: Option<RegionBit>,
}

/// Runtime state of an area. Its unmet set and remaining count only shrink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AreaNode {
    id: String,
    unmet: BTreeSet<CapabilityId>,
    remaining: u32,
}

impl AreaNode {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn unmet(&self) -> &BTreeSet<CapabilityId> {
        &self.unmet
    }

    /// Receipts of the counted capability still needed.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_unlocked(&self) -> bool {
        self.unmet.is_empty() && self.remaining == 0
    }
}

/// Emitted once per area when its last requirement is satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AreaUnlocked {
    pub area: String,
    pub unlock: Option<RegionBit>,
}

#[derive(Debug, Clone)]
pub struct UnlockDependencyGraph {
    defs: Vec<AreaDef>,
    nodes: Vec<AreaNode>,
    /// Capability -> nodes still waiting on it, in construction order.
    dependents: HashMap<CapabilityId, Vec<usize>>,
    /// Counted capability -> nodes whose count is not yet reached.
    counters: HashMap<CapabilityId, Vec<usize>>,
    events: Vec<AreaUnlocked>,
}

impl UnlockDependencyGraph {
    pub fn new(defs: &[AreaDef]) -> Self {
        let mut graph = Self {
            defs: defs.to_vec(),
            nodes: Vec::new(),
            dependents: HashMap::new(),
            counters: HashMap::new(),
            events: Vec::new(),
        };
        graph.build();
        graph
    }

    fn build(&mut self) {
        self.nodes.clear();
        self.dependents.clear();
        self.counters.clear();
        self.events.clear();

        for (index, def) in self.defs.iter().enumerate() {
            let unmet: BTreeSet<CapabilityId> = def.requires.iter().copied().collect();
            for &capability in &unmet {
                self.dependents.entry(capability).or_default().push(index);
            }
            let remaining = def.counted.map_or(0, |counted| counted.at_least);
            if let Some(counted) = def.counted
                && remaining > 0
            {
                self.counters.entry(counted.capability).or_default().push(index);
            }
            let node = AreaNode {
                id: def.id.clone(),
                unmet,
                remaining,
            };
            if node.is_unlocked() {
                self.events.push(AreaUnlocked {
                    area: def.id.clone(),
                    unlock: def.unlock.clone(),
                });
            }
            self.nodes.push(node);
        }
    }

    /// Remove `capability` from every area waiting on it and count it toward
    /// areas that need it repeatedly, returning how many areas became
    /// unlocked. Grants beyond what any area needs are no-ops.
    pub fn on_capability_granted(&mut self, capability: CapabilityId) -> usize {
        let mut touched = BTreeSet::new();

        if let Some(dependents) = self.dependents.remove(&capability) {
            for index in dependents {
                let node = &mut self.nodes[index];
                assert!(
                    node.unmet.remove(&capability),
                    "area '{}' was indexed under capability {} but did not require it",
                    node.id,
                    capability
                );
                debug!("Removed {} from '{}' requirements", capability, node.id);
                touched.insert(index);
            }
        }

        if let Some(counting) = self.counters.get_mut(&capability) {
            let nodes = &mut self.nodes;
            counting.retain(|&index| {
                let node = &mut nodes[index];
                node.remaining = node.remaining.saturating_sub(1);
                debug!("'{}' needs {} more of {}", node.id, node.remaining, capability);
                touched.insert(index);
                node.remaining > 0
            });
            if counting.is_empty() {
                self.counters.remove(&capability);
            }
        }

        if touched.is_empty() {
            debug!("Capability {} unlocks no remaining area", capability);
        }

        // every touched node was locked before this grant
        let mut unlocked = 0;
        for index in touched {
            let node = &self.nodes[index];
            if node.is_unlocked() {
                info!("Area '{}' unlocked", node.id);
                self.events.push(AreaUnlocked {
                    area: node.id.clone(),
                    unlock: self.defs[index].unlock.clone(),
                });
                unlocked += 1;
            }
        }
        unlocked
    }

    /// Take the unlock events produced since the last drain.
    pub fn drain_events(&mut self) -> Vec<AreaUnlocked> {
        std::mem::take(&mut self.events)
    }

    /// Rebuild from the static definitions; zero-requirement areas are queued
    /// as unlocked again.
    pub fn reset(&mut self) {
        self.build();
    }

    pub fn node(&self, id: &str) -> Option<&AreaNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn is_unlocked(&self, id: &str) -> bool {
        self.node(id).is_some_and(AreaNode::is_unlocked)
    }

    pub fn nodes(&self) -> &[AreaNode] {
        &self.nodes
    }

    pub fn unlocked_count(&self) -> usize {
        self.nodes.iter().filter(|node| node.is_unlocked()).count()
    }
}
