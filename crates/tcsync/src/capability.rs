//! Capabilities and the effect each one has when granted.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

/// Opaque id of one grantable unit, as sent by the session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CapabilityId(pub u64);

impl fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What granting a capability does.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, IntoStaticStr)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Effect {
    /// Adds `amount` to the u32 counter at `offset`, saturating at `max`.
    /// Only has a live effect; silent replay skips it.
    Consumable {
        offset: u64,
        amount: u32,
        #[serde(default = "default_max")]
        max: u32,
    },
    /// Satisfies area requirements only.
    Unlock,
    /// Owns one bit of a region and sets it while granted.
    Bit { region: String, bit: u32 },
    /// Owns all eight bits of `byte` and drives it to `value` while
    /// granted, to zero otherwise.
    Byte { region: String, byte: usize, value: u8 },
    /// The n-th receipt sets `bits[n]`.
    Progressive { region: String, bits: Vec<u32> },
    /// Counted only.
    Counter,
    Noop,
}

fn default_max() -> u32 {
    u32::MAX
}

impl Effect {
    pub fn kind(&self) -> &'static str {
        self.into()
    }

    /// Region bits this effect may drive, as `(region, bit)` pairs.
    pub fn region_bits(&self) -> Vec<(&str, u32)> {
        match self {
            Effect::Bit { region, bit } => vec![(region.as_str(), *bit)],
            Effect::Byte { region, byte, .. } => {
                let first = (*byte as u32).saturating_mul(8);
                (first..first.saturating_add(8))
                    .map(|bit| (region.as_str(), bit))
                    .collect()
            }
            Effect::Progressive { region, bits } => {
                bits.iter().map(|&bit| (region.as_str(), bit)).collect()
            }
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CapabilityDef {
    pub id: CapabilityId,
    #[serde(default)]
    pub name: String,
    pub effect: Effect,
}

impl CapabilityDef {
    /// Name for log lines, falling back to the id.
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            format!("#{}", self.id)
        } else {
            self.name.clone()
        }
    }
}

/// Lookup from capability id to its definition, built once at load time.
#[derive(Debug, Clone, Default)]
pub struct EffectTable {
    by_id: HashMap<CapabilityId, CapabilityDef>,
}

impl EffectTable {
    pub fn new(defs: impl IntoIterator<Item = CapabilityDef>) -> Self {
        Self {
            by_id: defs.into_iter().map(|def| (def.id, def)).collect(),
        }
    }

    pub fn get(&self, id: CapabilityId) -> Option<&CapabilityDef> {
        self.by_id.get(&id)
    }

    pub fn contains(&self, id: CapabilityId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CapabilityDef> {
        self.by_id.values()
    }
}
