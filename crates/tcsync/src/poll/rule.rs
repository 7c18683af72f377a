use serde::Deserialize;

use super::{
    BitsChecker, ContextGatedChecker, FlagChecker, LocationChecker, LocationId, ThresholdChecker,
};

/// One location unlocked once a counter reaches `at_least`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Threshold {
    pub location: LocationId,
    pub at_least: u32,
}

/// A counter field and the thresholds read from it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ThresholdNode {
    pub offset: u64,
    #[serde(default = "default_width")]
    pub width: usize,
    pub thresholds: Vec<Threshold>,
}

/// A completion byte; satisfied when `byte & mask != 0`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FlagDef {
    pub offset: u64,
    pub location: LocationId,
    #[serde(default = "default_mask")]
    pub mask: u8,
}

/// A bit of a record field mapped to a location.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BitLocation {
    pub bit: u32,
    pub location: LocationId,
}

/// A field inside a gated checker's window, relative to the window start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct WindowField {
    pub at: usize,
    #[serde(default = "default_width")]
    pub width: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct WindowGate {
    pub at: usize,
    #[serde(default = "default_width")]
    pub width: usize,
    pub equals: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatedOutcome {
    /// Selector value that identifies this outcome.
    pub value: u32,
    pub location: LocationId,
}

fn default_width() -> usize {
    1
}

fn default_mask() -> u8 {
    0xFF
}

/// Static poll rule as written in the game table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocationRule {
    /// "Collected N of M" counters.
    Threshold {
        name: String,
        nodes: Vec<ThresholdNode>,
    },
    /// Completion flags.
    Flag { name: String, flags: Vec<FlagDef> },
    /// Bits of one contiguous record (e.g. shop purchases).
    Bits {
        name: String,
        offset: u64,
        length: usize,
        bits: Vec<BitLocation>,
    },
    /// A transient screen identified by a selector and gating fields, all
    /// read from one window in a single call.
    Gated {
        name: String,
        offset: u64,
        length: usize,
        selector: WindowField,
        #[serde(default)]
        gates: Vec<WindowGate>,
        outcomes: Vec<GatedOutcome>,
    },
}

impl LocationRule {
    pub fn name(&self) -> &str {
        match self {
            LocationRule::Threshold { name, .. }
            | LocationRule::Flag { name, .. }
            | LocationRule::Bits { name, .. }
            | LocationRule::Gated { name, .. } => name,
        }
    }

    /// Every location this rule can report.
    pub fn locations(&self) -> Vec<LocationId> {
        match self {
            LocationRule::Threshold { nodes, .. } => nodes
                .iter()
                .flat_map(|node| node.thresholds.iter().map(|t| t.location))
                .collect(),
            LocationRule::Flag { flags, .. } => flags.iter().map(|f| f.location).collect(),
            LocationRule::Bits { bits, .. } => bits.iter().map(|b| b.location).collect(),
            LocationRule::Gated { outcomes, .. } => outcomes.iter().map(|o| o.location).collect(),
        }
    }

    pub fn build(&self) -> Box<dyn LocationChecker> {
        match self {
            LocationRule::Threshold { name, nodes } => {
                Box::new(ThresholdChecker::new(name, nodes.clone()))
            }
            LocationRule::Flag { name, flags } => Box::new(FlagChecker::new(name, flags.clone())),
            LocationRule::Bits {
                name,
                offset,
                length,
                bits,
            } => Box::new(BitsChecker::new(name, *offset, *length, bits.clone())),
            LocationRule::Gated {
                name,
                offset,
                length,
                selector,
                gates,
                outcomes,
            } => Box::new(ContextGatedChecker::new(
                name,
                *offset,
                *length,
                *selector,
                gates.clone(),
                outcomes.clone(),
            )),
        }
    }
}
