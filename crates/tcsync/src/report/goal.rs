use serde::Deserialize;
use tracing::{debug, info};

use crate::capability::CapabilityId;
use crate::error::Result;
use crate::graph::UnlockDependencyGraph;
use crate::ledger::GrantedCapabilitySet;
use crate::memory::MemoryPort;
use crate::memory::layout::goal_display;

/// `count` units of `capability`, where each receipt is worth `weight` units.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CapabilityCount {
    pub capability: CapabilityId,
    #[serde(default = "default_one")]
    pub count: u32,
    #[serde(default = "default_one")]
    pub weight: u32,
}

fn default_one() -> u32 {
    1
}

impl CapabilityCount {
    /// Units held after the receipts in `granted`.
    pub fn progress(&self, granted: &GrantedCapabilitySet) -> u32 {
        granted.count(self.capability).saturating_mul(self.weight)
    }
}

/// In-game text field showing progress towards one goal capability.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GoalDisplay {
    pub offset: u64,
    pub capability: CapabilityId,
}

/// Completion condition. An empty goal is satisfied immediately.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GoalDef {
    #[serde(default)]
    pub capabilities: Vec<CapabilityCount>,
    #[serde(default)]
    pub areas: Vec<String>,
    #[serde(default)]
    pub display: Option<GoalDisplay>,
}

impl GoalDef {
    pub fn is_satisfied(
        &self,
        granted: &GrantedCapabilitySet,
        graph: &UnlockDependencyGraph,
    ) -> bool {
        self.capabilities
            .iter()
            .all(|req| req.progress(granted) >= req.count)
            && self.areas.iter().all(|area| graph.is_unlocked(area))
    }

    /// Requirement on `capability`, if the goal names it.
    pub fn target(&self, capability: CapabilityId) -> Option<&CapabilityCount> {
        self.capabilities
            .iter()
            .find(|req| req.capability == capability)
    }
}

/// Progress text such as `03/10 GOAL`, truncated and NUL terminated.
pub fn goal_display_text(current: u32, target: u32) -> Vec<u8> {
    let width = target.to_string().len().max(2);
    let mut bytes = format!("{current:0width$}/{target:0width$} GOAL").into_bytes();
    bytes.truncate(goal_display::MAX_TEXT);
    bytes.push(0);
    bytes
}

/// Goal state for one session lifetime.
#[derive(Debug, Clone)]
pub struct Goal {
    def: GoalDef,
    reported: bool,
    shown: Option<u32>,
}

impl Goal {
    pub fn new(def: GoalDef) -> Self {
        Self {
            def,
            reported: false,
            shown: None,
        }
    }

    pub fn def(&self) -> &GoalDef {
        &self.def
    }

    /// True when the goal holds and has not been reported yet.
    pub fn completion_due(
        &self,
        granted: &GrantedCapabilitySet,
        graph: &UnlockDependencyGraph,
    ) -> bool {
        !self.reported && self.def.is_satisfied(granted, graph)
    }

    pub fn mark_reported(&mut self) {
        info!("Goal complete");
        self.reported = true;
    }

    pub fn is_reported(&self) -> bool {
        self.reported
    }

    /// Write the progress text when the tracked count changed. Returns whether
    /// a write happened.
    pub fn update_display(
        &mut self,
        port: &dyn MemoryPort,
        granted: &GrantedCapabilitySet,
    ) -> Result<bool> {
        let Some(display) = &self.def.display else {
            return Ok(false);
        };
        let (current, target) = match self.def.target(display.capability) {
            Some(req) => (req.progress(granted), req.count),
            None => (granted.count(display.capability), 0),
        };
        if self.shown == Some(current) {
            return Ok(false);
        }

        let text = goal_display_text(current, target);
        debug!("Goal display: {}/{}", current, target);
        port.write_bytes(display.offset, &text)?;
        self.shown = Some(current);
        Ok(true)
    }

    /// The process was lost; the display must be rewritten on the next one.
    pub fn forget_display(&mut self) {
        self.shown = None;
    }

    pub fn reset(&mut self) {
        self.reported = false;
        self.shown = None;
    }
}
