use std::collections::BTreeSet;

use tracing::info;

use crate::error::Result;
use crate::memory::Field;

use super::{GatedOutcome, LocationChecker, LocationId, PollContext, WindowField, WindowGate, prune};

/// Detects a transient screen whose meaning depends on other fields.
///
/// The selector and every gate come from one read of the window, so they
/// describe the same instant. Detections are latched because the screen
/// may be gone by the time the session is reachable.
pub struct ContextGatedChecker {
    name: String,
    offset: u64,
    length: usize,
    selector: WindowField,
    gates: Vec<WindowGate>,
    outcomes: Vec<GatedOutcome>,
    remaining: BTreeSet<LocationId>,
    latched: BTreeSet<LocationId>,
}

impl ContextGatedChecker {
    pub fn new(
        name: &str,
        offset: u64,
        length: usize,
        selector: WindowField,
        gates: Vec<WindowGate>,
        outcomes: Vec<GatedOutcome>,
    ) -> Self {
        let remaining = outcomes.iter().map(|o| o.location).collect();
        Self {
            name: name.to_string(),
            offset,
            length,
            selector,
            gates,
            outcomes,
            remaining,
            latched: BTreeSet::new(),
        }
    }

    #[cfg(test)]
    pub fn latched(&self) -> &BTreeSet<LocationId> {
        &self.latched
    }
}

fn window_value(window: &[u8], at: usize, width: usize) -> Option<u32> {
    let bytes = window.get(at..at + width)?;
    Some(Field::new(0, width).decode(bytes))
}

impl LocationChecker for ContextGatedChecker {
    fn name(&self) -> &str {
        &self.name
    }

    fn poll(&mut self, cx: &mut PollContext<'_>, out: &mut BTreeSet<LocationId>) -> Result<()> {
        prune(&mut self.remaining, cx.checked);
        prune(&mut self.latched, cx.checked);

        if !self.remaining.is_empty() {
            let window = cx.cache.read(self.offset, self.length)?;
            let open = self.gates.iter().all(|gate| {
                window_value(window, gate.at, gate.width) == Some(gate.equals)
            });
            if open {
                let selected = window_value(window, self.selector.at, self.selector.width);
                let hit = self
                    .outcomes
                    .iter()
                    .find(|o| Some(o.value) == selected && self.remaining.contains(&o.location));
                if let Some(outcome) = hit
                    && self.latched.insert(outcome.location)
                {
                    info!("'{}' detected location {}", self.name, outcome.location);
                }
            }
        }

        out.extend(self.latched.iter().copied());
        Ok(())
    }

    fn remaining(&self) -> &BTreeSet<LocationId> {
        &self.remaining
    }

    fn reset(&mut self) {
        self.remaining = self.outcomes.iter().map(|o| o.location).collect();
        self.latched.clear();
    }
}
