use std::collections::BTreeSet;

use crate::error::Result;
use crate::memory::Field;

use super::{LocationChecker, LocationId, PollContext, ThresholdNode, prune};

/// Reports each location once its node's counter reaches the threshold.
pub struct ThresholdChecker {
    name: String,
    nodes: Vec<ThresholdNode>,
    remaining: BTreeSet<LocationId>,
}

impl ThresholdChecker {
    pub fn new(name: &str, nodes: Vec<ThresholdNode>) -> Self {
        let mut checker = Self {
            name: name.to_string(),
            nodes,
            remaining: BTreeSet::new(),
        };
        checker.reset();
        checker
    }
}

impl LocationChecker for ThresholdChecker {
    fn name(&self) -> &str {
        &self.name
    }

    fn poll(&mut self, cx: &mut PollContext<'_>, out: &mut BTreeSet<LocationId>) -> Result<()> {
        prune(&mut self.remaining, cx.checked);

        for node in &self.nodes {
            let pending: Vec<_> = node
                .thresholds
                .iter()
                .filter(|t| self.remaining.contains(&t.location))
                .collect();
            if pending.is_empty() {
                continue;
            }

            let field = Field::new(node.offset, node.width);
            let counter = field.decode(cx.cache.read(node.offset, node.width)?);
            out.extend(
                pending
                    .into_iter()
                    .filter(|t| counter >= t.at_least)
                    .map(|t| t.location),
            );
        }
        Ok(())
    }

    fn remaining(&self) -> &BTreeSet<LocationId> {
        &self.remaining
    }

    fn reset(&mut self) {
        self.remaining = self
            .nodes
            .iter()
            .flat_map(|node| node.thresholds.iter().map(|t| t.location))
            .collect();
    }
}
