//! Boundary with the network session that delivers items and accepts checks.

use std::collections::BTreeSet;

use crate::error::Result;
use crate::ledger::LedgerEntry;
use crate::poll::LocationId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A new session lifetime: all local state must be reset before replay.
    Connected {
        checked: BTreeSet<LocationId>,
        missing: BTreeSet<LocationId>,
    },
    /// Items in increasing index order.
    ItemsReceived(Vec<LedgerEntry>),
    /// Locations the session now considers checked.
    LocationsChecked(BTreeSet<LocationId>),
    Disconnected,
}

/// The external session, polled once per cycle.
///
/// Reports may repeat ids that were already reported; the session is
/// expected to deduplicate them.
pub trait Session {
    fn poll_events(&mut self) -> Result<Vec<SessionEvent>>;

    fn report_checks(&mut self, locations: &BTreeSet<LocationId>) -> Result<()>;

    fn report_goal_complete(&mut self) -> Result<()>;
}

#[cfg(test)]
pub mod mock {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    use super::*;
    use crate::error::Error;

    #[derive(Debug, Default)]
    pub struct MockSessionState {
        pub queued: VecDeque<SessionEvent>,
        pub reports: Vec<BTreeSet<LocationId>>,
        pub goal_reports: usize,
        pub fail_reports: bool,
    }

    /// Scripted session; clones share state so tests can inspect reports.
    #[derive(Debug, Clone, Default)]
    pub struct MockSession {
        pub state: Rc<RefCell<MockSessionState>>,
    }

    impl MockSession {
        pub fn push(&self, event: SessionEvent) {
            self.state.borrow_mut().queued.push_back(event);
        }

        pub fn connect(&self, missing: &[u64]) {
            self.push(SessionEvent::Connected {
                checked: BTreeSet::new(),
                missing: missing.iter().map(|&id| LocationId(id)).collect(),
            });
        }

        pub fn give(&self, entries: &[(u64, u64)]) {
            self.push(SessionEvent::ItemsReceived(
                entries
                    .iter()
                    .map(|&(index, cap)| LedgerEntry::new(index, cap))
                    .collect(),
            ));
        }

        pub fn confirm(&self, ids: &[u64]) {
            self.push(SessionEvent::LocationsChecked(
                ids.iter().map(|&id| LocationId(id)).collect(),
            ));
        }

        pub fn reported(&self) -> BTreeSet<LocationId> {
            self.state.borrow().reports.iter().flatten().copied().collect()
        }

        pub fn report_count(&self) -> usize {
            self.state.borrow().reports.len()
        }

        pub fn goal_reports(&self) -> usize {
            self.state.borrow().goal_reports
        }
    }

    impl Session for MockSession {
        fn poll_events(&mut self) -> Result<Vec<SessionEvent>> {
            Ok(self.state.borrow_mut().queued.drain(..).collect())
        }

        fn report_checks(&mut self, locations: &BTreeSet<LocationId>) -> Result<()> {
            let mut state = self.state.borrow_mut();
            if state.fail_reports {
                return Err(Error::Session("mock report failure".to_string()));
            }
            state.reports.push(locations.clone());
            Ok(())
        }

        fn report_goal_complete(&mut self) -> Result<()> {
            let mut state = self.state.borrow_mut();
            if state.fail_reports {
                return Err(Error::Session("mock report failure".to_string()));
            }
            state.goal_reports += 1;
            Ok(())
        }
    }
}
