/// What the delivery pass must do before delivering new entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackAction {
    /// The game loaded an older save: rebuild local state from entry 0 up to
    /// `target` without touching the process.
    ReplayFromZero { target: u64 },
    /// The client restarted behind the save: silently apply `from..to`.
    FastForward { from: u64, to: u64 },
    DeliverNext,
}

/// Compare the index persisted in the process with the client's own.
pub fn detect_rollback(persisted_index: u64, client_index: u64) -> RollbackAction {
    if persisted_index < client_index {
        RollbackAction::ReplayFromZero {
            target: persisted_index,
        }
    } else if client_index < persisted_index {
        RollbackAction::FastForward {
            from: client_index,
            to: persisted_index,
        }
    } else {
        RollbackAction::DeliverNext
    }
}
