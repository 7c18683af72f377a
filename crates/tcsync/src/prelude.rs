//! Prelude module for convenient imports
//!
//! ```ignore
//! use tcsync::prelude::*;
//! ```

// Loop and its collaborators
pub use crate::config::SyncConfig;
pub use crate::process::ProcessAttacher;
pub use crate::session::{Session, SessionEvent};
pub use crate::shutdown::ShutdownSignal;
pub use crate::sync::{Attach, SyncLoop, SyncState};

// Ids exchanged with the session
pub use crate::capability::CapabilityId;
pub use crate::ledger::LedgerEntry;
pub use crate::poll::LocationId;

// Error handling
pub use crate::error::{Error, Result};
