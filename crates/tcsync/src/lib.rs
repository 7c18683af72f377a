//! # tcsync
//!
//! Synchronizes a multiworld session with a running LEGO Star Wars: The
//! Complete Saga process through its memory.
//!
//! This crate provides:
//! - An ordered item ledger with save-rollback detection
//! - Area unlocks driven by received capabilities
//! - Read-modify-write reconciliation of engine-owned bits
//! - Location polling against game memory
//! - The attach/cycle loop and the Windows process adapter
//!
//! The per-title layout is data: see [`config::SyncConfig`].

pub mod capability;
pub mod config;
pub mod error;
pub mod graph;
pub mod ledger;
pub mod memory;
pub mod poll;
pub mod prelude;
pub mod process;
pub mod reconcile;
pub mod report;
pub mod retry;
pub mod session;
pub mod shutdown;
pub mod sync;

pub use capability::{CapabilityDef, CapabilityId, Effect, EffectTable};
pub use config::{GameTable, SyncConfig, TimingConfig};
pub use error::{ConfigError, Error, Result};
pub use graph::{AreaDef, AreaNode, AreaUnlocked, CountedRequirement, UnlockDependencyGraph};
pub use ledger::{
    DeliveryMode, GrantHandler, GrantedCapabilitySet, ItemReceiptLedger, LedgerEntry,
    RollbackAction,
};
pub use memory::{Field, MemoryPort};
pub use poll::{LocationChecker, LocationId, LocationPollSet, LocationRule};
pub use process::{ProcessAttacher, ProcessConfig};
pub use reconcile::{BitRegion, BitfieldReconciler, PendingOverride, RegionBit};
pub use report::{CheckReporter, Goal, GoalDef};
pub use session::{Session, SessionEvent};
pub use shutdown::ShutdownSignal;
pub use sync::{Attach, SyncEngine, SyncLoop, SyncState};
