use thiserror::Error;

use crate::capability::CapabilityId;
use crate::poll::LocationId;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    #[error("Failed to open process: {0}")]
    ProcessOpenFailed(String),

    #[error("Version pattern not found in process memory")]
    PatternNotFound,

    #[error("Failed to read process memory at offset {offset:#x}: {message}")]
    MemoryReadFailed { offset: u64, message: String },

    #[error("Failed to write process memory at offset {offset:#x}: {message}")]
    MemoryWriteFailed { offset: u64, message: String },

    #[error("Memory port is no longer attached")]
    Detached,

    #[error("Expected index {index} does not fit in {width} ASCII digits")]
    ExpectedIndexTooLarge { index: u64, width: usize },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Session error: {0}")]
    Session(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the sync loop should treat this as a lost process and reattach.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::ProcessNotFound(_)
                | Error::ProcessOpenFailed(_)
                | Error::PatternNotFound
                | Error::MemoryReadFailed { .. }
                | Error::MemoryWriteFailed { .. }
                | Error::Detached
                | Error::Session(_)
        )
    }
}

/// Problems found while validating a game table.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("capability {0} is defined more than once")]
    DuplicateCapability(CapabilityId),

    #[error("area '{0}' is defined more than once")]
    DuplicateArea(String),

    #[error("region '{0}' is defined more than once")]
    DuplicateRegion(String),

    #[error("location {0} is mapped by more than one poll rule")]
    DuplicateLocation(LocationId),

    #[error("area '{area}' requires unknown capability {capability}")]
    UnknownCapability { area: String, capability: CapabilityId },

    #[error("{owner} references unknown region '{region}'")]
    UnknownRegion { owner: String, region: String },

    #[error("{owner} references bit {bit} outside region '{region}' ({bits} bits)")]
    BitOutOfRange {
        owner: String,
        region: String,
        bit: u32,
        bits: u32,
    },

    #[error("bit {bit} of region '{region}' is claimed by both {first} and {second}")]
    ConflictingBit {
        region: String,
        bit: u32,
        first: String,
        second: String,
    },

    #[error("poll rule '{0}' maps no locations")]
    EmptyRule(String),

    #[error("unsupported field width {0} (expected 1, 2 or 4)")]
    UnsupportedWidth(usize),

    #[error("goal references unknown capability {0}")]
    UnknownGoalCapability(CapabilityId),

    #[error("goal references unknown area '{0}'")]
    UnknownGoalArea(String),

    #[error("{0}")]
    Invalid(String),
}
