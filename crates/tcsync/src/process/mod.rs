//! Attaching to the game process.

#[cfg(windows)]
mod win32;

use memchr::memmem;
use serde::Deserialize;
use tracing::debug;

use crate::error::Result;
use crate::memory::MemoryPort;

#[cfg(windows)]
pub use win32::{ProcessAttacher, ProcessPort};

/// Chunk size for version pattern scans
const SCAN_CHUNK_SIZE: usize = 1024 * 1024;

/// A build of the game identified by its base offset.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KnownBuild {
    pub name: String,
    pub offset: i64,
}

/// How to find the process and its base offset.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProcessConfig {
    /// Executable name, with or without `.exe`.
    pub name: String,
    /// Bytes unique to the supported builds.
    pub version_pattern: Vec<u8>,
    /// Address of the pattern in the build the table's offsets are written for.
    pub reference_address: u64,
    #[serde(default)]
    pub known_builds: Vec<KnownBuild>,
}

impl ProcessConfig {
    /// Base offset such that `table offset + base = address in the process`.
    pub fn base_offset(&self, found_address: u64) -> i64 {
        found_address.wrapping_sub(self.reference_address) as i64
    }

    pub fn build_name(&self, offset: i64) -> Option<&str> {
        self.known_builds
            .iter()
            .find(|build| build.offset == offset)
            .map(|build| build.name.as_str())
    }

    /// Whether a process executable name matches this config.
    pub fn matches_exe(&self, exe: &str) -> bool {
        let wanted = self.name.strip_suffix(".exe").unwrap_or(&self.name);
        let exe = exe.strip_suffix(".exe").unwrap_or(exe);
        exe.eq_ignore_ascii_case(wanted)
    }
}

/// Find the first occurrence of `pattern` in `start..start + len`.
///
/// Reads in chunks, carrying the last `pattern.len() - 1` bytes over so a
/// match spanning two chunks is still found. An unreadable chunk ends the
/// scan of this range.
pub fn scan_for_pattern(
    port: &dyn MemoryPort,
    start: u64,
    len: usize,
    pattern: &[u8],
) -> Result<Option<u64>> {
    if pattern.is_empty() || len < pattern.len() {
        return Ok(None);
    }
    let finder = memmem::Finder::new(pattern);
    let keep = pattern.len() - 1;
    let mut tail: Vec<u8> = Vec::new();
    let mut scanned = 0usize;

    while scanned < len {
        let read_size = (len - scanned).min(SCAN_CHUNK_SIZE);
        let addr = start + scanned as u64;
        let chunk = match port.read_bytes(addr, read_size) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("Pattern scan stopped at {:#x}: {}", addr, e);
                break;
            }
        };

        let mut data = Vec::with_capacity(tail.len() + chunk.len());
        data.extend_from_slice(&tail);
        data.extend_from_slice(&chunk);
        let data_base = addr - tail.len() as u64;

        if let Some(pos) = finder.find(&data) {
            return Ok(Some(data_base + pos as u64));
        }

        let cut = data.len().saturating_sub(keep);
        tail = data[cut..].to_vec();
        scanned += read_size;
    }
    Ok(None)
}

/// Placeholder attacher for platforms without process memory access.
#[cfg(not(windows))]
#[derive(Debug, Clone)]
pub struct ProcessAttacher {
    config: ProcessConfig,
}

#[cfg(not(windows))]
impl ProcessAttacher {
    pub fn new(config: ProcessConfig) -> Self {
        Self { config }
    }
}

#[cfg(not(windows))]
impl crate::sync::Attach for ProcessAttacher {
    type Port = Box<dyn MemoryPort>;

    fn attach(&mut self) -> Result<Self::Port> {
        Err(crate::error::Error::ProcessNotFound(format!(
            "{} (process access is only supported on Windows)",
            self.config.name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MockMemoryBuilder;

    const PATTERN: &[u8] = b"\x0F\xBE\xAE\x7F\x10\x00\x00";

    fn config() -> ProcessConfig {
        ProcessConfig {
            name: "LEGOStarWarsSaga.exe".to_string(),
            version_pattern: PATTERN.to_vec(),
            reference_address: 0x4B894C,
            known_builds: vec![
                KnownBuild {
                    name: "Steam".to_string(),
                    offset: 0,
                },
                KnownBuild {
                    name: "GOG".to_string(),
                    offset: 0x20,
                },
            ],
        }
    }

    #[test]
    fn test_base_offset_and_build_name() {
        let config = config();
        assert_eq!(config.base_offset(0x4B894C), 0);
        assert_eq!(config.base_offset(0x4B896C), 0x20);
        assert_eq!(config.build_name(0x20), Some("GOG"));
        assert_eq!(config.base_offset(0x4B8940), -0xC);
        assert_eq!(config.build_name(-0xC), None);
    }

    #[test]
    fn test_exe_name_matching() {
        let config = config();
        assert!(config.matches_exe("LEGOStarWarsSaga.exe"));
        assert!(config.matches_exe("legostarwarssaga"));
        assert!(!config.matches_exe("LEGOIndy.exe"));
    }

    #[test]
    fn test_scan_finds_pattern() {
        let memory = MockMemoryBuilder::new(0x1000)
            .with_bytes(0x321, PATTERN)
            .build();
        assert_eq!(
            scan_for_pattern(&memory, 0, 0x1000, PATTERN).unwrap(),
            Some(0x321)
        );
        assert_eq!(scan_for_pattern(&memory, 0x400, 0x800, PATTERN).unwrap(), None);
    }

    #[test]
    fn test_scan_across_chunk_boundary() {
        let size = SCAN_CHUNK_SIZE + 0x100;
        let at = SCAN_CHUNK_SIZE as u64 - 3;
        let memory = MockMemoryBuilder::new(size).with_bytes(at, PATTERN).build();
        assert_eq!(
            scan_for_pattern(&memory, 0, size, PATTERN).unwrap(),
            Some(at)
        );
    }

    #[test]
    fn test_scan_stops_at_unreadable_memory() {
        let memory = MockMemoryBuilder::new(0x100).with_bytes(0x10, PATTERN).build();
        memory.set_fail_reads(true);
        assert_eq!(scan_for_pattern(&memory, 0, 0x100, PATTERN).unwrap(), None);
    }
}
