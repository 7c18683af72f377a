use std::collections::HashMap;

use crate::error::Result;
use crate::memory::MemoryPort;

/// Reads made during one poll cycle, keyed by `(offset, len)`.
///
/// Lives for a single cycle only; nothing is carried to the next one.
pub struct ReadCache<'a> {
    port: &'a dyn MemoryPort,
    bytes: HashMap<(u64, usize), Vec<u8>>,
    reads: usize,
}

impl<'a> ReadCache<'a> {
    pub fn new(port: &'a dyn MemoryPort) -> Self {
        Self {
            port,
            bytes: HashMap::new(),
            reads: 0,
        }
    }

    pub fn read(&mut self, offset: u64, len: usize) -> Result<&[u8]> {
        if !self.bytes.contains_key(&(offset, len)) {
            let bytes = self.port.read_bytes(offset, len)?;
            self.reads += 1;
            self.bytes.insert((offset, len), bytes);
        }
        Ok(&self.bytes[&(offset, len)])
    }

    /// Reads actually issued to the port.
    pub fn reads(&self) -> usize {
        self.reads
    }
}
