//! In-memory `MemoryPort` for tests.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::error::{Error, Result};

use super::MemoryPort;

#[derive(Debug, Default)]
struct Inner {
    data: RefCell<Vec<u8>>,
    writes: RefCell<Vec<(u64, Vec<u8>)>>,
    reads: Cell<usize>,
    fail_reads: Cell<bool>,
    fail_writes: Cell<bool>,
    detached: Cell<bool>,
}

/// Flat byte buffer addressed from offset 0. Clones share the same memory.
#[derive(Debug, Clone, Default)]
pub struct MockMemory {
    inner: Rc<Inner>,
}

impl MockMemory {
    pub fn new(size: usize) -> Self {
        let memory = Self::default();
        memory.inner.data.replace(vec![0; size]);
        memory
    }

    pub fn set_bytes(&self, offset: u64, bytes: &[u8]) {
        let start = offset as usize;
        self.inner.data.borrow_mut()[start..start + bytes.len()].copy_from_slice(bytes);
    }

    pub fn set_u8(&self, offset: u64, value: u8) {
        self.set_bytes(offset, &[value]);
    }

    pub fn set_u16(&self, offset: u64, value: u16) {
        self.set_bytes(offset, &value.to_le_bytes());
    }

    pub fn set_u32(&self, offset: u64, value: u32) {
        self.set_bytes(offset, &value.to_le_bytes());
    }

    pub fn bytes(&self, offset: u64, len: usize) -> Vec<u8> {
        let start = offset as usize;
        self.inner.data.borrow()[start..start + len].to_vec()
    }

    pub fn byte(&self, offset: u64) -> u8 {
        self.bytes(offset, 1)[0]
    }

    /// Every successful write as `(offset, bytes)`, oldest first.
    pub fn writes(&self) -> Vec<(u64, Vec<u8>)> {
        self.inner.writes.borrow().clone()
    }

    pub fn writes_at(&self, offset: u64) -> usize {
        self.inner
            .writes
            .borrow()
            .iter()
            .filter(|(o, _)| *o == offset)
            .count()
    }

    pub fn clear_writes(&self) {
        self.inner.writes.borrow_mut().clear();
    }

    pub fn read_count(&self) -> usize {
        self.inner.reads.get()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.inner.fail_reads.set(fail);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.set(fail);
    }

    pub fn set_detached(&self, detached: bool) {
        self.inner.detached.set(detached);
    }

    fn check_range(&self, offset: u64, len: usize) -> bool {
        (offset as usize).saturating_add(len) <= self.inner.data.borrow().len()
    }
}

impl MemoryPort for MockMemory {
    fn read_bytes(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        if self.inner.detached.get() {
            return Err(Error::Detached);
        }
        if self.inner.fail_reads.get() {
            return Err(Error::MemoryReadFailed {
                offset,
                message: "mock read failure".to_string(),
            });
        }
        if !self.check_range(offset, len) {
            return Err(Error::MemoryReadFailed {
                offset,
                message: "out of range".to_string(),
            });
        }
        self.inner.reads.set(self.inner.reads.get() + 1);
        Ok(self.bytes(offset, len))
    }

    fn write_bytes(&self, offset: u64, bytes: &[u8]) -> Result<()> {
        if self.inner.detached.get() {
            return Err(Error::Detached);
        }
        if self.inner.fail_writes.get() {
            return Err(Error::MemoryWriteFailed {
                offset,
                message: "mock write failure".to_string(),
            });
        }
        if !self.check_range(offset, bytes.len()) {
            return Err(Error::MemoryWriteFailed {
                offset,
                message: "out of range".to_string(),
            });
        }
        self.set_bytes(offset, bytes);
        self.inner.writes.borrow_mut().push((offset, bytes.to_vec()));
        Ok(())
    }

    fn attached(&self) -> bool {
        !self.inner.detached.get()
    }
}

/// Builder for `MockMemory` with pre-populated bytes.
#[derive(Debug)]
pub struct MockMemoryBuilder {
    memory: MockMemory,
}

impl MockMemoryBuilder {
    pub fn new(size: usize) -> Self {
        Self {
            memory: MockMemory::new(size),
        }
    }

    pub fn with_bytes(self, offset: u64, bytes: &[u8]) -> Self {
        self.memory.set_bytes(offset, bytes);
        self
    }

    pub fn with_u8(self, offset: u64, value: u8) -> Self {
        self.memory.set_u8(offset, value);
        self
    }

    pub fn with_u16(self, offset: u64, value: u16) -> Self {
        self.memory.set_u16(offset, value);
        self
    }

    pub fn build(self) -> MockMemory {
        self.memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_read_write() {
        let memory = MockMemoryBuilder::new(16).with_u16(2, 0x0145).build();
        assert_eq!(memory.read_u16(2).unwrap(), 0x0145);

        memory.write_u32(8, 10_000).unwrap();
        assert_eq!(memory.read_u32(8).unwrap(), 10_000);
        assert_eq!(memory.writes_at(8), 1);
    }

    #[test]
    fn test_mock_failures() {
        let memory = MockMemory::new(4);
        memory.set_fail_reads(true);
        assert!(memory.read_u8(0).is_err());
        memory.set_fail_reads(false);
        assert!(memory.read_bytes(2, 4).is_err());

        memory.set_detached(true);
        assert!(!memory.attached());
        assert!(matches!(memory.write_bytes(0, &[1]), Err(Error::Detached)));
        assert!(matches!(memory.read_u8(0), Err(Error::Detached)));
    }
}
