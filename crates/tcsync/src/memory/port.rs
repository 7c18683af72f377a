use crate::error::Result;

use super::Field;

/// Byte-addressed access to the target process.
///
/// Offsets are relative to the base address discovered at attach time;
/// translating them to absolute addresses is the implementor's concern.
pub trait MemoryPort {
    fn read_bytes(&self, offset: u64, len: usize) -> Result<Vec<u8>>;

    fn write_bytes(&self, offset: u64, bytes: &[u8]) -> Result<()>;

    /// Whether the underlying process is still alive.
    fn attached(&self) -> bool;

    fn read_u8(&self, offset: u64) -> Result<u8> {
        let bytes = self.read_bytes(offset, 1)?;
        Ok(bytes[0])
    }

    fn read_u16(&self, offset: u64) -> Result<u16> {
        let bytes = self.read_bytes(offset, 2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&self, offset: u64) -> Result<u32> {
        let bytes = self.read_bytes(offset, 4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn write_u32(&self, offset: u64, value: u32) -> Result<()> {
        self.write_bytes(offset, &value.to_le_bytes())
    }

    /// Read a little-endian integer field of width 1, 2 or 4.
    fn read_field(&self, field: &Field) -> Result<u32> {
        let bytes = self.read_bytes(field.offset, field.width)?;
        Ok(field.decode(&bytes))
    }
}

impl<T: MemoryPort + ?Sized> MemoryPort for Box<T> {
    fn read_bytes(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        (**self).read_bytes(offset, len)
    }

    fn write_bytes(&self, offset: u64, bytes: &[u8]) -> Result<()> {
        (**self).write_bytes(offset, bytes)
    }

    fn attached(&self) -> bool {
        (**self).attached()
    }
}
