use serde::Deserialize;

/// Byte index and mask of logical bit `bit` (little-endian bit within byte).
pub fn locate_bit(bit: u32) -> (usize, u8) {
    ((bit / 8) as usize, 1u8 << (bit % 8))
}

/// Reference to one bit of a named region.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct RegionBit {
    pub region: String,
    pub bit: u32,
}

impl RegionBit {
    pub fn new(region: &str, bit: u32) -> Self {
        Self {
            region: region.to_string(),
            bit,
        }
    }
}

/// Static layout of a region.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegionDef {
    pub name: String,
    pub offset: u64,
    pub length: usize,
    /// Bits owned without being driven by any capability or area; they are
    /// held locked.
    #[serde(default)]
    pub owned_bits: Vec<u32>,
    /// Bits owned and held set for as long as a save is loaded.
    #[serde(default)]
    pub forced_bits: Vec<u32>,
}

/// A byte range with per-bit ownership and the desired value of owned bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitRegion {
    name: String,
    offset: u64,
    owned: Vec<u8>,
    desired: Vec<u8>,
    forced: Vec<u8>,
}

impl BitRegion {
    pub fn new(name: &str, offset: u64, length: usize) -> Self {
        Self {
            name: name.to_string(),
            offset,
            owned: vec![0; length],
            desired: vec![0; length],
            forced: vec![0; length],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.owned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owned.is_empty()
    }

    pub fn bit_len(&self) -> u32 {
        (self.owned.len() * 8) as u32
    }

    pub fn owned(&self) -> &[u8] {
        &self.owned
    }

    pub fn desired(&self) -> &[u8] {
        &self.desired
    }

    /// Claim `bit` for the engine. Returns false if it lies outside the region.
    pub fn own_bit(&mut self, bit: u32) -> bool {
        let (byte, mask) = locate_bit(bit);
        match self.owned.get_mut(byte) {
            Some(owned) => {
                *owned |= mask;
                true
            }
            None => false,
        }
    }

    /// Claim `bit` and keep it desired across resets.
    pub fn force_bit(&mut self, bit: u32) -> bool {
        if !self.own_bit(bit) {
            return false;
        }
        let (byte, mask) = locate_bit(bit);
        self.forced[byte] |= mask;
        self.desired[byte] |= mask;
        true
    }

    pub fn is_owned(&self, bit: u32) -> bool {
        let (byte, mask) = locate_bit(bit);
        self.owned.get(byte).is_some_and(|&o| o & mask != 0)
    }

    pub fn owned_bit_count(&self) -> u32 {
        self.owned.iter().map(|b| b.count_ones()).sum()
    }

    /// Set the desired value of an owned bit; foreign bits are refused.
    pub fn set_desired(&mut self, bit: u32, value: bool) -> bool {
        if !self.is_owned(bit) {
            return false;
        }
        let (byte, mask) = locate_bit(bit);
        if value {
            self.desired[byte] |= mask;
        } else {
            self.desired[byte] &= !mask;
        }
        true
    }

    /// Set all eight bits of `byte` to `value`. The whole byte must be owned.
    pub fn set_desired_byte(&mut self, byte: usize, value: u8) -> bool {
        if self.owned.get(byte) != Some(&0xFF) {
            return false;
        }
        self.desired[byte] = value;
        true
    }

    pub fn desired_bit(&self, bit: u32) -> bool {
        let (byte, mask) = locate_bit(bit);
        self.desired.get(byte).is_some_and(|&d| d & mask != 0)
    }

    /// Return every owned bit to its reset value: forced bits set, the
    /// rest locked.
    pub fn clear_desired(&mut self) {
        self.desired.copy_from_slice(&self.forced);
    }
}
