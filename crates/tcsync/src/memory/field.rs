use serde::Deserialize;

use crate::error::{ConfigError, Error, Result};

/// A little-endian integer at a fixed offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Field {
    pub offset: u64,
    #[serde(default = "default_width")]
    pub width: usize,
}

fn default_width() -> usize {
    1
}

impl Field {
    pub fn new(offset: u64, width: usize) -> Self {
        Self { offset, width }
    }

    pub fn byte(offset: u64) -> Self {
        Self::new(offset, 1)
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        match self.width {
            1 | 2 | 4 => Ok(()),
            other => Err(ConfigError::UnsupportedWidth(other)),
        }
    }

    /// Decode from at least `width` bytes.
    pub fn decode(&self, bytes: &[u8]) -> u32 {
        bytes
            .iter()
            .take(self.width)
            .rev()
            .fold(0u32, |acc, &b| (acc << 8) | u32::from(b))
    }
}

/// Encode the expected index as null-padded ASCII digits of `width` bytes.
pub fn encode_expected_index(index: u64, width: usize) -> Result<Vec<u8>> {
    let mut digits = index.to_string().into_bytes();
    if digits.len() > width {
        return Err(Error::ExpectedIndexTooLarge { index, width });
    }
    digits.resize(width, 0);
    Ok(digits)
}

/// Decode the persisted expected index from its first `width` bytes.
///
/// Returns `Some(0)` for an empty field (a save that has never received an
/// item) and `None` when the field holds anything other than ASCII digits.
pub fn decode_expected_index(bytes: &[u8], width: usize) -> Option<u64> {
    let field = &bytes[..bytes.len().min(width)];
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    let digits = &field[..end];
    if digits.is_empty() {
        return Some(0);
    }
    if !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}
