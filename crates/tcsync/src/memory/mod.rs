mod field;
pub mod layout;
mod port;

#[cfg(test)]
pub mod mock;

pub use field::{Field, decode_expected_index, encode_expected_index};
pub use port::MemoryPort;

#[cfg(test)]
pub use mock::{MockMemory, MockMemoryBuilder};
