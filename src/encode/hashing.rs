use super::{to_writer, types::Hash, Result, Writer};

use serde::Serialize;
use sha3::{Digest, Keccak256};

/// Writer that feeds every slot straight into a Keccak-256 hasher.
#[derive(Default)]
struct KeccakWriter {
    hasher: Keccak256,
}

impl Writer for KeccakWriter {
    fn write(&mut self, slot: &[u8]) {
        self.hasher.update(slot);
    }
}

/// Keccak-256 digest of the canonical slot encoding of `value`.
pub fn to_hash<T>(value: &T) -> Result<Hash>
where
    T: Serialize,
{
    let mut writer = KeccakWriter::default();
    to_writer(value, &mut writer)?;
    Ok(Hash(writer.hasher.finalize().into()))
}
