//! Serialize any `&[u8]` as length-prefixed packed bytes.
//!
//! Without this, a `Vec<u8>` would be serialized as a length-prefixed
//! sequence of `u8`, one slot per byte.
//!
//! # Example usage
//! ```ignore
//! #[derive(Serialize, Debug)]
//! pub struct Payload {
//!     #[serde(with = "as_bytes")]
//!     pub data: Vec<u8>,
//! }
//! ```

use serde::{ser::SerializeTuple, Serialize, Serializer};

/// Internal wrapper allowing us to serialize the data using
/// `serialize_bytes`, which cannot be specified when calling
/// `serialize_element`.
struct Bytes<'a>(&'a [u8]);

impl<'a> Serialize for Bytes<'a> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(self.0)
    }
}

pub fn serialize<S>(v: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut s = serializer.serialize_tuple(2)?;
    s.serialize_element(&(v.len() as u64))?;
    s.serialize_element(&Bytes(v))?;
    s.end()
}
