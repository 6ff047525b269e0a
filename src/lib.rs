//! On-ledger adjudicator for two-party state channels.
//!
//! Escrows funds per channel, accepts off-channel-signed state updates as
//! challenges, resolves disputes through the turn-taking ForceMove protocol
//! and pays out once a channel's outcome is final.

mod encode {
    mod error;
    mod hashing;
    mod ser;

    pub mod as_bytes;
    pub mod types;

    pub use error::{Error, Result};
    pub use hashing::to_hash;
    pub use ser::{to_writer, Serializer, Writer};
}
pub mod sig;

pub mod adjudicator;
pub mod bus;
pub mod channel;
pub mod clock;

pub use adjudicator::Adjudicator;
pub use encode::types::{Address, ChannelId, EntityId, Hash, Signature, U256};
pub use encode::Error as EncodeError;
