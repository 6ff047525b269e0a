//! Creation and verification of (Ethereum-style) recoverable signatures.
//!
//! The adjudicator only ever recovers signers ([recover_signer]); producing
//! signatures ([Signer]) is for channel participants and tests. Two ECDSA
//! backends are available behind cargo features: `k256` (default, pure Rust)
//! and `secp256k1` (libsecp256k1 bindings).

use crate::encode::types::Hash;
use sha3::{Digest, Keccak256};

#[cfg(not(any(feature = "k256", feature = "secp256k1")))]
compile_error!("enable at least one signature backend feature: `k256` or `secp256k1`");

#[cfg(feature = "k256")]
mod k256;
#[cfg(feature = "secp256k1")]
mod secp256k1;

#[cfg(feature = "k256")]
pub use self::k256::{recover_signer, Error, Signer};
#[cfg(all(feature = "secp256k1", not(feature = "k256")))]
pub use self::secp256k1::{recover_signer, Error, Signer};


/// Add the `\x19Ethereum Signed Message\n<length>` prefix to a hash.
///
/// Signing over the prefixed digest keeps channel signatures from ever being
/// valid transaction signatures.
fn hash_to_eth_signed_msg_hash(hash: Hash) -> Hash {
    // Packed encoding, bypasses the slot serializer.
    let mut hasher = Keccak256::new();
    hasher.update(b"\x19Ethereum Signed Message:\n32");
    hasher.update(hash.0);
    Hash(hasher.finalize().into())
}
