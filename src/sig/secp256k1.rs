//! Signer and recovery using the libsecp256k1 bindings.

use secp256k1::{
    ecdsa::{RecoverableSignature, RecoveryId},
    Message, PublicKey, Secp256k1, SecretKey, ThirtyTwoByteHash,
};
use sha3::{Digest, Keccak256};

use super::hash_to_eth_signed_msg_hash;
use crate::encode::types::{Address, Hash, Signature};

pub use secp256k1::Error;

impl ThirtyTwoByteHash for Hash {
    fn into_32(self) -> [u8; 32] {
        self.0
    }
}

impl From<PublicKey> for Address {
    fn from(pk: PublicKey) -> Self {
        // Throw away the first byte of the uncompressed serialization, which
        // is an encoding tag and not part of the public key.
        let hash: [u8; 32] = Keccak256::digest(&pk.serialize_uncompressed()[1..]).into();

        let mut addr = Address([0; 20]);
        addr.0.copy_from_slice(&hash[32 - 20..]);
        addr
    }
}

/// Holds a signing key and the address derived from it.
#[derive(Debug)]
pub struct Signer {
    key: SecretKey,
    addr: Address,
}

impl Signer {
    pub fn new<R: rand::Rng + rand::CryptoRng>(rng: &mut R) -> Self {
        let secp = Secp256k1::new();
        let (key, pk) = secp.generate_keypair(rng);
        Self {
            key,
            addr: pk.into(),
        }
    }

    pub fn address(&self) -> Address {
        self.addr
    }

    /// Sign a hash using an Ethereum 65-byte recoverable signature.
    pub fn sign_eth(&self, msg: Hash) -> Signature {
        let secp = Secp256k1::new();

        // "\x19Ethereum Signed Message:\n32" format
        let hash = hash_to_eth_signed_msg_hash(msg);

        let sig = secp.sign_ecdsa_recoverable(&Message::from(hash), &self.key);
        let (v, rs) = sig.serialize_compact();

        // EIP-2 makes non-canonical solutions (s with the top bit set)
        // invalid; the library already produces canonical signatures.
        debug_assert!(rs[32] & 0x80 == 0);

        // v is offset by 27 in the recovery format (EIP-2098).
        let v: u8 = 27 + v.to_i32() as u8;

        Signature::new(&rs, v)
    }
}

/// Recover the signing address from a signature produced by [Signer::sign_eth]
/// over `msg` (the unprefixed hash).
pub fn recover_signer(msg: Hash, eth_sig: Signature) -> Result<Address, Error> {
    let secp = Secp256k1::new();
    let hash = hash_to_eth_signed_msg_hash(msg);

    let rs = &eth_sig.0[..64];
    let v = eth_sig.0[64]
        .checked_sub(27)
        .ok_or(Error::InvalidRecoveryId)?;

    let recid = RecoveryId::from_i32(v.into())?;
    let sig = RecoverableSignature::from_compact(rs, recid)?;

    let pk = secp.recover_ecdsa(&Message::from(hash), &sig)?;
    Ok(pk.into())
}
