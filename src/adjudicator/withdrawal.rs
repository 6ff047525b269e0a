use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use super::ledger::LedgerError;
use super::Adjudicator;
use crate::bus::{Event, EventBus};
use crate::clock::Clock;
use crate::encode::{
    self,
    types::{Address, EntityId, Hash, Signature, U256},
};
use crate::sig;
use crate::EncodeError;

/// Authorization message a participant signs to release escrowed funds.
///
/// The embedded nonce must equal the participant's current withdrawal nonce,
/// which moves on every successful withdrawal. That makes each authorization
/// usable exactly once; there is no separate expiry.
#[derive(Serialize, Debug, Copy, Clone)]
pub struct WithdrawalAuth {
    pub participant: Address,
    /// Entity key receiving the funds.
    pub receiver: EntityId,
    pub amount: U256,
    pub nonce: u64,
}

impl WithdrawalAuth {
    /// Digest the participant signs.
    pub fn hash(&self) -> Result<Hash, EncodeError> {
        encode::to_hash(self)
    }
}

/// Per-participant withdrawal nonces.
#[derive(Debug, Default)]
pub(super) struct WithdrawalAuthorizer {
    nonces: HashMap<Address, u64>,
}

impl WithdrawalAuthorizer {
    pub fn nonce(&self, participant: Address) -> u64 {
        self.nonces.get(&participant).copied().unwrap_or_default()
    }

    pub fn bump(&mut self, participant: Address) {
        *self.nonces.entry(participant).or_default() += 1;
    }
}

#[derive(Debug, Error)]
pub enum WithdrawError {
    #[error("authorization signed by {recovered:?}, expected {participant:?}")]
    NotAuthorized {
        participant: Address,
        recovered: Address,
    },
    #[error("signature recovery failed: {0}")]
    RecoveryFailed(#[from] sig::Error),
    #[error("allocation {available} cannot cover withdrawal of {requested}")]
    Overdrawn { available: U256, requested: U256 },
    #[error("receiver allocation would overflow")]
    BalanceOverflow,
    #[error("encoding failed: {0}")]
    Encode(#[from] EncodeError),
}

impl<B: EventBus, C: Clock> Adjudicator<B, C> {
    /// Release `amount` of `participant`'s allocation to `receiver`, given a
    /// signature over the [WithdrawalAuth] message carrying the participant's
    /// current nonce.
    pub fn withdraw(
        &mut self,
        participant: Address,
        receiver: EntityId,
        amount: U256,
        signature: Signature,
    ) -> Result<(), WithdrawError> {
        let auth = WithdrawalAuth {
            participant,
            receiver,
            amount,
            nonce: self.withdrawals.nonce(participant),
        };
        let recovered = sig::recover_signer(auth.hash()?, signature)?;
        if recovered != participant {
            return Err(WithdrawError::NotAuthorized {
                participant,
                recovered,
            });
        }

        self.ledger
            .transfer(participant.into(), receiver, amount)
            .map_err(|e| match e {
                LedgerError::InsufficientFunds => WithdrawError::Overdrawn {
                    available: self.ledger.balance(participant.into()),
                    requested: amount,
                },
                LedgerError::BalanceOverflow => WithdrawError::BalanceOverflow,
            })?;
        self.withdrawals.bump(participant);

        debug!(participant = ?participant, receiver = ?receiver, amount = %amount, "withdrawal released");
        self.bus.publish(Event::Withdrawn {
            participant,
            receiver,
            amount,
        });
        Ok(())
    }

    /// Current withdrawal nonce of a participant; the value the next
    /// authorization must embed.
    pub fn withdrawal_nonce(&self, participant: Address) -> u64 {
        self.withdrawals.nonce(participant)
    }
}
