//! The adjudication core: escrow ledger, withdrawal authorization, outcome
//! storage and the ForceMove dispute engine.
//!
//! All entry points run to completion on `&mut self`; a call either commits
//! fully or fails without touching any stored state. Calls are validated
//! front to back, mutations happen last.

mod dispute;
mod ledger;
mod outcome;
mod withdrawal;

#[cfg(test)]
mod tests;

pub use dispute::{ChannelMode, ConcludeError, ForceMoveError, RespondError};
pub use ledger::DepositError;
pub use outcome::{Outcome, TransferError};
pub use withdrawal::{WithdrawError, WithdrawalAuth};

use crate::bus::EventBus;
use crate::clock::Clock;

use ledger::Ledger;
use outcome::OutcomeStore;
use withdrawal::WithdrawalAuthorizer;

/// Escrow and dispute adjudicator for two-party state channels.
///
/// Holds the allocation ledger, the per-channel outcomes and the withdrawal
/// nonces for the lifetime of the deployment. Events go out through `B` after
/// each committed state change; time comes in through `C` only.
#[derive(Debug)]
pub struct Adjudicator<B: EventBus, C: Clock> {
    ledger: Ledger,
    outcomes: OutcomeStore,
    withdrawals: WithdrawalAuthorizer,
    bus: B,
    clock: C,
}

impl<B: EventBus, C: Clock> Adjudicator<B, C> {
    pub fn new(bus: B, clock: C) -> Self {
        Adjudicator {
            ledger: Ledger::default(),
            outcomes: OutcomeStore::default(),
            withdrawals: WithdrawalAuthorizer::default(),
            bus,
            clock,
        }
    }

    /// The injected clock, e.g. to drive a simulated one from outside.
    pub fn clock(&self) -> &C {
        &self.clock
    }
}
