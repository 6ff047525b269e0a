use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use super::Adjudicator;
use crate::bus::{Event, EventBus};
use crate::channel::State;
use crate::clock::Clock;
use crate::encode::types::{ChannelId, EntityId, U256};

/// Payout distribution recorded for a channel.
///
/// `finalized_at == 0` means no outcome is recorded. A future `finalized_at`
/// is a pending challenge, counterable until the window elapses; once
/// `0 < finalized_at <= now` the outcome is final and transferable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    pub destinations: Vec<EntityId>,
    /// Amount still owed to each destination, positionally paired with
    /// `destinations`. Shrinks as transfers pay out.
    pub amounts: Vec<U256>,
    pub finalized_at: u64,
    /// The state whose resolution produced this outcome, if any.
    pub challenge_state: Option<State>,
}

impl Outcome {
    /// The distribution promised by `state`: each participant is owed its
    /// resolution entry.
    pub fn from_state(state: &State, finalized_at: u64) -> Self {
        Outcome {
            destinations: state
                .params()
                .participants
                .iter()
                .copied()
                .map(EntityId::from)
                .collect(),
            amounts: state.resolution.to_vec(),
            finalized_at,
            challenge_state: Some(state.clone()),
        }
    }

    pub fn is_recorded(&self) -> bool {
        self.finalized_at != 0
    }

    pub fn is_final(&self, now: u64) -> bool {
        self.finalized_at != 0 && self.finalized_at <= now
    }
}

/// Per-channel outcome records; the sole owner of them.
#[derive(Debug, Default)]
pub(super) struct OutcomeStore {
    outcomes: HashMap<ChannelId, Outcome>,
}

impl OutcomeStore {
    pub fn set(&mut self, channel: ChannelId, outcome: Outcome) {
        debug_assert_eq!(outcome.destinations.len(), outcome.amounts.len());
        self.outcomes.insert(channel, outcome);
    }

    pub fn get(&self, channel: ChannelId) -> Option<&Outcome> {
        self.outcomes.get(&channel)
    }

    pub fn get_mut(&mut self, channel: ChannelId) -> Option<&mut Outcome> {
        self.outcomes.get_mut(&channel)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransferError {
    #[error("no outcome is recorded for the channel")]
    OutcomeNotPresent,
    #[error("outcome finalizes at {finalizes_at}, now is {now}")]
    OutcomeNotFinal { finalizes_at: u64, now: u64 },
    #[error("destination is not listed in the outcome")]
    DestinationNotInOutcome,
    #[error("requested {requested} exceeds the recorded {recorded} for the destination")]
    TransferTooLarge { recorded: U256, requested: U256 },
    #[error("channel holds {held}, cannot transfer {requested}")]
    ChannelUnderfunded { held: U256, requested: U256 },
    #[error("destination allocation would overflow")]
    BalanceOverflow,
}

impl<B: EventBus, C: Clock> Adjudicator<B, C> {
    /// Primitive outcome write. The dispute entry points are the authorized
    /// writers; calling this directly bypasses their checks.
    pub fn set_outcome(&mut self, channel: ChannelId, outcome: Outcome) {
        self.outcomes.set(channel, outcome);
    }

    pub fn get_outcome(&self, channel: ChannelId) -> Option<&Outcome> {
        self.outcomes.get(channel)
    }

    /// Whether the channel's outcome is final and transferable.
    pub fn outcome_final(&self, channel: ChannelId) -> bool {
        self.outcomes
            .get(channel)
            .map_or(false, |o| o.is_final(self.clock.now()))
    }

    /// Pay `amount` of the channel's escrow out to `destination`, shrinking
    /// the outcome's recorded amount so repeated partial transfers work until
    /// the destination's share is exhausted.
    pub fn transfer(
        &mut self,
        channel: ChannelId,
        destination: EntityId,
        amount: U256,
    ) -> Result<(), TransferError> {
        let now = self.clock.now();
        let held = self.ledger.balance(channel.into());

        let outcome = match self.outcomes.get_mut(channel) {
            Some(o) if o.is_recorded() => o,
            _ => return Err(TransferError::OutcomeNotPresent),
        };
        if !outcome.is_final(now) {
            return Err(TransferError::OutcomeNotFinal {
                finalizes_at: outcome.finalized_at,
                now,
            });
        }
        let index = outcome
            .destinations
            .iter()
            .position(|d| *d == destination)
            .ok_or(TransferError::DestinationNotInOutcome)?;
        let recorded = outcome.amounts[index];
        if amount > recorded {
            return Err(TransferError::TransferTooLarge {
                recorded,
                requested: amount,
            });
        }
        if held < amount {
            return Err(TransferError::ChannelUnderfunded {
                held,
                requested: amount,
            });
        }

        self.ledger
            .transfer(channel.into(), destination, amount)
            .map_err(|_| TransferError::BalanceOverflow)?;
        outcome.amounts[index] = recorded - amount;

        debug!(channel = ?channel, destination = ?destination, amount = %amount, "outcome transferred");
        self.bus.publish(Event::Transferred {
            channel,
            destination,
            amount,
        });
        Ok(())
    }
}
