//! Notification bus for adjudicator events.
//!
//! External observers (typically a watcher service that may want to counter a
//! challenge) receive events through an [EventBus] implementation supplied at
//! construction. The adjudicator publishes after the state change committed.

use std::fmt::Debug;

use crate::encode::types::{Address, ChannelId, EntityId, U256};

/// Emitted after a state-changing call commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Deposited {
        destination: EntityId,
        amount: U256,
        /// Destination's allocation after the credit.
        holdings: U256,
    },
    Withdrawn {
        participant: Address,
        receiver: EntityId,
        amount: U256,
    },
    ChallengeRegistered {
        channel: ChannelId,
        turn_num: u64,
        /// Moment the challenge outcome becomes final unless countered.
        finalizes_at: u64,
    },
    Responded {
        channel: ChannelId,
        turn_num: u64,
    },
    Concluded {
        channel: ChannelId,
        finalized_at: u64,
    },
    Transferred {
        channel: ChannelId,
        destination: EntityId,
        amount: U256,
    },
}

pub trait EventBus: Debug {
    fn publish(&self, event: Event);
}

/// Bus that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBus;

impl EventBus for NoopBus {
    fn publish(&self, _: Event) {}
}
