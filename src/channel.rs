//! Channel definitions and the signed states exchanged off-channel.

mod rules;

pub use rules::{TransitionError, TransitionRules};

use serde::Serialize;
use thiserror::Error;

use crate::encode::{
    self, as_bytes,
    types::{Address, ChannelId, Hash, Signature, U256},
};

/// Number of participants in every channel.
pub const PARTICIPANTS: usize = 2;

/// Defining parameters of a channel.
///
/// Hashing the parameters yields the [ChannelId], so none of them can be
/// swapped mid-dispute without producing a different channel.
#[derive(Serialize, Debug, Copy, Clone, PartialEq, Eq)]
pub struct Params {
    /// Originating application or deployment this channel belongs to.
    pub origin: Address,
    /// Distinguishes channels with otherwise identical parameters.
    pub nonce: U256,
    pub participants: [Address; PARTICIPANTS],
    /// Length of the challenge window in seconds.
    pub challenge_duration: u64,
    /// Transition rules governing state updates in this channel.
    pub rules: TransitionRules,
}

impl Params {
    pub fn channel_id(&self) -> Result<ChannelId, encode::Error> {
        Ok(encode::to_hash(self)?.into())
    }
}

/// A single state in a channel's update sequence.
///
/// Keeping `params` and `turn_num` private forces successor states to be
/// built through [State::make_next_state], which rules out accidentally
/// writing garbage into either field. States are only ever compared and
/// hashed, never mutated in place.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct State {
    params: Params,
    turn_num: u64,
    /// Amount each participant walks away with, by participant index.
    pub resolution: [U256; PARTICIPANTS],
    /// Application payload interpreted by the channel's transition rules.
    #[serde(with = "as_bytes")]
    pub app_data: Vec<u8>,
}

impl State {
    /// The initial state (turn 0) of a channel.
    pub fn new(params: Params, resolution: [U256; PARTICIPANTS]) -> Self {
        State {
            params,
            turn_num: 0,
            resolution,
            app_data: Vec::new(),
        }
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn turn_num(&self) -> u64 {
        self.turn_num
    }

    pub fn channel_id(&self) -> Result<ChannelId, encode::Error> {
        self.params.channel_id()
    }

    /// The participant whose turn produced this state.
    pub fn mover(&self) -> Address {
        self.params.participants[(self.turn_num % PARTICIPANTS as u64) as usize]
    }

    /// Digest that participants sign to authorize this state.
    pub fn hash(&self) -> Result<Hash, encode::Error> {
        encode::to_hash(self)
    }

    /// Create a state that follows this one in the update sequence.
    pub fn make_next_state(&self) -> Self {
        State {
            params: self.params,
            turn_num: self.turn_num + 1,
            resolution: self.resolution,
            app_data: self.app_data.clone(),
        }
    }
}

/// Mutually signed pair of consecutive states that closes a channel without
/// waiting out a challenge window.
#[derive(Debug, Clone)]
pub struct ConclusionProof {
    pub penultimate: State,
    pub ultimate: State,
    pub penultimate_sig: Signature,
    pub ultimate_sig: Signature,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProofError {
    #[error("proof states belong to different channels")]
    ChannelMismatch,
    #[error("ultimate turn {ultimate} does not follow penultimate turn {penultimate}")]
    TurnsNotSequential { penultimate: u64, ultimate: u64 },
    #[error("penultimate and ultimate resolutions differ")]
    ResolutionMismatch,
}

impl ConclusionProof {
    /// Structural checks; signatures are verified by the adjudicator.
    pub fn validate(&self) -> Result<(), ProofError> {
        if self.penultimate.params != self.ultimate.params {
            return Err(ProofError::ChannelMismatch);
        }
        if self.ultimate.turn_num != self.penultimate.turn_num + 1 {
            return Err(ProofError::TurnsNotSequential {
                penultimate: self.penultimate.turn_num,
                ultimate: self.ultimate.turn_num,
            });
        }
        if self.penultimate.resolution != self.ultimate.resolution {
            return Err(ProofError::ResolutionMismatch);
        }
        Ok(())
    }
}
