use thiserror::Error;
use tracing::info;

use super::outcome::Outcome;
use super::Adjudicator;
use crate::bus::{Event, EventBus};
use crate::channel::{ConclusionProof, ProofError, State, TransitionError};
use crate::clock::Clock;
use crate::encode::types::{Address, ChannelId, Signature};
use crate::sig;
use crate::EncodeError;

/// Lifecycle phase of a channel, derived from its stored outcome and the
/// clock; never stored itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    /// No pending or final outcome.
    Open,
    /// A challenge is pending and can still be countered.
    Challenged,
    /// The outcome is final; funds can be transferred out.
    Closed,
}

#[derive(Debug, Error)]
pub enum ForceMoveError {
    #[error("channel is not open ({mode:?})")]
    ChannelNotOpen { mode: ChannelMode },
    #[error("illegal transition: {0}")]
    InvalidTransition(#[from] TransitionError),
    #[error("challenge signed by {recovered:?}, expected mover {expected:?}")]
    ChallengeNotAuthorized {
        expected: Address,
        recovered: Address,
    },
    #[error("signature recovery failed: {0}")]
    RecoveryFailed(sig::Error),
    #[error("encoding failed: {0}")]
    Encode(#[from] EncodeError),
}

#[derive(Debug, Error)]
pub enum RespondError {
    #[error("no challenge is pending for the channel")]
    ChallengeNotPending,
    #[error("challenge window elapsed at {finalized_at}, now is {now}")]
    ChallengeExpired { finalized_at: u64, now: u64 },
    #[error("illegal transition: {0}")]
    InvalidTransition(#[from] TransitionError),
    #[error("response signed by {recovered:?}, expected mover {expected:?}")]
    ResponseNotAuthorized {
        expected: Address,
        recovered: Address,
    },
    #[error("signature recovery failed: {0}")]
    RecoveryFailed(sig::Error),
    #[error("encoding failed: {0}")]
    Encode(#[from] EncodeError),
}

#[derive(Debug, Error)]
pub enum ConcludeError {
    #[error("channel is already finalized")]
    AlreadyFinalized,
    #[error("malformed conclusion proof: {0}")]
    InvalidProof(#[from] ProofError),
    #[error("conclusion signed by {recovered:?}, expected mover {expected:?}")]
    ConclusionNotAuthorized {
        expected: Address,
        recovered: Address,
    },
    #[error("signature recovery failed: {0}")]
    RecoveryFailed(sig::Error),
    #[error("encoding failed: {0}")]
    Encode(#[from] EncodeError),
}

/// Why a state's signature did not check out against its mover.
enum MoverCheck {
    Encode(EncodeError),
    Recovery(sig::Error),
    Wrong {
        expected: Address,
        recovered: Address,
    },
}

/// Verify that `sig` is the state's mover signing the state hash.
fn signed_by_mover(state: &State, sig: Signature) -> Result<(), MoverCheck> {
    let hash = state.hash().map_err(MoverCheck::Encode)?;
    let recovered = sig::recover_signer(hash, sig).map_err(MoverCheck::Recovery)?;
    let expected = state.mover();
    if recovered != expected {
        return Err(MoverCheck::Wrong {
            expected,
            recovered,
        });
    }
    Ok(())
}

impl<B: EventBus, C: Clock> Adjudicator<B, C> {
    /// Lifecycle phase of the channel right now.
    pub fn channel_mode(&self, channel: ChannelId) -> ChannelMode {
        match self.outcomes.get(channel) {
            None => ChannelMode::Open,
            Some(o) if !o.is_recorded() => ChannelMode::Open,
            Some(o) if o.is_final(self.clock.now()) => ChannelMode::Closed,
            Some(_) => ChannelMode::Challenged,
        }
    }

    pub fn is_channel_closed(&self, channel: ChannelId) -> bool {
        self.channel_mode(channel) == ChannelMode::Closed
    }

    /// Open a challenge: `challenge` must be a legal successor of `agreed`,
    /// each signed by its mover. On success the channel carries a pending
    /// outcome that finalizes once the challenge window elapses uncountered.
    pub fn force_move(
        &mut self,
        agreed: &State,
        challenge: &State,
        signatures: &[Signature; 2],
    ) -> Result<(), ForceMoveError> {
        let channel = challenge.channel_id()?;
        let mode = self.channel_mode(channel);
        if mode != ChannelMode::Open {
            return Err(ForceMoveError::ChannelNotOpen { mode });
        }

        challenge.params().rules.validate(agreed, challenge)?;

        for (state, sig) in [(agreed, signatures[0]), (challenge, signatures[1])] {
            signed_by_mover(state, sig).map_err(|e| match e {
                MoverCheck::Encode(e) => ForceMoveError::Encode(e),
                MoverCheck::Recovery(e) => ForceMoveError::RecoveryFailed(e),
                MoverCheck::Wrong {
                    expected,
                    recovered,
                } => ForceMoveError::ChallengeNotAuthorized {
                    expected,
                    recovered,
                },
            })?;
        }

        let now = self.clock.now();
        let finalizes_at = now.saturating_add(challenge.params().challenge_duration);
        self.outcomes
            .set(channel, Outcome::from_state(challenge, finalizes_at));

        info!(
            channel = ?channel,
            turn_num = challenge.turn_num(),
            finalizes_at,
            "challenge registered"
        );
        self.bus.publish(Event::ChallengeRegistered {
            channel,
            turn_num: challenge.turn_num(),
            finalizes_at,
        });
        Ok(())
    }

    /// Counter a pending challenge with the next move: a legal successor of
    /// the challenge state, signed by its mover. Clears the pending outcome
    /// and reopens the channel.
    pub fn respond_with_move(
        &mut self,
        response: &State,
        signature: Signature,
    ) -> Result<(), RespondError> {
        let channel = response.channel_id()?;
        let now = self.clock.now();

        let challenge_state = match self.outcomes.get(channel) {
            Some(o) if o.is_recorded() => {
                if o.is_final(now) {
                    return Err(RespondError::ChallengeExpired {
                        finalized_at: o.finalized_at,
                        now,
                    });
                }
                match &o.challenge_state {
                    Some(state) => state.clone(),
                    None => return Err(RespondError::ChallengeNotPending),
                }
            }
            _ => return Err(RespondError::ChallengeNotPending),
        };

        response
            .params()
            .rules
            .validate(&challenge_state, response)?;

        signed_by_mover(response, signature).map_err(|e| match e {
            MoverCheck::Encode(e) => RespondError::Encode(e),
            MoverCheck::Recovery(e) => RespondError::RecoveryFailed(e),
            MoverCheck::Wrong {
                expected,
                recovered,
            } => RespondError::ResponseNotAuthorized {
                expected,
                recovered,
            },
        })?;

        // The slot stays; the outcome is driven back to absent.
        self.outcomes.set(channel, Outcome::default());

        info!(channel = ?channel, turn_num = response.turn_num(), "challenge answered");
        self.bus.publish(Event::Responded {
            channel,
            turn_num: response.turn_num(),
        });
        Ok(())
    }

    /// Finalize a channel immediately from a mutually signed pair of
    /// consecutive states with equal resolutions. Works while the channel is
    /// open or challenged; only an already-final channel rejects it.
    pub fn conclude(&mut self, proof: &ConclusionProof) -> Result<(), ConcludeError> {
        let channel = proof.ultimate.channel_id()?;
        if self.channel_mode(channel) == ChannelMode::Closed {
            return Err(ConcludeError::AlreadyFinalized);
        }

        proof.validate()?;

        for (state, sig) in [
            (&proof.penultimate, proof.penultimate_sig),
            (&proof.ultimate, proof.ultimate_sig),
        ] {
            signed_by_mover(state, sig).map_err(|e| match e {
                MoverCheck::Encode(e) => ConcludeError::Encode(e),
                MoverCheck::Recovery(e) => ConcludeError::RecoveryFailed(e),
                MoverCheck::Wrong {
                    expected,
                    recovered,
                } => ConcludeError::ConclusionNotAuthorized {
                    expected,
                    recovered,
                },
            })?;
        }

        let now = self.clock.now();
        self.outcomes
            .set(channel, Outcome::from_state(&proof.penultimate, now));

        info!(channel = ?channel, finalized_at = now, "channel concluded");
        self.bus.publish(Event::Concluded {
            channel,
            finalized_at: now,
        });
        Ok(())
    }
}
