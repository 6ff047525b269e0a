//! Per-channel-type transition rules.
//!
//! Turn ordering and channel identity are checked for every channel type; the
//! rule variant adds the application-specific checks on top. The variant is a
//! type tag stored in the channel parameters, so which rules apply is fixed
//! at channel creation.

use serde::Serialize;
use thiserror::Error;

use super::{State, PARTICIPANTS};
use crate::encode::types::U256;

#[derive(Serialize, Debug, Copy, Clone, PartialEq, Eq)]
pub enum TransitionRules {
    /// Plain payment channel: balances move between the participants, the
    /// total stays fixed and states carry no application data.
    Payment,
    /// Counter application: the app data is a big-endian `u64` that must
    /// increment by exactly one each turn.
    Counting,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("states belong to different channels")]
    ChannelMismatch,
    #[error("turn {to} does not follow turn {from}")]
    TurnNotSequential { from: u64, to: u64 },
    #[error("resolution total changed across the transition")]
    ResolutionNotConserved,
    #[error("payment states carry no app data")]
    UnexpectedAppData,
    #[error("app data is not an 8-byte counter")]
    MalformedAppData,
    #[error("counter must increment by exactly one")]
    CounterNotIncremented,
}

impl TransitionRules {
    /// Whether `to` is a legal successor of `from` under these rules.
    pub fn validate(&self, from: &State, to: &State) -> Result<(), TransitionError> {
        if from.params() != to.params() {
            return Err(TransitionError::ChannelMismatch);
        }
        if to.turn_num() != from.turn_num() + 1 {
            return Err(TransitionError::TurnNotSequential {
                from: from.turn_num(),
                to: to.turn_num(),
            });
        }
        if total(&from.resolution) != total(&to.resolution) {
            return Err(TransitionError::ResolutionNotConserved);
        }
        match self {
            TransitionRules::Payment => {
                if !from.app_data.is_empty() || !to.app_data.is_empty() {
                    return Err(TransitionError::UnexpectedAppData);
                }
            }
            TransitionRules::Counting => {
                let before = counter(&from.app_data)?;
                let after = counter(&to.app_data)?;
                if before.checked_add(1) != Some(after) {
                    return Err(TransitionError::CounterNotIncremented);
                }
            }
        }
        Ok(())
    }
}

// Compared as (sum, carry) pairs so equal totals stay equal even if the sum
// wraps past the U256 range.
fn total(resolution: &[U256; PARTICIPANTS]) -> (U256, bool) {
    resolution[0].overflowing_add(resolution[1])
}

fn counter(data: &[u8]) -> Result<u64, TransitionError> {
    let bytes: [u8; 8] = data
        .try_into()
        .map_err(|_| TransitionError::MalformedAppData)?;
    Ok(u64::from_be_bytes(bytes))
}
