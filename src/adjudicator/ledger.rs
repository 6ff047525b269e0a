use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use super::Adjudicator;
use crate::bus::{Event, EventBus};
use crate::clock::Clock;
use crate::encode::types::{EntityId, U256};

/// Escrow balances per entity key (channel id or participant address).
///
/// The ledger is the sole owner of allocation balances. Keys are never
/// removed; a drained balance stays in the map at zero.
#[derive(Debug, Default)]
pub(super) struct Ledger {
    allocations: HashMap<EntityId, U256>,
}

#[derive(Debug, PartialEq, Eq)]
pub(super) enum LedgerError {
    InsufficientFunds,
    BalanceOverflow,
}

impl Ledger {
    pub fn balance(&self, entity: EntityId) -> U256 {
        self.allocations.get(&entity).copied().unwrap_or_default()
    }

    /// Credit `entity` and return its new balance.
    pub fn credit(&mut self, entity: EntityId, amount: U256) -> Result<U256, LedgerError> {
        let updated = self
            .balance(entity)
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow)?;
        self.allocations.insert(entity, updated);
        Ok(updated)
    }

    /// Move `amount` between two entities, all-or-nothing: both sides are
    /// checked before either is written.
    pub fn transfer(&mut self, from: EntityId, to: EntityId, amount: U256) -> Result<(), LedgerError> {
        let debited = self
            .balance(from)
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientFunds)?;
        let credited = self
            .balance(to)
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow)?;
        if from == to {
            return Ok(());
        }
        self.allocations.insert(from, debited);
        self.allocations.insert(to, credited);
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DepositError {
    #[error("declared amount {declared} does not match supplied value {supplied}")]
    AmountMismatch { declared: U256, supplied: U256 },
    #[error("destination allocation would overflow")]
    BalanceOverflow,
}

impl<B: EventBus, C: Clock> Adjudicator<B, C> {
    /// Credit `destination`'s escrow with `supplied_value`.
    ///
    /// No signature required; anyone may fund any entity key. The declared
    /// amount must match the value actually supplied with the call.
    pub fn deposit(
        &mut self,
        destination: EntityId,
        declared_amount: U256,
        supplied_value: U256,
    ) -> Result<(), DepositError> {
        if declared_amount != supplied_value {
            return Err(DepositError::AmountMismatch {
                declared: declared_amount,
                supplied: supplied_value,
            });
        }
        let holdings = self
            .ledger
            .credit(destination, supplied_value)
            .map_err(|_| DepositError::BalanceOverflow)?;
        debug!(destination = ?destination, amount = %supplied_value, "deposit credited");
        self.bus.publish(Event::Deposited {
            destination,
            amount: supplied_value,
            holdings,
        });
        Ok(())
    }

    /// Current escrow balance of an entity key; zero if never funded.
    pub fn allocation_of(&self, entity: EntityId) -> U256 {
        self.ledger.balance(entity)
    }
}
