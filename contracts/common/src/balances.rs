//! Balance bookkeeping for debt tokens, collateral and sbr.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::errors::{SbrError, SbrResult};
use crate::math::{safe_add, safe_sub};
use crate::types::{Address, Asset};

/// Per-holder balances of every asset the protocol pays out or collects
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct BalanceBook {
    balances: BTreeMap<(Address, Asset), u128>,
}

impl BalanceBook {
    /// Create an empty book
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of `holder` in `asset`
    pub fn balance_of(&self, holder: &Address, asset: Asset) -> u128 {
        self.balances.get(&(*holder, asset)).copied().unwrap_or(0)
    }

    /// Add `amount` to a holder's balance
    pub fn credit(&mut self, holder: &Address, asset: Asset, amount: u128) -> SbrResult<()> {
        if amount == 0 {
            return Ok(());
        }
        let entry = self.balances.entry((*holder, asset)).or_insert(0);
        *entry = safe_add(*entry, amount)?;
        Ok(())
    }

    /// Remove `amount` from a holder's balance
    pub fn debit(&mut self, holder: &Address, asset: Asset, amount: u128) -> SbrResult<()> {
        if amount == 0 {
            return Ok(());
        }
        let available = self.balance_of(holder, asset);
        if available < amount {
            return Err(SbrError::InsufficientBalance { available, requested: amount });
        }
        let remaining = safe_sub(available, amount)?;
        if remaining == 0 {
            self.balances.remove(&(*holder, asset));
        } else {
            self.balances.insert((*holder, asset), remaining);
        }
        Ok(())
    }
}
