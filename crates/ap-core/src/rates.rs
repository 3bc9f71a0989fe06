//! per-instance AP accrual rates
//!
//! governance writes, the controller reads at proof time, the ledger
//! re-checks at verification time.

use std::collections::HashMap;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateUpdate {
    pub instance: Address,
    pub value: U256,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Rates {
    table: HashMap<Address, U256>,
}

impl Rates {
    pub fn new() -> Self {
        Self::default()
    }

    /// unknown instances accrue nothing
    pub fn rate(&self, instance: Address) -> U256 {
        self.table.get(&instance).copied().unwrap_or(U256::ZERO)
    }

    pub fn set_rates(&mut self, updates: &[RateUpdate]) {
        for update in updates {
            self.table.insert(update.instance, update.value);
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl FromIterator<RateUpdate> for Rates {
    fn from_iter<I: IntoIterator<Item = RateUpdate>>(iter: I) -> Self {
        let mut rates = Rates::new();
        let updates: Vec<_> = iter.into_iter().collect();
        rates.set_rates(&updates);
        rates
    }
}
