//! ordered event logs
//!
//! the deposit, withdrawal and account trees are never shared between
//! components. everybody replays the same append-only logs and rebuilds.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::field::{address_to_field, word_to_u256};
use crate::hash::poseidon_hash;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Deposit,
    Withdrawal,
    Account,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Deposit => f.write_str("deposit"),
            EventKind::Withdrawal => f.write_str("withdrawal"),
            EventKind::Account => f.write_str("account"),
        }
    }
}

/// position of an event in its log
pub trait Indexed {
    fn index(&self) -> u64;
}

/// a registered deposit (hash = note commitment) or withdrawal
/// (hash = note nullifier hash)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEvent {
    pub instance: Address,
    pub hash: B256,
    pub block: u64,
    pub index: u64,
}

impl TreeEvent {
    /// poseidon([instance, hash, block])
    pub fn leaf(&self) -> Result<U256> {
        poseidon_hash(&[
            address_to_field(self.instance),
            word_to_u256(self.hash),
            U256::from(self.block),
        ])
    }
}

impl Indexed for TreeEvent {
    fn index(&self) -> u64 {
        self.index
    }
}

/// a new account commitment published by the ledger
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEvent {
    pub commitment: B256,
    /// nullifier hash of the account consumed to create this one
    pub nullifier_hash: B256,
    pub encrypted_account: Bytes,
    pub index: u64,
}

impl Indexed for AccountEvent {
    fn index(&self) -> u64 {
        self.index
    }
}

#[derive(Debug, Default)]
struct LogState {
    deposits: Vec<TreeEvent>,
    withdrawals: Vec<TreeEvent>,
    accounts: Vec<AccountEvent>,
}

/// authoritative in-process log, cheap to clone and share
#[derive(Clone, Debug, Default)]
pub struct MemoryEventLog {
    inner: Arc<RwLock<LogState>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, LogState> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, LogState> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push_deposit(&self, instance: Address, hash: B256, block: u64) -> TreeEvent {
        let mut state = self.write();
        let event = TreeEvent {
            instance,
            hash,
            block,
            index: state.deposits.len() as u64,
        };
        state.deposits.push(event.clone());
        event
    }

    pub fn push_withdrawal(&self, instance: Address, hash: B256, block: u64) -> TreeEvent {
        let mut state = self.write();
        let event = TreeEvent {
            instance,
            hash,
            block,
            index: state.withdrawals.len() as u64,
        };
        state.withdrawals.push(event.clone());
        event
    }

    pub fn push_account(
        &self,
        commitment: B256,
        nullifier_hash: B256,
        encrypted_account: Bytes,
    ) -> AccountEvent {
        let mut state = self.write();
        let event = AccountEvent {
            commitment,
            nullifier_hash,
            encrypted_account,
            index: state.accounts.len() as u64,
        };
        state.accounts.push(event.clone());
        event
    }

    pub fn deposits_since(&self, since: u64) -> Vec<TreeEvent> {
        self.read()
            .deposits
            .iter()
            .skip(since as usize)
            .cloned()
            .collect()
    }

    pub fn withdrawals_since(&self, since: u64) -> Vec<TreeEvent> {
        self.read()
            .withdrawals
            .iter()
            .skip(since as usize)
            .cloned()
            .collect()
    }

    pub fn accounts_since(&self, since: u64) -> Vec<AccountEvent> {
        self.read()
            .accounts
            .iter()
            .skip(since as usize)
            .cloned()
            .collect()
    }

    pub fn len(&self, kind: EventKind) -> usize {
        let state = self.read();
        match kind {
            EventKind::Deposit => state.deposits.len(),
            EventKind::Withdrawal => state.withdrawals.len(),
            EventKind::Account => state.accounts.len(),
        }
    }
}
