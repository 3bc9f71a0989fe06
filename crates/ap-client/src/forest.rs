//! cached deposit, withdrawal and account trees
//!
//! each tree remembers how many log entries it has consumed, so a sync only
//! fetches the tail. the cache is advisory: the ledger decides freshness.

use alloy_primitives::U256;
use ap_core::field::word_to_u256;
use ap_core::{AccountEvent, EventKind, MerkleTree, TreeEvent};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::Result;
use crate::source::{validate_batch, EventSource};

/// how many events one sync appended
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub deposits: usize,
    pub withdrawals: usize,
    pub accounts: usize,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.deposits == 0 && self.withdrawals == 0 && self.accounts == 0
    }
}

#[derive(Clone, Debug)]
pub struct Forest {
    height: usize,
    deposits: MerkleTree,
    withdrawals: MerkleTree,
    accounts: MerkleTree,
}

fn tree_leaves(events: &[TreeEvent]) -> Result<Vec<U256>> {
    #[cfg(feature = "parallel")]
    let leaves = events
        .par_iter()
        .map(TreeEvent::leaf)
        .collect::<ap_core::Result<Vec<_>>>()?;

    #[cfg(not(feature = "parallel"))]
    let leaves = events
        .iter()
        .map(TreeEvent::leaf)
        .collect::<ap_core::Result<Vec<_>>>()?;

    Ok(leaves)
}

fn append(tree: &mut MerkleTree, leaves: impl IntoIterator<Item = U256>) -> Result<()> {
    for leaf in leaves {
        tree.insert(leaf)?;
    }
    Ok(())
}

impl Forest {
    pub fn new(height: usize) -> Result<Self> {
        Ok(Self {
            height,
            deposits: MerkleTree::new(height)?,
            withdrawals: MerkleTree::new(height)?,
            accounts: MerkleTree::new(height)?,
        })
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn deposits(&self) -> &MerkleTree {
        &self.deposits
    }

    pub fn withdrawals(&self) -> &MerkleTree {
        &self.withdrawals
    }

    pub fn accounts(&self) -> &MerkleTree {
        &self.accounts
    }

    /// events consumed so far
    pub fn consumed(&self, kind: EventKind) -> u64 {
        match kind {
            EventKind::Deposit => self.deposits.len() as u64,
            EventKind::Withdrawal => self.withdrawals.len() as u64,
            EventKind::Account => self.accounts.len() as u64,
        }
    }

    /// fetch and append everything past the cached counts
    ///
    /// all three batches are fetched and checked before any tree changes
    pub async fn sync<S: EventSource>(&mut self, source: &S) -> Result<SyncReport> {
        let deposit_since = self.consumed(EventKind::Deposit);
        let withdrawal_since = self.consumed(EventKind::Withdrawal);
        let account_since = self.consumed(EventKind::Account);

        let deposits = validate_batch(
            EventKind::Deposit,
            deposit_since,
            source.deposit_events(deposit_since).await?,
        )?;
        let withdrawals = validate_batch(
            EventKind::Withdrawal,
            withdrawal_since,
            source.withdrawal_events(withdrawal_since).await?,
        )?;
        let accounts: Vec<AccountEvent> = validate_batch(
            EventKind::Account,
            account_since,
            source.account_events(account_since).await?,
        )?;

        let deposit_leaves = tree_leaves(&deposits)?;
        let withdrawal_leaves = tree_leaves(&withdrawals)?;

        let mut next = self.clone();
        append(&mut next.deposits, deposit_leaves)?;
        append(&mut next.withdrawals, withdrawal_leaves)?;
        append(
            &mut next.accounts,
            accounts.iter().map(|e| word_to_u256(e.commitment)),
        )?;
        *self = next;

        let report = SyncReport {
            deposits: deposits.len(),
            withdrawals: withdrawals.len(),
            accounts: accounts.len(),
        };
        if report.is_empty() {
            debug!("forest up to date");
        } else {
            info!(
                deposits = report.deposits,
                withdrawals = report.withdrawals,
                accounts = report.accounts,
                "forest synced"
            );
        }
        Ok(report)
    }

    /// drop the cache and replay every log from genesis
    pub async fn resync<S: EventSource>(&mut self, source: &S) -> Result<SyncReport> {
        let mut fresh = Forest::new(self.height)?;
        let report = fresh.sync(source).await?;
        *self = fresh;
        Ok(report)
    }
}
