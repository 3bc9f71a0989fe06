//! deposit/withdrawal tree registry
//!
//! the ledger only needs to know whether a root was ever produced by the
//! external trees. `MemoryTrees` is the in-process stand-in: it registers
//! deposits and withdrawals, publishes them to the shared log and keeps every
//! root it has produced.

use std::collections::HashSet;

use alloy_primitives::{Address, B256, U256};
use ap_core::field::{u256_to_word, word_to_u256};
use ap_core::{MemoryEventLog, MerkleTree, TreeEvent};
use tracing::debug;

pub trait TreeRoots {
    fn is_known_deposit_root(&self, root: B256) -> bool;
    fn is_known_withdrawal_root(&self, root: B256) -> bool;
}

impl<T: TreeRoots + ?Sized> TreeRoots for &T {
    fn is_known_deposit_root(&self, root: B256) -> bool {
        (**self).is_known_deposit_root(root)
    }

    fn is_known_withdrawal_root(&self, root: B256) -> bool {
        (**self).is_known_withdrawal_root(root)
    }
}

struct RegisteredTree {
    tree: MerkleTree,
    roots: HashSet<B256>,
}

impl RegisteredTree {
    fn new(height: usize) -> ap_core::Result<Self> {
        let tree = MerkleTree::new(height)?;
        let roots = HashSet::from([u256_to_word(tree.root())]);
        Ok(Self { tree, roots })
    }

    fn insert(&mut self, event: &TreeEvent) -> ap_core::Result<B256> {
        self.tree.insert(event.leaf()?)?;
        let root = u256_to_word(self.tree.root());
        self.roots.insert(root);
        Ok(root)
    }
}

pub struct MemoryTrees {
    log: MemoryEventLog,
    deposits: RegisteredTree,
    withdrawals: RegisteredTree,
}

impl MemoryTrees {
    pub fn new(log: MemoryEventLog, height: usize) -> ap_core::Result<Self> {
        Ok(Self {
            log,
            deposits: RegisteredTree::new(height)?,
            withdrawals: RegisteredTree::new(height)?,
        })
    }

    /// `commitment` is the note's pedersen commitment
    pub fn register_deposit(
        &mut self,
        instance: Address,
        commitment: U256,
        block: u64,
    ) -> ap_core::Result<TreeEvent> {
        let event = TreeEvent {
            instance,
            hash: u256_to_word(commitment),
            block,
            index: self.deposits.tree.len() as u64,
        };
        let root = self.deposits.insert(&event)?;
        debug!(index = event.index, %root, "deposit registered");
        Ok(self.log.push_deposit(instance, event.hash, block))
    }

    /// `nullifier_hash` is the note's pedersen nullifier hash
    pub fn register_withdrawal(
        &mut self,
        instance: Address,
        nullifier_hash: U256,
        block: u64,
    ) -> ap_core::Result<TreeEvent> {
        let event = TreeEvent {
            instance,
            hash: u256_to_word(nullifier_hash),
            block,
            index: self.withdrawals.tree.len() as u64,
        };
        let root = self.withdrawals.insert(&event)?;
        debug!(index = event.index, %root, "withdrawal registered");
        Ok(self.log.push_withdrawal(instance, event.hash, block))
    }

    pub fn deposit_root(&self) -> B256 {
        u256_to_word(self.deposits.tree.root())
    }

    pub fn withdrawal_root(&self) -> B256 {
        u256_to_word(self.withdrawals.tree.root())
    }

    pub fn log(&self) -> &MemoryEventLog {
        &self.log
    }
}

impl TreeRoots for MemoryTrees {
    fn is_known_deposit_root(&self, root: B256) -> bool {
        self.deposits.roots.contains(&root)
    }

    fn is_known_withdrawal_root(&self, root: B256) -> bool {
        self.withdrawals.roots.contains(&root)
    }
}

/// root of a tree rebuilt from the same log, for cross-checking
pub fn replayed_root(height: usize, events: &[TreeEvent]) -> ap_core::Result<B256> {
    let leaves = events
        .iter()
        .map(|e| e.leaf())
        .collect::<ap_core::Result<Vec<_>>>()?;
    let tree = MerkleTree::from_leaves(height, leaves)?;
    Ok(u256_to_word(tree.root()))
}
