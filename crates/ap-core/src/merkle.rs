//! fixed-height insert-only merkle tree
//!
//! same layout as the circuits' tree: poseidon2 nodes, empty subtrees filled
//! with the precomputed zero chain starting at keccak256("tornado") mod p.
//! the root is a pure function of the ordered leaf list.

use alloy_primitives::{keccak256, U256};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::field::{ensure_field, FIELD_SIZE};
use crate::hash::poseidon_hash2;

/// default height of every tree in the protocol
pub const TREE_HEIGHT: usize = 20;

/// empty leaf
pub fn zero_value() -> U256 {
    U256::from_be_bytes(keccak256(b"tornado").0) % FIELD_SIZE
}

/// sibling hashes from leaf to root plus the packed side bits
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerklePath {
    pub elements: Vec<U256>,
    /// bit i set when the level-i ancestor is a right child
    pub indices: u64,
}

impl MerklePath {
    /// placeholder path for an account that was never inserted
    pub fn zero(height: usize) -> Self {
        Self {
            elements: vec![U256::ZERO; height],
            indices: 0,
        }
    }

    pub fn compute_root(&self, leaf: U256) -> Result<U256> {
        let mut current = leaf;
        for (level, sibling) in self.elements.iter().enumerate() {
            current = if (self.indices >> level) & 1 == 0 {
                poseidon_hash2(current, *sibling)?
            } else {
                poseidon_hash2(*sibling, current)?
            };
        }
        Ok(current)
    }
}

/// where the account being consumed sits in the account tree
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccountMembership {
    Found { index: usize, path: MerklePath },
    /// the zero account, never inserted
    NotInserted,
}

impl AccountMembership {
    /// what the circuit sees: the real path, or all zeros
    pub fn circuit_path(&self, height: usize) -> MerklePath {
        match self {
            AccountMembership::Found { path, .. } => path.clone(),
            AccountMembership::NotInserted => MerklePath::zero(height),
        }
    }

    pub fn is_inserted(&self) -> bool {
        matches!(self, AccountMembership::Found { .. })
    }
}

/// result of a single insertion
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InsertTranscript {
    pub old_root: U256,
    pub new_root: U256,
    pub leaf: U256,
    pub index: usize,
    pub path: MerklePath,
}

#[derive(Clone, Debug)]
pub struct MerkleTree {
    height: usize,
    zeros: Vec<U256>,
    /// layers[0] are the leaves, layers[height] holds the root once non-empty
    layers: Vec<Vec<U256>>,
}

impl MerkleTree {
    pub fn new(height: usize) -> Result<Self> {
        if height == 0 || height > 32 {
            return Err(CoreError::InvalidTreeHeight(height));
        }
        let mut zeros = Vec::with_capacity(height + 1);
        zeros.push(zero_value());
        for level in 1..=height {
            let below = zeros[level - 1];
            zeros.push(poseidon_hash2(below, below)?);
        }
        Ok(Self {
            height,
            zeros,
            layers: vec![Vec::new(); height + 1],
        })
    }

    /// replay a leaf list from genesis
    pub fn from_leaves<I>(height: usize, leaves: I) -> Result<Self>
    where
        I: IntoIterator<Item = U256>,
    {
        let mut tree = Self::new(height)?;
        let leaves = leaves
            .into_iter()
            .map(ensure_field)
            .collect::<Result<Vec<_>>>()?;
        if leaves.len() > tree.capacity() {
            return Err(CoreError::TreeFull {
                capacity: tree.capacity(),
            });
        }
        tree.layers[0] = leaves;
        tree.rebuild()?;
        Ok(tree)
    }

    fn rebuild(&mut self) -> Result<()> {
        for level in 1..=self.height {
            let below = &self.layers[level - 1];
            let mut next = Vec::with_capacity(below.len().div_ceil(2));
            for pair in below.chunks(2) {
                let right = pair.get(1).copied().unwrap_or(self.zeros[level - 1]);
                next.push(poseidon_hash2(pair[0], right)?);
            }
            self.layers[level] = next;
        }
        Ok(())
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn capacity(&self) -> usize {
        1usize << self.height
    }

    pub fn len(&self) -> usize {
        self.layers[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers[0].is_empty()
    }

    pub fn leaves(&self) -> &[U256] {
        &self.layers[0]
    }

    pub fn zeros(&self) -> &[U256] {
        &self.zeros
    }

    pub fn root(&self) -> U256 {
        self.layers[self.height]
            .first()
            .copied()
            .unwrap_or(self.zeros[self.height])
    }

    /// first index holding `leaf`
    pub fn index_of(&self, leaf: U256) -> Option<usize> {
        self.layers[0].iter().position(|l| *l == leaf)
    }

    pub fn membership(&self, leaf: U256) -> Result<AccountMembership> {
        match self.index_of(leaf) {
            Some(index) => Ok(AccountMembership::Found {
                index,
                path: self.path(index)?,
            }),
            None => Ok(AccountMembership::NotInserted),
        }
    }

    pub fn path(&self, index: usize) -> Result<MerklePath> {
        if index >= self.len() {
            return Err(CoreError::IndexOutOfBounds {
                index,
                len: self.len(),
            });
        }
        let mut elements = Vec::with_capacity(self.height);
        let mut indices = 0u64;
        let mut pos = index;
        for level in 0..self.height {
            indices |= ((pos & 1) as u64) << level;
            let sibling = pos ^ 1;
            elements.push(
                self.layers[level]
                    .get(sibling)
                    .copied()
                    .unwrap_or(self.zeros[level]),
            );
            pos >>= 1;
        }
        Ok(MerklePath { elements, indices })
    }

    pub fn insert(&mut self, leaf: U256) -> Result<InsertTranscript> {
        let leaf = ensure_field(leaf)?;
        if self.len() >= self.capacity() {
            return Err(CoreError::TreeFull {
                capacity: self.capacity(),
            });
        }
        let old_root = self.root();
        let index = self.len();
        self.layers[0].push(leaf);

        let mut pos = index;
        for level in 1..=self.height {
            pos >>= 1;
            let below = &self.layers[level - 1];
            let left = below[2 * pos];
            let right = below.get(2 * pos + 1).copied().unwrap_or(self.zeros[level - 1]);
            let node = poseidon_hash2(left, right)?;
            if pos < self.layers[level].len() {
                self.layers[level][pos] = node;
            } else {
                self.layers[level].push(node);
            }
        }

        Ok(InsertTranscript {
            old_root,
            new_root: self.root(),
            leaf,
            index,
            path: self.path(index)?,
        })
    }
}
