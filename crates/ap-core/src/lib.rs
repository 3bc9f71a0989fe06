//! anonymity mining core
//!
//! primitives shared by the proof orchestrator and the verification ledger:
//! - bn254 field helpers, poseidon and circom pedersen hashes
//! - fixed-height merkle trees (deposit, withdrawal, account)
//! - notes, accounts and account encryption
//! - abi argument structs, ext-data hashing, circuit public inputs
//! - event log types and the in-process authoritative log

pub mod account;
pub mod args;
pub mod encryption;
pub mod error;
pub mod events;
pub mod field;
pub mod hash;
pub mod merkle;
pub mod note;
pub mod pedersen;
pub mod proof;
pub mod rates;

pub use account::Account;
pub use args::{
    AccountUpdate, RewardArgs, RewardExtData, TreeUpdateArgs, TreeUpdateProof, WithdrawArgs,
    WithdrawExtData,
};
pub use encryption::{EncryptionKeypair, EncryptionPublicKey};
pub use error::{CoreError, ErrorKind, Result};
pub use events::{AccountEvent, EventKind, Indexed, MemoryEventLog, TreeEvent};
pub use field::{FIELD_SIZE, RANGE_LIMIT};
pub use hash::{poseidon_hash, poseidon_hash2};
pub use merkle::{AccountMembership, InsertTranscript, MerklePath, MerkleTree, TREE_HEIGHT};
pub use note::{Note, NoteString};
pub use pedersen::pedersen_hash;
pub use proof::{Circuit, ProofVerifier};
pub use rates::{RateUpdate, Rates};
