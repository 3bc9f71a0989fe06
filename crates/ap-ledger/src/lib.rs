//! anonymity mining ledger
//!
//! verifies reward and withdraw submissions against its own account-root
//! history and nullifier sets, then appends the new account commitment to
//! the shared event log. proof checking goes through
//! [`ap_core::ProofVerifier`], with [`Groth16Verifier`] for snarkjs keys.

pub mod error;
pub mod groth16;
pub mod ledger;
pub mod trees;

pub use error::{Rejection, Result};
pub use groth16::{Groth16Verifier, KeyError, SnarkjsKey};
pub use ledger::{Ledger, WithdrawReceipt};
pub use trees::{replayed_root, MemoryTrees, TreeRoots};
