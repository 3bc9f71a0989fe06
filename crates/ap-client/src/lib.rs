//! anonymity mining client
//!
//! keeps local copies of the deposit, withdrawal and account trees in sync
//! with the event logs, and builds reward, withdraw and tree-update proofs
//! against them.
//!
//! ```text
//! EventSource ──> Forest ──> Controller ──> Prover
//!  (memory/rpc)    (trees)    (witness)      (external)
//! ```

pub mod controller;
pub mod error;
pub mod forest;
pub mod inputs;
pub mod prover;
pub mod rpc;
pub mod scanner;
pub mod source;

pub use controller::{
    reward_amount, Controller, ControllerConfig, RateSource, RewardProof, RewardRequest,
    WithdrawProof, WithdrawRequest,
};
pub use error::{ClientError, Result};
pub use forest::{Forest, SyncReport};
pub use inputs::{CircuitInputs, Signal};
pub use prover::{CommandProver, Prover, ProverConfig, ProverError};
pub use rpc::{RpcConfig, RpcEventSource};
pub use scanner::{latest_unspent, owned_accounts, OwnedAccount};
pub use source::{validate_batch, EventSource};

#[cfg(any(test, feature = "test-utils"))]
pub use prover::DigestProver;
