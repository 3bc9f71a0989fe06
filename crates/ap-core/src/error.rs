//! error types for anonymity mining primitives

use alloy_primitives::U256;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("value {0} is not a bn254 scalar field element")]
    NotInField(U256),

    #[error("cannot create an account with negative amount")]
    NegativeAmount,

    #[error("secret material must fit in 31 bytes")]
    SecretOutOfRange,

    #[error("account amount {0} does not fit in 248 bits")]
    AmountOutOfRange(U256),

    #[error("poseidon error: {0}")]
    Poseidon(String),

    #[error("pedersen error: {0}")]
    Pedersen(String),

    #[error("merkle tree is full (capacity {capacity})")]
    TreeFull { capacity: usize },

    #[error("unsupported tree height {0}")]
    InvalidTreeHeight(usize),

    #[error("leaf index {index} out of bounds (tree has {len} leaves)")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("malformed encrypted account: {0}")]
    MalformedCiphertext(String),

    #[error("account decryption failed")]
    DecryptionFailed,

    #[error("invalid note: {0}")]
    InvalidNote(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("arithmetic overflow: {0}")]
    Overflow(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// coarse classification of failures, shared by client and ledger
///
/// callers resynchronize and retry only on `Staleness`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// bad local inputs, never reach the chain
    InputValidation,
    /// proof built against an outdated account tree
    Staleness,
    /// replay or tampering
    Integrity,
    /// value above the 248-bit safety margin
    Range,
    /// circuit verification failed
    ProofInvalid,
    /// rpc, prover process, io
    External,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Staleness)
    }
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Poseidon(_) | CoreError::Pedersen(_) => ErrorKind::External,
            CoreError::AmountOutOfRange(_) => ErrorKind::Range,
            _ => ErrorKind::InputValidation,
        }
    }
}
