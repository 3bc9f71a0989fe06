//! error types for the tree synchronizer and proof orchestrator

use ap_core::{CoreError, ErrorKind, EventKind};
use thiserror::Error;

use crate::prover::ProverError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("note not found in {kind} tree")]
    NoteNotFound { kind: EventKind },

    #[error("account commitment not found in account tree")]
    AccountNotFound,

    #[error("withdrawal block {withdrawal_block} precedes deposit block {deposit_block}")]
    InvalidNoteInterval {
        deposit_block: u64,
        withdrawal_block: u64,
    },

    #[error("{kind} log gap: expected index {expected}, found {found}")]
    LogGap {
        kind: EventKind,
        expected: u64,
        found: u64,
    },

    #[error("{kind} log has conflicting events at index {index}")]
    ConflictingEvent { kind: EventKind, index: u64 },

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("failed to decode {what}: {reason}")]
    Decode { what: &'static str, reason: String },

    #[error(transparent)]
    Prover(#[from] ProverError),
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Core(e) => e.kind(),
            ClientError::NoteNotFound { .. }
            | ClientError::AccountNotFound
            | ClientError::InvalidNoteInterval { .. } => ErrorKind::InputValidation,
            ClientError::LogGap { .. } | ClientError::ConflictingEvent { .. } => {
                ErrorKind::Integrity
            }
            ClientError::Rpc(_) | ClientError::Decode { .. } | ClientError::Prover(_) => {
                ErrorKind::External
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
