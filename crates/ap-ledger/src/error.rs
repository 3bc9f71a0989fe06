//! ledger rejections
//!
//! one variant per revert reason so callers can tell a stale proof (resync
//! and rebuild) from everything else (abort).

use ap_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("reward has been already spent")]
    AlreadySpent,

    #[error("incorrect external data hash")]
    IncorrectExtDataHash,

    #[error("invalid reward rate")]
    InvalidRewardRate,

    #[error("fee value out of range")]
    FeeOutOfRange,

    #[error("amount value out of range")]
    AmountOutOfRange,

    #[error("amount should be greater than fee")]
    InsufficientAmountForFee,

    #[error("invalid {tree} tree root")]
    InvalidRoot { tree: &'static str },

    #[error("outdated account state")]
    OutdatedAccountState,

    #[error("outdated account merkle root")]
    OutdatedAccountMerkleRoot,

    #[error("outdated tree update merkle root")]
    OutdatedTreeUpdateMerkleRoot,

    #[error("incorrect commitment inserted")]
    IncorrectCommitmentInserted,

    #[error("incorrect account insert index")]
    IncorrectAccountInsertIndex,

    #[error("invalid tree update proof")]
    InvalidTreeUpdateProof,

    #[error("invalid reward proof")]
    InvalidRewardProof,

    #[error("invalid withdrawal proof")]
    InvalidWithdrawProof,

    #[error("account tree is full")]
    AccountTreeFull,
}

impl Rejection {
    pub fn kind(&self) -> ErrorKind {
        use Rejection::*;
        match self {
            OutdatedAccountMerkleRoot | OutdatedTreeUpdateMerkleRoot => ErrorKind::Staleness,
            AlreadySpent
            | IncorrectExtDataHash
            | InvalidRewardRate
            | InvalidRoot { .. }
            | OutdatedAccountState
            | IncorrectCommitmentInserted
            | IncorrectAccountInsertIndex => ErrorKind::Integrity,
            FeeOutOfRange | AmountOutOfRange | InsufficientAmountForFee | AccountTreeFull => {
                ErrorKind::Range
            }
            InvalidTreeUpdateProof | InvalidRewardProof | InvalidWithdrawProof => {
                ErrorKind::ProofInvalid
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

pub type Result<T> = std::result::Result<T, Rejection>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_staleness_is_retryable() {
        assert!(Rejection::OutdatedAccountMerkleRoot.is_retryable());
        assert!(Rejection::OutdatedTreeUpdateMerkleRoot.is_retryable());
        assert!(!Rejection::AlreadySpent.is_retryable());
        assert!(!Rejection::InvalidRewardProof.is_retryable());
        assert_eq!(Rejection::FeeOutOfRange.kind(), ErrorKind::Range);
    }
}
