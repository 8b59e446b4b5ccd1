use thiserror::Error;

/// Why a transaction was refused admission.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransactionError {
    #[error("sender must not be empty")]
    EmptySender,
    #[error("recipient must not be empty")]
    EmptyRecipient,
    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(f64),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("invalid transaction: {0}")]
    InvalidTransaction(#[from] TransactionError),
    #[error("block {index} failed its own hash or transaction checks")]
    InvalidBlock { index: u64 },
    #[error("block {index} does not link to the chain tip (expected previous hash {expected}, got {actual})")]
    BrokenLink {
        index: u64,
        expected: String,
        actual: String,
    },
    #[error("mining of block {index} was canceled after {attempts} attempts")]
    MiningCanceled { index: u64, attempts: u64 },
    #[error("no pending transactions to mine")]
    NothingPending,
    #[error("no blocks to restore from")]
    EmptyRestore,
}

/// What went wrong with a block during whole-chain validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityFault {
    /// Stored hash or a contained transaction fails the block's own checks.
    InvalidBlock,
    HashMismatch,
    BrokenLink,
    InsufficientWork { difficulty: u32 },
}

impl std::fmt::Display for IntegrityFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegrityFault::InvalidBlock => write!(f, "block is invalid"),
            IntegrityFault::HashMismatch => write!(f, "hash mismatch"),
            IntegrityFault::BrokenLink => write!(f, "previous hash mismatch"),
            IntegrityFault::InsufficientWork { difficulty } => {
                write!(f, "hash does not meet difficulty {difficulty}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("block {index}: {fault}")]
pub struct IntegrityError {
    pub index: u64,
    pub fault: IntegrityFault,
}
