//! Repository-level error, finer-grained than `WalletError`.
//!
//! `OptimisticLockConflict` and `Transient` are the two retryable classes the
//! resilience wrapper knows how to handle; everything else is permanent and
//! is mapped straight through to `WalletError` without a retry attempt.

use rust_decimal::Decimal;
use wallet_common::WalletError;

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("optimistic lock conflict")]
    OptimisticLockConflict,

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("wallet not found: {0}")]
    NotFound(String),

    #[error("wallet not active: {0}")]
    NotActive(String),

    #[error("invalid status transition: {0}")]
    InvalidTransition(String),

    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Decimal, available: Decimal },

    #[error("duplicate reference: {reference_id}")]
    DuplicateReference { reference_id: String },

    #[error("database error")]
    Database(#[from] sqlx::Error),
}

impl RepoError {
    pub fn is_retryable_optimistic(&self) -> bool {
        matches!(self, RepoError::OptimisticLockConflict)
    }

    pub fn is_retryable_transient(&self) -> bool {
        match self {
            RepoError::Transient(_) => true,
            RepoError::Database(e) => is_transient_sqlx_error(e),
            _ => false,
        }
    }
}

/// Classifies a `sqlx::Error` as transient (connection reset, timeout, pool
/// exhaustion) vs. permanent.
pub fn is_transient_sqlx_error(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
    )
}

/// Maps a `RepoError` to the boundary's `WalletError`. Handlers that bypass
/// `Resilience::execute` (pure reads) go through this directly; the two
/// retryable variants map to their exhausted-state counterparts here as a
/// fallback, even though the resilience wrapper normally intercepts them
/// first and only calls this after retries are actually exhausted.
impl From<RepoError> for WalletError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::InvalidAmount(msg) => WalletError::Validation(msg),
            RepoError::NotFound(id) => WalletError::WalletNotFound(id),
            RepoError::NotActive(id) => WalletError::WalletNotActive(id),
            RepoError::InvalidTransition(msg) => WalletError::Validation(msg),
            RepoError::InsufficientFunds { required, available } => {
                WalletError::InsufficientFunds { required, available }
            }
            RepoError::DuplicateReference { reference_id } => {
                WalletError::DuplicateReference { reference_id }
            }
            RepoError::Database(cause) => WalletError::internal(cause),
            RepoError::OptimisticLockConflict => WalletError::OptimisticLockExhausted,
            RepoError::Transient(msg) => WalletError::internal(anyhow::anyhow!(msg)),
        }
    }
}
