//! Unified error type for the ledger core.
//!
//! Every operation returns [`Result`]; the HTTP layer translates the variants
//! into responses. Only [`Error::StoreUnavailable`] is worth retrying.

use crate::entities::transaction::TransactionStatus;
use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Input failed shape or range checks
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Non-finite or non-positive amounts
    #[error("Invalid amount: {amount}")]
    InvalidAmount { amount: f64 },

    #[error("User not found: {user_id}")]
    UserNotFound { user_id: String },

    #[error("Level not found: {level}")]
    LevelNotFound { level: String },

    #[error("Transaction not found: {transaction_id}")]
    TransactionNotFound { transaction_id: i64 },

    /// A uniqueness constraint rejected a repeated run
    #[error("Already processed: {key}")]
    DuplicateRun { key: String },

    #[error("Transaction {transaction_id} cannot move from {from:?} to {to:?}")]
    InvalidStateTransition {
        transaction_id: i64,
        from: TransactionStatus,
        to: TransactionStatus,
    },

    #[error("Insufficient funds: balance {current:.2}, required {required:.2}")]
    InsufficientFunds { current: f64, required: f64 },

    /// Transient store failure; the caller may retry
    #[error("Store unavailable: {message}")]
    StoreUnavailable { message: String },

    #[error("Database error: {0}")]
    Database(DbErr),

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl Error {
    /// Whether the caller may retry the failed operation unchanged.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }
}

impl From<DbErr> for Error {
    fn from(err: DbErr) -> Self {
        match err {
            DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => Self::StoreUnavailable {
                message: err.to_string(),
            },
            other => Self::Database(other),
        }
    }
}

/// Returns true when the store rejected a write because of a unique index.
#[must_use]
pub fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
