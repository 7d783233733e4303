//! Error taxonomy shared by every bank operation.

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type used across the bank core and its stores.
pub type BankResult<T> = Result<T, BankError>;

/// Bank-level error.
///
/// Business rejections (`InvalidInput`, `AuthFailure`, `InsufficientFunds`,
/// `NotFound`) are deterministic. `Conflict` is only raised by stores when an
/// account number is already taken and is retried by the account store.
/// `Storage` covers every backend failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BankError {
    /// Malformed or out-of-range input (e.g. negative deposit, empty name).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Bad credentials. Deliberately does not say which part was wrong.
    #[error("invalid account number or password")]
    AuthFailure,

    /// A withdrawal asked for more than the account holds.
    #[error("insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds {
        available: Decimal,
        requested: Decimal,
    },

    /// Unknown account.
    #[error("not found")]
    NotFound,

    /// A uniqueness constraint rejected the write (e.g. duplicate account number).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The backing store failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl BankError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn invalid_amount(amount: Decimal) -> Self {
        Self::InvalidInput(format!("amount must be positive, got {amount}"))
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Whether retrying the same operation with fresh input may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
