//! `minibank-core`: domain model of the bank ledger.
//!
//! This crate contains **pure domain** types and rules (no IO): accounts,
//! transactions, amounts, account-number generation and the error taxonomy.

pub mod account;
pub mod account_number;
pub mod error;
pub mod id;
pub mod money;
pub mod transaction;

pub use account::{Account, AccountNumber, BalanceChange, NewAccount, Password};
pub use account_number::{AccountNumberSource, RandomAccountNumbers, ScriptedAccountNumbers};
pub use error::{BankError, BankResult};
pub use id::{AccountId, TransactionId};
pub use money::Amount;
pub use transaction::{Transaction, TransactionKind};
