//! Infrastructure layer: storage backends, the account store and ledger
//! components built on them, and configuration.

pub mod accounts;
pub mod config;
pub mod ledger;
pub mod store;

mod integration_tests;

pub use accounts::AccountStore;
pub use config::{BankConfig, ConfigError};
pub use ledger::{Ledger, Reconciliation};
pub use store::{BankStore, InMemoryBankStore, PostgresBankStore};
