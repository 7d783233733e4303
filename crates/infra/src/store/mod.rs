//! Storage boundary for accounts and transactions.
//!
//! The `BankStore` trait is what the account store and the ledger talk to;
//! backends decide how atomicity and per-account serialization are achieved.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryBankStore;
pub use postgres::PostgresBankStore;
pub use r#trait::BankStore;
