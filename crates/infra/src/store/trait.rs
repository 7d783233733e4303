use std::sync::Arc;

use async_trait::async_trait;

use minibank_core::{
    Account, AccountId, AccountNumber, Amount, BankResult, NewAccount, Transaction,
    TransactionKind,
};

/// Persistence boundary for accounts and their transactions.
///
/// Two tables (accounts, transactions) related by `account_id`. Backends work
/// with in-memory implementations (tests/dev) and PostgreSQL (production).
///
/// ## Atomic units
///
/// - `insert_account` writes the account and, when the request carries an
///   opening deposit, its deposit transaction together.
/// - `apply_change` reads the balance, runs `Account::decide`, writes the new
///   balance and appends the transaction as one unit, serialized per account.
///
/// ## Uniqueness
///
/// `insert_account` must reject a taken account number at insert time with
/// `BankError::Conflict`. A separate existence check before the insert is not
/// enough under concurrent registrations.
///
/// ## Ordering
///
/// `history` and `snapshot` return transactions most recent first, newest
/// insert first on equal timestamps.
#[async_trait]
pub trait BankStore: Send + Sync {
    /// Insert a new account under `number`.
    async fn insert_account(
        &self,
        request: &NewAccount,
        number: AccountNumber,
    ) -> BankResult<Account>;

    async fn find_by_number(&self, number: AccountNumber) -> BankResult<Option<Account>>;

    async fn get_account(&self, id: AccountId) -> BankResult<Option<Account>>;

    /// Apply a deposit or withdrawal. `NotFound` for unknown accounts.
    async fn apply_change(
        &self,
        id: AccountId,
        kind: TransactionKind,
        amount: Amount,
    ) -> BankResult<(Account, Transaction)>;

    /// All transactions of an account. `NotFound` for unknown accounts.
    async fn history(&self, id: AccountId) -> BankResult<Vec<Transaction>>;

    /// Account and its history read as one consistent snapshot.
    async fn snapshot(&self, id: AccountId) -> BankResult<(Account, Vec<Transaction>)>;

    /// Delete an account together with its transactions.
    async fn delete_account(&self, id: AccountId) -> BankResult<()>;
}

#[async_trait]
impl<S> BankStore for Arc<S>
where
    S: BankStore + ?Sized,
{
    async fn insert_account(
        &self,
        request: &NewAccount,
        number: AccountNumber,
    ) -> BankResult<Account> {
        (**self).insert_account(request, number).await
    }

    async fn find_by_number(&self, number: AccountNumber) -> BankResult<Option<Account>> {
        (**self).find_by_number(number).await
    }

    async fn get_account(&self, id: AccountId) -> BankResult<Option<Account>> {
        (**self).get_account(id).await
    }

    async fn apply_change(
        &self,
        id: AccountId,
        kind: TransactionKind,
        amount: Amount,
    ) -> BankResult<(Account, Transaction)> {
        (**self).apply_change(id, kind, amount).await
    }

    async fn history(&self, id: AccountId) -> BankResult<Vec<Transaction>> {
        (**self).history(id).await
    }

    async fn snapshot(&self, id: AccountId) -> BankResult<(Account, Vec<Transaction>)> {
        (**self).snapshot(id).await
    }

    async fn delete_account(&self, id: AccountId) -> BankResult<()> {
        (**self).delete_account(id).await
    }
}
