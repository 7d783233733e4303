//! Balance mutations and transaction history.
//!
//! The `Ledger` never trusts the balance on the `Account` a caller hands in;
//! that value only identifies the account. Every check runs against the
//! balance the store reads inside its own atomic unit.

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, instrument};

use minibank_core::transaction::net_total;
use minibank_core::{
    Account, AccountId, Amount, BankError, BankResult, Transaction, TransactionKind,
};

use crate::store::BankStore;

pub struct Ledger<S> {
    store: S,
}

/// Stored balance next to the balance implied by the history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub account_id: AccountId,
    pub balance: Decimal,
    pub history_total: Decimal,
    pub transaction_count: usize,
}

impl Reconciliation {
    pub fn is_consistent(&self) -> bool {
        self.balance == self.history_total
    }
}

impl<S> Ledger<S>
where
    S: BankStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[instrument(skip(self, account), fields(account_id = %account.id))]
    pub async fn deposit(&self, account: &Account, amount: Decimal) -> BankResult<Transaction> {
        self.change(account, TransactionKind::Deposit, amount).await
    }

    #[instrument(skip(self, account), fields(account_id = %account.id))]
    pub async fn withdraw(&self, account: &Account, amount: Decimal) -> BankResult<Transaction> {
        self.change(account, TransactionKind::Withdrawal, amount).await
    }

    /// All transactions of the account, most recent first.
    #[instrument(skip(self, account), fields(account_id = %account.id))]
    pub async fn history(&self, account: &Account) -> BankResult<Vec<Transaction>> {
        self.store.history(account.id).await
    }

    /// Compare the stored balance with the signed sum of the history.
    #[instrument(skip(self, account), fields(account_id = %account.id))]
    pub async fn reconcile(&self, account: &Account) -> BankResult<Reconciliation> {
        let (current, transactions) = self.store.snapshot(account.id).await?;
        let reconciliation = Reconciliation {
            account_id: current.id,
            balance: current.balance,
            history_total: net_total(&transactions)?,
            transaction_count: transactions.len(),
        };
        if !reconciliation.is_consistent() {
            tracing::error!(
                balance = %reconciliation.balance,
                history_total = %reconciliation.history_total,
                "balance does not match transaction history"
            );
        }
        Ok(reconciliation)
    }

    async fn change(
        &self,
        account: &Account,
        kind: TransactionKind,
        amount: Decimal,
    ) -> BankResult<Transaction> {
        let amount = Amount::new(amount)?;
        match self.store.apply_change(account.id, kind, amount).await {
            Ok((updated, transaction)) => {
                info!(
                    kind = %kind,
                    amount = %amount,
                    balance = %updated.balance,
                    transaction_id = %transaction.id,
                    "balance changed"
                );
                Ok(transaction)
            }
            Err(err @ BankError::InsufficientFunds { .. }) => {
                debug!(kind = %kind, amount = %amount, "{err}");
                Err(err)
            }
            Err(err) => Err(err),
        }
    }
}
