//! Immutable records of balance-affecting events.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{BankError, BankResult};
use crate::id::{AccountId, TransactionId};
use crate::money::Amount;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
        }
    }

    /// Sign this kind contributes to the balance.
    pub fn signed(&self, amount: Amount) -> Decimal {
        match self {
            TransactionKind::Deposit => amount.value(),
            TransactionKind::Withdrawal => -amount.value(),
        }
    }
}

impl core::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for TransactionKind {
    type Err = BankError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(TransactionKind::Deposit),
            "withdrawal" => Ok(TransactionKind::Withdrawal),
            other => Err(BankError::invalid_input(format!(
                "unknown transaction kind '{other}'"
            ))),
        }
    }
}

/// A committed transaction. Never updated or deleted on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub account_id: AccountId,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: Amount,
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    pub fn signed_amount(&self) -> Decimal {
        self.kind.signed(self.amount)
    }
}

/// Sort transactions most recent first, newest insert first on equal timestamps.
pub fn sort_newest_first(transactions: &mut [Transaction]) {
    transactions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
}

/// Signed sum of a transaction history: deposits minus withdrawals.
///
/// Fails with `InvalidInput` if the running sum leaves the `Decimal` range.
pub fn net_total<'a>(
    transactions: impl IntoIterator<Item = &'a Transaction>,
) -> BankResult<Decimal> {
    transactions
        .into_iter()
        .try_fold(Decimal::ZERO, |total, tx| total.checked_add(tx.signed_amount()))
        .ok_or_else(|| BankError::invalid_input("history total would overflow"))
}
