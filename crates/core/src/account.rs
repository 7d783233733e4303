//! Account entity and the balance rule.
//!
//! The balance rule is split the usual way:
//!
//! - **Decision**: `Account::decide` checks a requested change against the
//!   current balance and returns a `BalanceChange` (or a rejection).
//! - **State mutation**: `Account::apply` evolves the balance from a change.
//!
//! Stores call both inside their atomic unit, so the check always sees the
//! balance that the write will replace.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{BankError, BankResult};
use crate::id::AccountId;
use crate::money::Amount;
use crate::transaction::TransactionKind;

/// Externally facing six-digit account number.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct AccountNumber(u32);

impl AccountNumber {
    pub const MIN: u32 = 100_000;
    pub const MAX: u32 = 999_999;

    pub fn new(value: u32) -> BankResult<Self> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(BankError::invalid_input(format!(
                "account number must have six digits, got {value}"
            )))
        }
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for AccountNumber {
    type Error = BankError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AccountNumber> for u32 {
    fn from(value: AccountNumber) -> Self {
        value.0
    }
}

impl core::fmt::Display for AccountNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for AccountNumber {
    type Err = BankError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .trim()
            .parse::<u32>()
            .map_err(|e| BankError::invalid_input(format!("account number: {e}")))?;
        Self::new(value)
    }
}

/// Opaque credential.
///
/// Stored and compared as-is (hashing is out of scope), but only through
/// `verify`, so a real scheme can replace it without touching callers.
#[derive(Clone, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    pub fn new(value: impl Into<String>) -> BankResult<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(BankError::invalid_input("password must not be empty"));
        }
        Ok(Self(value))
    }

    /// Constant-time comparison against a presented credential.
    pub fn verify(&self, candidate: &str) -> bool {
        let stored = self.0.as_bytes();
        let candidate = candidate.as_bytes();
        if stored.len() != candidate.len() {
            return false;
        }
        stored
            .iter()
            .zip(candidate)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }

    /// Raw value, for persisting only.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Debug for Password {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Validated registration request.
#[derive(Debug, Clone)]
pub struct NewAccount {
    name: String,
    password: Password,
    initial_deposit: Decimal,
}

impl NewAccount {
    pub fn new(
        name: impl Into<String>,
        password: impl Into<String>,
        initial_deposit: Decimal,
    ) -> BankResult<Self> {
        if initial_deposit < Decimal::ZERO {
            return Err(BankError::invalid_input(format!(
                "initial deposit cannot be negative, got {initial_deposit}"
            )));
        }
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(BankError::invalid_input("name must not be empty"));
        }
        Ok(Self {
            name,
            password: Password::new(password)?,
            initial_deposit,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn password(&self) -> &Password {
        &self.password
    }

    pub fn initial_deposit(&self) -> Decimal {
        self.initial_deposit
    }

    /// The deposit transaction to record alongside the account, if any.
    pub fn opening_deposit(&self) -> Option<Amount> {
        Amount::new(self.initial_deposit).ok()
    }
}

/// A persisted account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub id: AccountId,
    pub account_number: AccountNumber,
    pub name: String,
    #[serde(skip)]
    pub password: Password,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Outcome of an accepted balance decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceChange {
    pub kind: TransactionKind,
    pub amount: Amount,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
}

impl Account {
    /// Decide whether `kind` of `amount` may be applied to the current balance.
    ///
    /// Does not mutate; the caller applies the returned change.
    pub fn decide(&self, kind: TransactionKind, amount: Amount) -> BankResult<BalanceChange> {
        if kind == TransactionKind::Withdrawal && amount.value() > self.balance {
            return Err(BankError::InsufficientFunds {
                available: self.balance,
                requested: amount.value(),
            });
        }
        let balance_after = self
            .balance
            .checked_add(kind.signed(amount))
            .ok_or_else(|| BankError::invalid_input("balance would overflow"))?;
        Ok(BalanceChange {
            kind,
            amount,
            balance_before: self.balance,
            balance_after,
        })
    }

    pub fn apply(&mut self, change: &BalanceChange) {
        self.balance = change.balance_after;
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    use super::*;

    fn account(balance: Decimal) -> Account {
        Account {
            id: AccountId::new(1),
            account_number: AccountNumber::new(123_456).unwrap(),
            name: "Ada".to_string(),
            password: Password::new("secret").unwrap(),
            balance,
            created_at: Utc.timestamp_opt(0, 0).unwrap(),
        }
    }

    fn amount(value: Decimal) -> Amount {
        Amount::new(value).unwrap()
    }

    #[test]
    fn account_number_range() {
        assert!(AccountNumber::new(100_000).is_ok());
        assert!(AccountNumber::new(999_999).is_ok());
        assert!(AccountNumber::new(99_999).is_err());
        assert!(AccountNumber::new(1_000_000).is_err());
        assert_eq!("654321".parse::<AccountNumber>().unwrap().get(), 654_321);
        assert!("12a456".parse::<AccountNumber>().is_err());
    }

    #[test]
    fn password_verification_and_redaction() {
        let pw = Password::new("hunter2").unwrap();
        assert!(pw.verify("hunter2"));
        assert!(!pw.verify("hunter3"));
        assert!(!pw.verify("hunter"));
        assert!(!pw.verify(""));
        assert_eq!(format!("{pw:?}"), "Password(***)");
        assert!(Password::new("").is_err());
    }

    #[test]
    fn new_account_validation() {
        let err = NewAccount::new("Ada", "pw", dec!(-1)).unwrap_err();
        assert!(matches!(err, BankError::InvalidInput(_)));
        assert!(NewAccount::new("   ", "pw", dec!(0)).is_err());
        assert!(NewAccount::new("Ada", "", dec!(0)).is_err());

        let req = NewAccount::new("  Ada ", "pw", dec!(0)).unwrap();
        assert_eq!(req.name(), "Ada");
        assert_eq!(req.opening_deposit(), None);

        let req = NewAccount::new("Ada", "pw", dec!(100)).unwrap();
        assert_eq!(req.opening_deposit(), Some(amount(dec!(100))));
    }

    #[test]
    fn deposit_decision() {
        let mut acc = account(dec!(100));
        let change = acc.decide(TransactionKind::Deposit, amount(dec!(50))).unwrap();
        assert_eq!(change.balance_before, dec!(100));
        assert_eq!(change.balance_after, dec!(150));
        acc.apply(&change);
        assert_eq!(acc.balance, dec!(150));
    }

    #[test]
    fn withdrawal_over_balance_is_rejected() {
        let acc = account(dec!(150));
        let err = acc
            .decide(TransactionKind::Withdrawal, amount(dec!(200)))
            .unwrap_err();
        assert_eq!(
            err,
            BankError::InsufficientFunds {
                available: dec!(150),
                requested: dec!(200),
            }
        );
        assert_eq!(acc.balance, dec!(150));
    }

    #[test]
    fn withdrawal_of_exact_balance_leaves_zero() {
        let mut acc = account(dec!(42.42));
        let change = acc
            .decide(TransactionKind::Withdrawal, amount(dec!(42.42)))
            .unwrap();
        acc.apply(&change);
        assert_eq!(acc.balance, Decimal::ZERO);
    }

    #[test]
    fn deposit_past_decimal_max_is_rejected() {
        let acc = account(Decimal::MAX);
        let err = acc
            .decide(TransactionKind::Deposit, amount(dec!(1)))
            .unwrap_err();
        assert_eq!(err, BankError::invalid_input("balance would overflow"));
        assert_eq!(acc.balance, Decimal::MAX);

        let change = acc
            .decide(TransactionKind::Withdrawal, amount(dec!(1)))
            .unwrap();
        assert_eq!(change.balance_after, Decimal::MAX - dec!(1));
    }

    #[test]
    fn serialization_skips_password() {
        let json = serde_json::to_value(account(dec!(1))).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["account_number"], 123_456);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: whatever sequence of requests arrives, the balance never
        /// goes negative and always equals the signed sum of accepted changes.
        #[test]
        fn balance_tracks_accepted_changes(
            requests in prop::collection::vec((any::<bool>(), 1i64..100_000i64), 1..50)
        ) {
            let mut acc = account(Decimal::ZERO);
            let mut net = Decimal::ZERO;

            for (is_deposit, cents) in requests {
                let kind = if is_deposit { TransactionKind::Deposit } else { TransactionKind::Withdrawal };
                let requested = amount(Decimal::new(cents, 2));
                if let Ok(change) = acc.decide(kind, requested) {
                    acc.apply(&change);
                    net += kind.signed(requested);
                }
                prop_assert!(acc.balance >= Decimal::ZERO);
                prop_assert_eq!(acc.balance, net);
            }
        }
    }
}
