//! Integration tests for the account store and ledger over the in-memory store.
//!
//! Verifies:
//! - Registration, authentication and lookups
//! - Balance changes are atomic with their transaction records
//! - History ordering
//! - Concurrent withdrawals cannot overdraw
//! - Concurrent registrations never share an account number

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use minibank_core::{
        Account, AccountNumber, BankError, ScriptedAccountNumbers, TransactionKind,
    };

    use crate::accounts::AccountStore;
    use crate::ledger::Ledger;
    use crate::store::{BankStore, InMemoryBankStore};

    type Store = Arc<InMemoryBankStore>;

    fn setup() -> (AccountStore<Store>, Ledger<Store>) {
        let store = InMemoryBankStore::arc();
        (AccountStore::new(store.clone()), Ledger::new(store))
    }

    fn number(value: u32) -> AccountNumber {
        AccountNumber::new(value).unwrap()
    }

    async fn balance_of(accounts: &AccountStore<Store>, account: &Account) -> Decimal {
        accounts.get_by_id(account.id).await.unwrap().balance
    }

    #[tokio::test]
    async fn negative_initial_deposit_creates_nothing() {
        let store = InMemoryBankStore::arc();
        let accounts = AccountStore::new(store.clone())
            .with_number_source(ScriptedAccountNumbers::new([number(123_456)]));

        let err = accounts.register("Ada", "pw", dec!(-1)).await.unwrap_err();
        assert!(matches!(err, BankError::InvalidInput(_)));
        assert_eq!(store.find_by_number(number(123_456)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn register_with_initial_deposit() {
        let (accounts, ledger) = setup();
        let account = accounts.register("Ada", "pw", dec!(100)).await.unwrap();

        assert_eq!(account.balance, dec!(100));
        assert_eq!(account.name, "Ada");
        let number = account.account_number.get();
        assert!((100_000..=999_999).contains(&number));

        let history = ledger.history(&account).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, TransactionKind::Deposit);
        assert_eq!(history[0].amount.value(), dec!(100));
        assert_eq!(history[0].account_id, account.id);
    }

    #[tokio::test]
    async fn register_without_initial_deposit_has_empty_history() {
        let (accounts, ledger) = setup();
        let account = accounts.register("Ada", "pw", dec!(0)).await.unwrap();
        assert_eq!(account.balance, Decimal::ZERO);
        assert!(ledger.history(&account).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deposit_appends_one_transaction() {
        let (accounts, ledger) = setup();
        let account = accounts.register("Ada", "pw", dec!(100)).await.unwrap();

        let tx = ledger.deposit(&account, dec!(50)).await.unwrap();
        assert_eq!(tx.kind, TransactionKind::Deposit);
        assert_eq!(tx.amount.value(), dec!(50));
        assert_eq!(balance_of(&accounts, &account).await, dec!(150));
        assert_eq!(ledger.history(&account).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn overdraw_is_rejected_without_side_effects() {
        let (accounts, ledger) = setup();
        let account = accounts.register("Ada", "pw", dec!(100)).await.unwrap();
        ledger.deposit(&account, dec!(50)).await.unwrap();

        let err = ledger.withdraw(&account, dec!(200)).await.unwrap_err();
        assert_eq!(
            err,
            BankError::InsufficientFunds {
                available: dec!(150),
                requested: dec!(200),
            }
        );
        assert_eq!(balance_of(&accounts, &account).await, dec!(150));
        assert_eq!(ledger.history(&account).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn non_positive_amounts_are_invalid() {
        let (accounts, ledger) = setup();
        let account = accounts.register("Ada", "pw", dec!(10)).await.unwrap();

        for amount in [dec!(0), dec!(-5)] {
            assert!(matches!(
                ledger.deposit(&account, amount).await,
                Err(BankError::InvalidInput(_))
            ));
            assert!(matches!(
                ledger.withdraw(&account, amount).await,
                Err(BankError::InvalidInput(_))
            ));
        }
        assert_eq!(ledger.history(&account).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stale_account_copy_does_not_bypass_the_balance_check() {
        let (accounts, ledger) = setup();
        let stale = accounts.register("Ada", "pw", dec!(100)).await.unwrap();
        ledger.withdraw(&stale, dec!(80)).await.unwrap();

        // `stale.balance` still says 100.
        let err = ledger.withdraw(&stale, dec!(80)).await.unwrap_err();
        assert!(matches!(err, BankError::InsufficientFunds { .. }));
        assert_eq!(balance_of(&accounts, &stale).await, dec!(20));
    }

    #[tokio::test]
    async fn history_is_most_recent_first() {
        let (accounts, ledger) = setup();
        let account = accounts.register("Ada", "pw", dec!(0)).await.unwrap();

        ledger.deposit(&account, dec!(10)).await.unwrap();
        ledger.withdraw(&account, dec!(3)).await.unwrap();
        ledger.deposit(&account, dec!(5)).await.unwrap();

        let history: Vec<(TransactionKind, Decimal)> = ledger
            .history(&account)
            .await
            .unwrap()
            .into_iter()
            .map(|tx| (tx.kind, tx.amount.value()))
            .collect();
        assert_eq!(
            history,
            vec![
                (TransactionKind::Deposit, dec!(5)),
                (TransactionKind::Withdrawal, dec!(3)),
                (TransactionKind::Deposit, dec!(10)),
            ]
        );
        assert_eq!(balance_of(&accounts, &account).await, dec!(12));
    }

    #[tokio::test]
    async fn balance_always_matches_history() {
        let (accounts, ledger) = setup();
        let account = accounts.register("Ada", "pw", dec!(25)).await.unwrap();

        // (deposit?, amount, accepted?)
        let steps = [
            (true, dec!(10.10), true),
            (false, dec!(30), true),
            (false, dec!(100), false),
            (true, dec!(0.05), true),
            (false, dec!(5.15), true),
        ];
        for (is_deposit, amount, accepted) in steps {
            let result = if is_deposit {
                ledger.deposit(&account, amount).await
            } else {
                ledger.withdraw(&account, amount).await
            };
            if accepted {
                assert!(result.is_ok(), "{amount}: {result:?}");
            } else {
                assert!(
                    matches!(result, Err(BankError::InsufficientFunds { .. })),
                    "{amount}: {result:?}"
                );
            }
            let rec = ledger.reconcile(&account).await.unwrap();
            assert!(rec.is_consistent(), "{rec:?}");
        }

        // Opening deposit plus four accepted changes.
        let rec = ledger.reconcile(&account).await.unwrap();
        assert_eq!(rec.balance, dec!(0));
        assert_eq!(rec.history_total, dec!(0));
        assert_eq!(rec.transaction_count, 5);
    }

    #[tokio::test]
    async fn overflowing_deposit_is_rejected_and_account_stays_usable() {
        let (accounts, ledger) = setup();
        let account = accounts.register("Ada", "pw", Decimal::MAX).await.unwrap();

        let err = ledger.deposit(&account, dec!(1)).await.unwrap_err();
        assert!(matches!(err, BankError::InvalidInput(msg) if msg.contains("overflow")));
        assert_eq!(balance_of(&accounts, &account).await, Decimal::MAX);

        ledger.withdraw(&account, dec!(1)).await.unwrap();
        ledger.deposit(&account, dec!(1)).await.unwrap();
        assert_eq!(balance_of(&accounts, &account).await, Decimal::MAX);
        assert_eq!(ledger.history(&account).await.unwrap().len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_withdrawals_cannot_overdraw() {
        let (accounts, ledger) = setup();
        let ledger = Arc::new(ledger);
        let account = accounts.register("Ada", "pw", dec!(100)).await.unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let ledger = ledger.clone();
                let account = account.clone();
                tokio::spawn(async move { ledger.withdraw(&account, dec!(100)).await })
            })
            .collect();

        let mut succeeded = 0;
        let mut insufficient = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(BankError::InsufficientFunds { .. }) => insufficient += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(succeeded, 1);
        assert_eq!(insufficient, 15);
        assert_eq!(balance_of(&accounts, &account).await, Decimal::ZERO);
        assert_eq!(ledger.history(&account).await.unwrap().len(), 2);
        assert!(ledger.reconcile(&account).await.unwrap().is_consistent());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_deposits_are_all_applied() {
        let (accounts, ledger) = setup();
        let ledger = Arc::new(ledger);
        let account = accounts.register("Ada", "pw", dec!(0)).await.unwrap();

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let ledger = ledger.clone();
                let account = account.clone();
                tokio::spawn(async move { ledger.deposit(&account, dec!(1.01)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(balance_of(&accounts, &account).await, dec!(50.50));
        assert_eq!(ledger.history(&account).await.unwrap().len(), 50);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_registrations_get_distinct_numbers() {
        let store = InMemoryBankStore::arc();
        // Every registration first draws the same number; losers fall through
        // to the distinct ones.
        let script: Vec<AccountNumber> = std::iter::repeat(number(111_111))
            .take(8)
            .chain((1..=8).map(|i| number(200_000 + i)))
            .collect();
        let accounts = Arc::new(
            AccountStore::new(store.clone()).with_number_source(ScriptedAccountNumbers::new(script)),
        );

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let accounts = accounts.clone();
                tokio::spawn(async move {
                    accounts
                        .register(&format!("user-{i}"), "pw", dec!(1))
                        .await
                })
            })
            .collect();

        let mut numbers = HashSet::new();
        for handle in handles {
            let account = handle.await.unwrap().unwrap();
            assert!(numbers.insert(account.account_number));
        }
        assert_eq!(numbers.len(), 8);
        assert!(numbers.contains(&number(111_111)));
    }

    #[tokio::test]
    async fn exhausted_number_draws_surface_as_storage_error() {
        let store = InMemoryBankStore::arc();
        let accounts = AccountStore::new(store)
            .with_number_source(ScriptedAccountNumbers::new([number(111_111)]))
            .with_max_attempts(3);

        accounts.register("Ada", "pw", dec!(0)).await.unwrap();
        let err = accounts.register("Bob", "pw", dec!(0)).await.unwrap_err();
        assert!(matches!(err, BankError::Storage(msg) if msg.contains("after 3 attempts")));
    }

    #[tokio::test]
    async fn authentication_failures_are_indistinguishable() {
        let (accounts, _) = setup();
        let account = accounts.register("Ada", "s3cret", dec!(0)).await.unwrap();
        let number = account.account_number.to_string();

        let ok = accounts.authenticate(&number, "s3cret").await.unwrap();
        assert_eq!(ok.id, account.id);

        let unused = if account.account_number.get() == 999_999 { "100000" } else { "999999" };
        let wrong_password = accounts.authenticate(&number, "nope").await.unwrap_err();
        let unknown_number = accounts.authenticate(unused, "s3cret").await.unwrap_err();
        let malformed = accounts.authenticate("12ab", "s3cret").await.unwrap_err();

        assert_eq!(wrong_password, BankError::AuthFailure);
        assert_eq!(unknown_number, BankError::AuthFailure);
        assert_eq!(malformed, BankError::AuthFailure);
    }

    #[tokio::test]
    async fn get_by_id_and_close() {
        let (accounts, ledger) = setup();
        let account = accounts.register("Ada", "pw", dec!(10)).await.unwrap();
        ledger.deposit(&account, dec!(5)).await.unwrap();

        assert_eq!(accounts.get_by_id(account.id).await.unwrap(), {
            let mut expected = account.clone();
            expected.balance = dec!(15);
            expected
        });

        accounts.close(&account).await.unwrap();
        assert_eq!(accounts.get_by_id(account.id).await.unwrap_err(), BankError::NotFound);
        assert_eq!(ledger.history(&account).await.unwrap_err(), BankError::NotFound);
        assert_eq!(
            ledger.deposit(&account, dec!(1)).await.unwrap_err(),
            BankError::NotFound
        );
    }
}
