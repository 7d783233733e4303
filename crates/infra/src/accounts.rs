//! Account identity and credentials.
//!
//! `AccountStore` registers accounts, authenticates them and looks them up.
//! Account numbers are drawn from an `AccountNumberSource` and committed by
//! the backing `BankStore`, whose insert-time uniqueness check is the only
//! thing trusted to keep numbers unique; a `Conflict` just means "draw again".

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};

use minibank_core::{
    Account, AccountId, AccountNumber, AccountNumberSource, BankError, BankResult, NewAccount,
    RandomAccountNumbers,
};

use crate::config::{BankConfig, DEFAULT_ACCOUNT_NUMBER_ATTEMPTS};
use crate::store::BankStore;

pub struct AccountStore<S> {
    store: S,
    numbers: Arc<dyn AccountNumberSource>,
    max_attempts: u32,
}

impl<S> AccountStore<S>
where
    S: BankStore,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            numbers: Arc::new(RandomAccountNumbers::new()),
            max_attempts: DEFAULT_ACCOUNT_NUMBER_ATTEMPTS,
        }
    }

    pub fn from_config(store: S, config: &BankConfig) -> Self {
        Self::new(store).with_max_attempts(config.account_number_attempts)
    }

    pub fn with_number_source(mut self, numbers: impl AccountNumberSource + 'static) -> Self {
        self.numbers = Arc::new(numbers);
        self
    }

    /// At least one attempt is always made.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Register a new account with a fresh six-digit number.
    ///
    /// A positive `initial_deposit` is recorded as a deposit transaction in
    /// the same unit of work as the account itself.
    #[instrument(skip(self, password), fields(account_number))]
    pub async fn register(
        &self,
        name: &str,
        password: &str,
        initial_deposit: Decimal,
    ) -> BankResult<Account> {
        let request = NewAccount::new(name, password, initial_deposit)?;

        for attempt in 1..=self.max_attempts {
            let candidate = self.numbers.next_candidate();
            match self.store.insert_account(&request, candidate).await {
                Ok(account) => {
                    tracing::Span::current().record("account_number", account.account_number.get());
                    info!(
                        account_id = %account.id,
                        balance = %account.balance,
                        attempt,
                        "account registered"
                    );
                    return Ok(account);
                }
                Err(err) if err.is_retryable() => {
                    debug!(attempt, candidate = %candidate, "account number taken, drawing again");
                }
                Err(err) => return Err(err),
            }
        }

        warn!(attempts = self.max_attempts, "no free account number found");
        Err(BankError::storage(format!(
            "could not allocate a unique account number after {} attempts",
            self.max_attempts
        )))
    }

    /// Check credentials.
    ///
    /// Unknown numbers, malformed numbers and wrong passwords all produce the
    /// same `AuthFailure`.
    #[instrument(skip(self, password))]
    pub async fn authenticate(&self, account_number: &str, password: &str) -> BankResult<Account> {
        let Ok(number) = account_number.parse::<AccountNumber>() else {
            debug!("authentication failed");
            return Err(BankError::AuthFailure);
        };

        match self.store.find_by_number(number).await? {
            Some(account) if account.password.verify(password) => {
                debug!(account_id = %account.id, "authenticated");
                Ok(account)
            }
            _ => {
                debug!("authentication failed");
                Err(BankError::AuthFailure)
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: AccountId) -> BankResult<Account> {
        self.store.get_account(id).await?.ok_or(BankError::NotFound)
    }

    /// Delete an account together with its transaction history.
    #[instrument(skip(self, account), fields(account_id = %account.id))]
    pub async fn close(&self, account: &Account) -> BankResult<()> {
        self.store.delete_account(account.id).await?;
        info!("account closed");
        Ok(())
    }
}
