use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use minibank_core::transaction::sort_newest_first;
use minibank_core::{
    Account, AccountId, AccountNumber, Amount, BankError, BankResult, NewAccount, Transaction,
    TransactionId, TransactionKind,
};

use super::r#trait::BankStore;

/// One account row plus the transactions that reference it.
#[derive(Debug)]
struct AccountCell {
    account: Account,
    transactions: Vec<Transaction>,
    deleted: bool,
}

#[derive(Debug, Default)]
struct Tables {
    by_id: HashMap<AccountId, Arc<Mutex<AccountCell>>>,
    by_number: HashMap<AccountNumber, AccountId>,
}

/// In-memory bank store.
///
/// Intended for tests/dev. The table lock is only held for lookups and for
/// registration (number check + insert); balance changes lock the single
/// account they touch, so different accounts proceed in parallel.
#[derive(Debug)]
pub struct InMemoryBankStore {
    tables: RwLock<Tables>,
    next_account_id: AtomicI64,
    next_transaction_id: AtomicI64,
}

impl Default for InMemoryBankStore {
    fn default() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            next_account_id: AtomicI64::new(1),
            next_transaction_id: AtomicI64::new(1),
        }
    }
}

fn poisoned() -> BankError {
    BankError::storage("lock poisoned")
}

/// Wall-clock time, but never earlier than the account's latest transaction.
fn monotonic_timestamp(now: DateTime<Utc>, latest: Option<DateTime<Utc>>) -> DateTime<Utc> {
    latest.map_or(now, |latest| now.max(latest))
}

impl InMemoryBankStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn next_transaction(
        &self,
        account_id: AccountId,
        kind: TransactionKind,
        amount: Amount,
        latest: Option<DateTime<Utc>>,
    ) -> Transaction {
        Transaction {
            id: TransactionId::new(self.next_transaction_id.fetch_add(1, Ordering::SeqCst)),
            account_id,
            kind,
            amount,
            timestamp: monotonic_timestamp(Utc::now(), latest),
        }
    }

    fn cell(&self, id: AccountId) -> BankResult<Option<Arc<Mutex<AccountCell>>>> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(tables.by_id.get(&id).cloned())
    }

    fn insert_account_sync(
        &self,
        request: &NewAccount,
        number: AccountNumber,
    ) -> BankResult<Account> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        if tables.by_number.contains_key(&number) {
            return Err(BankError::conflict(format!(
                "account number {number} already exists"
            )));
        }

        let id = AccountId::new(self.next_account_id.fetch_add(1, Ordering::SeqCst));
        let account = Account {
            id,
            account_number: number,
            name: request.name().to_string(),
            password: request.password().clone(),
            balance: request.initial_deposit(),
            created_at: Utc::now(),
        };
        let transactions = request
            .opening_deposit()
            .map(|amount| vec![self.next_transaction(id, TransactionKind::Deposit, amount, None)])
            .unwrap_or_default();

        tables.by_number.insert(number, id);
        tables.by_id.insert(
            id,
            Arc::new(Mutex::new(AccountCell {
                account: account.clone(),
                transactions,
                deleted: false,
            })),
        );
        Ok(account)
    }

    fn find_by_number_sync(&self, number: AccountNumber) -> BankResult<Option<Account>> {
        let cell = {
            let tables = self.tables.read().map_err(|_| poisoned())?;
            match tables.by_number.get(&number) {
                Some(id) => tables.by_id.get(id).cloned(),
                None => None,
            }
        };
        match cell {
            Some(cell) => {
                let cell = cell.lock().map_err(|_| poisoned())?;
                Ok((!cell.deleted).then(|| cell.account.clone()))
            }
            None => Ok(None),
        }
    }

    fn get_account_sync(&self, id: AccountId) -> BankResult<Option<Account>> {
        match self.cell(id)? {
            Some(cell) => {
                let cell = cell.lock().map_err(|_| poisoned())?;
                Ok((!cell.deleted).then(|| cell.account.clone()))
            }
            None => Ok(None),
        }
    }

    fn apply_change_sync(
        &self,
        id: AccountId,
        kind: TransactionKind,
        amount: Amount,
    ) -> BankResult<(Account, Transaction)> {
        let cell = self.cell(id)?.ok_or(BankError::NotFound)?;
        // Held across read, decide, write and append.
        let mut cell = cell.lock().map_err(|_| poisoned())?;
        if cell.deleted {
            return Err(BankError::NotFound);
        }

        let change = cell.account.decide(kind, amount)?;
        let latest = cell.transactions.last().map(|tx| tx.timestamp);
        let transaction = self.next_transaction(id, kind, amount, latest);
        cell.account.apply(&change);
        cell.transactions.push(transaction.clone());
        Ok((cell.account.clone(), transaction))
    }

    fn snapshot_sync(&self, id: AccountId) -> BankResult<(Account, Vec<Transaction>)> {
        let cell = self.cell(id)?.ok_or(BankError::NotFound)?;
        let cell = cell.lock().map_err(|_| poisoned())?;
        if cell.deleted {
            return Err(BankError::NotFound);
        }
        let mut transactions = cell.transactions.clone();
        sort_newest_first(&mut transactions);
        Ok((cell.account.clone(), transactions))
    }

    fn delete_account_sync(&self, id: AccountId) -> BankResult<()> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        let cell = tables.by_id.remove(&id).ok_or(BankError::NotFound)?;
        let mut cell = cell.lock().map_err(|_| poisoned())?;
        tables.by_number.remove(&cell.account.account_number);
        cell.deleted = true;
        cell.transactions.clear();
        Ok(())
    }
}

#[async_trait]
impl BankStore for InMemoryBankStore {
    async fn insert_account(
        &self,
        request: &NewAccount,
        number: AccountNumber,
    ) -> BankResult<Account> {
        self.insert_account_sync(request, number)
    }

    async fn find_by_number(&self, number: AccountNumber) -> BankResult<Option<Account>> {
        self.find_by_number_sync(number)
    }

    async fn get_account(&self, id: AccountId) -> BankResult<Option<Account>> {
        self.get_account_sync(id)
    }

    async fn apply_change(
        &self,
        id: AccountId,
        kind: TransactionKind,
        amount: Amount,
    ) -> BankResult<(Account, Transaction)> {
        self.apply_change_sync(id, kind, amount)
    }

    async fn history(&self, id: AccountId) -> BankResult<Vec<Transaction>> {
        self.snapshot_sync(id).map(|(_, transactions)| transactions)
    }

    async fn snapshot(&self, id: AccountId) -> BankResult<(Account, Vec<Transaction>)> {
        self.snapshot_sync(id)
    }

    async fn delete_account(&self, id: AccountId) -> BankResult<()> {
        self.delete_account_sync(id)
    }
}
