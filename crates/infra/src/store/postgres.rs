//! Postgres-backed bank store.
//!
//! Persistent storage for accounts and transactions. Atomicity, per-account
//! serialization and account-number uniqueness are all enforced by the
//! database.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `BankError` as follows:
//!
//! | SQLx Error | PostgreSQL Error Code | BankError | Scenario |
//! |------------|----------------------|-----------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | Account number already taken |
//! | Database (check constraint violation) | `23514` | `Storage` | Negative balance or non-positive amount reached the table |
//! | Database (other) | Any other | `Storage` | Other database errors |
//! | PoolClosed / PoolTimedOut | N/A | `Storage` | Pool unavailable |
//! | Other | N/A | `Storage` | Network errors, decode failures, etc. |
//!
//! ## Thread Safety
//!
//! `PostgresBankStore` is `Send + Sync` and cheap to clone; all operations go
//! through the SQLx connection pool.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction as PgTransaction};
use tracing::instrument;

use minibank_core::{
    Account, AccountId, AccountNumber, Amount, BankError, BankResult, NewAccount, Password,
    Transaction, TransactionId, TransactionKind,
};

use super::r#trait::BankStore;

/// Schema, applied statement by statement. Every statement is idempotent.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        id             BIGSERIAL PRIMARY KEY,
        account_number INTEGER NOT NULL UNIQUE
                       CHECK (account_number BETWEEN 100000 AND 999999),
        name           TEXT NOT NULL,
        password       TEXT NOT NULL,
        balance        NUMERIC NOT NULL DEFAULT 0 CHECK (balance >= 0),
        created_at     TIMESTAMPTZ NOT NULL DEFAULT clock_timestamp()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS transactions (
        id          BIGSERIAL PRIMARY KEY,
        account_id  BIGINT NOT NULL REFERENCES accounts (id) ON DELETE CASCADE,
        kind        TEXT NOT NULL CHECK (kind IN ('deposit', 'withdrawal')),
        amount      NUMERIC NOT NULL CHECK (amount > 0),
        occurred_at TIMESTAMPTZ NOT NULL DEFAULT clock_timestamp()
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS transactions_account_history
        ON transactions (account_id, occurred_at DESC, id DESC)
    "#,
];

const ACCOUNT_COLUMNS: &str = "id, account_number, name, password, balance, created_at";
const TRANSACTION_COLUMNS: &str = "id, account_id, kind, amount, occurred_at";

/// Postgres-backed store for accounts and transactions.
///
/// ## Per-account serialization
///
/// `apply_change` locks the account row with `SELECT ... FOR UPDATE` before
/// reading the balance, so two withdrawals on the same account cannot both
/// act on the same stale balance. Rows of other accounts are not touched.
///
/// ## Account-number uniqueness
///
/// `insert_account` relies on the `UNIQUE` constraint: a concurrent insert of
/// the same number fails with SQLSTATE `23505`, reported as `Conflict`.
#[derive(Debug, Clone)]
pub struct PostgresBankStore {
    pool: Arc<PgPool>,
}

impl PostgresBankStore {
    /// Create a new PostgresBankStore with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables and indexes if they do not exist.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> BankResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("migrate", e))?;
        }
        Ok(())
    }

    async fn begin(&self) -> BankResult<PgTransaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }
}

async fn insert_transaction(
    tx: &mut PgTransaction<'_, Postgres>,
    account_id: AccountId,
    kind: TransactionKind,
    amount: Amount,
) -> BankResult<Transaction> {
    let row = sqlx::query(&format!(
        "INSERT INTO transactions (account_id, kind, amount) VALUES ($1, $2, $3) RETURNING {TRANSACTION_COLUMNS}"
    ))
    .bind(account_id.get())
    .bind(kind.as_str())
    .bind(amount.value())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_transaction", e))?;

    decode_transaction(&row)
}

async fn select_transactions(
    tx: &mut PgTransaction<'_, Postgres>,
    account_id: AccountId,
) -> BankResult<Vec<Transaction>> {
    let rows = sqlx::query(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE account_id = $1 ORDER BY occurred_at DESC, id DESC"
    ))
    .bind(account_id.get())
    .fetch_all(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("select_transactions", e))?;

    rows.iter().map(decode_transaction).collect()
}

/// Load an account row under the given lock clause (`FOR UPDATE` / `FOR SHARE`).
async fn select_account_locked(
    tx: &mut PgTransaction<'_, Postgres>,
    id: AccountId,
    lock: &str,
) -> BankResult<Option<Account>> {
    let row = sqlx::query(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 {lock}"
    ))
    .bind(id.get())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("select_account", e))?;

    row.as_ref().map(decode_account).transpose()
}

#[async_trait]
impl BankStore for PostgresBankStore {
    #[instrument(skip(self, request), fields(account_number = %number))]
    async fn insert_account(
        &self,
        request: &NewAccount,
        number: AccountNumber,
    ) -> BankResult<Account> {
        let mut tx = self.begin().await?;

        let row = sqlx::query(&format!(
            "INSERT INTO accounts (account_number, name, password, balance) VALUES ($1, $2, $3, $4) RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(number.get() as i32)
        .bind(request.name())
        .bind(request.password().expose())
        .bind(request.initial_deposit())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                BankError::conflict(format!("account number {number} already exists"))
            } else {
                map_sqlx_error("insert_account", e)
            }
        })?;

        let account = decode_account(&row)?;

        if let Some(amount) = request.opening_deposit() {
            insert_transaction(&mut tx, account.id, TransactionKind::Deposit, amount).await?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(account)
    }

    #[instrument(skip(self), fields(account_number = %number), err)]
    async fn find_by_number(&self, number: AccountNumber) -> BankResult<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE account_number = $1"
        ))
        .bind(number.get() as i32)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_by_number", e))?;

        row.as_ref().map(decode_account).transpose()
    }

    #[instrument(skip(self), fields(account_id = %id), err)]
    async fn get_account(&self, id: AccountId) -> BankResult<Option<Account>> {
        let row = sqlx::query(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"))
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_account", e))?;

        row.as_ref().map(decode_account).transpose()
    }

    #[instrument(skip(self), fields(account_id = %id, kind = %kind, amount = %amount))]
    async fn apply_change(
        &self,
        id: AccountId,
        kind: TransactionKind,
        amount: Amount,
    ) -> BankResult<(Account, Transaction)> {
        let mut tx = self.begin().await?;

        // The row lock is held until commit/rollback.
        let Some(mut account) = select_account_locked(&mut tx, id, "FOR UPDATE").await? else {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(BankError::NotFound);
        };

        let change = match account.decide(kind, amount) {
            Ok(change) => change,
            Err(rejection) => {
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(rejection);
            }
        };
        account.apply(&change);

        sqlx::query("UPDATE accounts SET balance = $2 WHERE id = $1")
            .bind(id.get())
            .bind(account.balance)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_balance", e))?;

        let transaction = insert_transaction(&mut tx, id, kind, amount).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok((account, transaction))
    }

    #[instrument(skip(self), fields(account_id = %id), err)]
    async fn history(&self, id: AccountId) -> BankResult<Vec<Transaction>> {
        self.snapshot(id).await.map(|(_, transactions)| transactions)
    }

    #[instrument(skip(self), fields(account_id = %id), err)]
    async fn snapshot(&self, id: AccountId) -> BankResult<(Account, Vec<Transaction>)> {
        let mut tx = self.begin().await?;

        // FOR SHARE blocks concurrent FOR UPDATE, so balance and rows agree.
        let Some(account) = select_account_locked(&mut tx, id, "FOR SHARE").await? else {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(BankError::NotFound);
        };
        let transactions = select_transactions(&mut tx, id).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok((account, transactions))
    }

    #[instrument(skip(self), fields(account_id = %id), err)]
    async fn delete_account(&self, id: AccountId) -> BankResult<()> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(id.get())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_account", e))?;

        if result.rows_affected() == 0 {
            return Err(BankError::NotFound);
        }
        Ok(())
    }
}

/// Map SQLx errors to BankError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> BankError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => BankError::Conflict(msg),
                _ => BankError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            BankError::storage(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::PoolTimedOut => {
            BankError::storage(format!("timed out acquiring a connection in {}", operation))
        }
        _ => BankError::storage(format!("sqlx error in {}: {}", operation, err)),
    }
}

/// Check if an error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

fn decode_account(row: &PgRow) -> BankResult<Account> {
    AccountRow::from_row(row)
        .map_err(|e| map_sqlx_error("decode_account", e))?
        .try_into()
}

fn decode_transaction(row: &PgRow) -> BankResult<Transaction> {
    TransactionRow::from_row(row)
        .map_err(|e| map_sqlx_error("decode_transaction", e))?
        .try_into()
}

// SQLx row types

#[derive(Debug)]
struct AccountRow {
    id: i64,
    account_number: i32,
    name: String,
    password: String,
    balance: Decimal,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for AccountRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(AccountRow {
            id: row.try_get("id")?,
            account_number: row.try_get("account_number")?,
            name: row.try_get("name")?,
            password: row.try_get("password")?,
            balance: row.try_get("balance")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<AccountRow> for Account {
    type Error = BankError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let corrupt = |e: BankError| BankError::storage(format!("corrupt account row {}: {e}", row.id));
        let account_number = u32::try_from(row.account_number)
            .map_err(|_| BankError::invalid_input("negative account number"))
            .and_then(AccountNumber::new)
            .map_err(corrupt)?;
        let password = Password::new(row.password).map_err(corrupt)?;
        Ok(Account {
            id: AccountId::new(row.id),
            account_number,
            name: row.name,
            password,
            balance: row.balance,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug)]
struct TransactionRow {
    id: i64,
    account_id: i64,
    kind: String,
    amount: Decimal,
    occurred_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for TransactionRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(TransactionRow {
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            kind: row.try_get("kind")?,
            amount: row.try_get("amount")?,
            occurred_at: row.try_get("occurred_at")?,
        })
    }
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = BankError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(Transaction {
            id: TransactionId::new(row.id),
            account_id: AccountId::new(row.account_id),
            kind: row
                .kind
                .parse()
                .map_err(|e| BankError::storage(format!("corrupt transaction row {}: {e}", row.id)))?,
            amount: Amount::new(row.amount)
                .map_err(|e| BankError::storage(format!("corrupt transaction row {}: {e}", row.id)))?,
            timestamp: row.occurred_at,
        })
    }
}
