use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;

use minibank_core::Account;
use minibank_infra::{AccountStore, BankConfig, Ledger, PostgresBankStore};

mod command;

use command::{Command, Credentials, USAGE};

type Store = Arc<PostgresBankStore>;

#[tokio::main]
async fn main() -> Result<()> {
    minibank_observability::init();

    let command = match Command::parse(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "invalid command line");
            eprintln!("{err:#}\n\n{USAGE}");
            std::process::exit(2);
        }
    };

    let config = BankConfig::from_env().context("invalid configuration")?;
    let pool = config.connect().await?;
    let store = Arc::new(PostgresBankStore::new(pool));
    store.migrate().await.context("failed to apply schema")?;

    let accounts = AccountStore::from_config(store.clone(), &config);
    let ledger = Ledger::new(store);

    let output = match run(command, &accounts, &ledger).await {
        Ok(output) => output,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "command failed");
            return Err(err);
        }
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run(
    command: Command,
    accounts: &AccountStore<Store>,
    ledger: &Ledger<Store>,
) -> Result<serde_json::Value> {
    let value = match command {
        Command::Register {
            name,
            password,
            initial_deposit,
        } => {
            let account = accounts
                .register(&name, &password, initial_deposit)
                .await
                .context("registration failed")?;
            serde_json::to_value(account)?
        }
        Command::Login(credentials) => serde_json::to_value(login(accounts, &credentials).await?)?,
        Command::Deposit(credentials, amount) => {
            let account = login(accounts, &credentials).await?;
            let transaction = ledger.deposit(&account, amount).await.context("deposit failed")?;
            serde_json::to_value(transaction)?
        }
        Command::Withdraw(credentials, amount) => {
            let account = login(accounts, &credentials).await?;
            let transaction = ledger
                .withdraw(&account, amount)
                .await
                .context("withdrawal failed")?;
            serde_json::to_value(transaction)?
        }
        Command::History(credentials) => {
            let account = login(accounts, &credentials).await?;
            serde_json::to_value(ledger.history(&account).await?)?
        }
        Command::Reconcile(credentials) => {
            let account = login(accounts, &credentials).await?;
            serde_json::to_value(ledger.reconcile(&account).await?)?
        }
        Command::Close(credentials) => {
            let account = login(accounts, &credentials).await?;
            accounts.close(&account).await?;
            json!({ "closed": account.account_number })
        }
    };
    Ok(value)
}

async fn login(accounts: &AccountStore<Store>, credentials: &Credentials) -> Result<Account> {
    accounts
        .authenticate(&credentials.account_number, &credentials.password)
        .await
        .context("login failed")
}
