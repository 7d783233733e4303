//! Command-line parsing.

use anyhow::{Context, Result, bail};
use rust_decimal::Decimal;

pub const USAGE: &str = "\
usage:
  minibank register <name> <password> [initial_deposit]
  minibank login     <account_number> <password>
  minibank deposit   <account_number> <password> <amount>
  minibank withdraw  <account_number> <password> <amount>
  minibank history   <account_number> <password>
  minibank reconcile <account_number> <password>
  minibank close     <account_number> <password>";

/// Account number and password, checked before any other work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub account_number: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Register {
        name: String,
        password: String,
        initial_deposit: Decimal,
    },
    Login(Credentials),
    Deposit(Credentials, Decimal),
    Withdraw(Credentials, Decimal),
    History(Credentials),
    Reconcile(Credentials),
    Close(Credentials),
}

impl Command {
    /// Parse the arguments after the program name.
    pub fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        let name = args.next().context("missing command")?;
        let rest: Vec<String> = args.collect();

        let command = match name.as_str() {
            "register" => match rest.as_slice() {
                [name, password] => Command::Register {
                    name: name.clone(),
                    password: password.clone(),
                    initial_deposit: Decimal::ZERO,
                },
                [name, password, deposit] => Command::Register {
                    name: name.clone(),
                    password: password.clone(),
                    initial_deposit: parse_amount(deposit)?,
                },
                _ => bail!("register takes <name> <password> [initial_deposit]"),
            },
            "deposit" | "withdraw" => {
                let [number, password, amount] = rest.as_slice() else {
                    bail!("{name} takes <account_number> <password> <amount>");
                };
                let credentials = credentials(number, password);
                let amount = parse_amount(amount)?;
                if name == "deposit" {
                    Command::Deposit(credentials, amount)
                } else {
                    Command::Withdraw(credentials, amount)
                }
            }
            "login" | "history" | "reconcile" | "close" => {
                let [number, password] = rest.as_slice() else {
                    bail!("{name} takes <account_number> <password>");
                };
                let credentials = credentials(number, password);
                match name.as_str() {
                    "login" => Command::Login(credentials),
                    "history" => Command::History(credentials),
                    "reconcile" => Command::Reconcile(credentials),
                    _ => Command::Close(credentials),
                }
            }
            other => bail!("unknown command `{other}`"),
        };
        Ok(command)
    }
}

fn credentials(number: &str, password: &str) -> Credentials {
    Credentials {
        account_number: number.to_string(),
        password: password.to_string(),
    }
}

/// Sign is left to the ledger; this only checks the text is a decimal.
fn parse_amount(raw: &str) -> Result<Decimal> {
    raw.trim()
        .parse::<Decimal>()
        .with_context(|| format!("`{raw}` is not a decimal amount"))
}
