//! Candidate account-number generation.
//!
//! A source only proposes numbers. Uniqueness is enforced by the store at
//! insert time; the account store draws again on conflict.

use std::collections::VecDeque;
use std::sync::Mutex;

use uuid::Uuid;

use crate::account::AccountNumber;

/// Proposes candidate account numbers.
pub trait AccountNumberSource: Send + Sync {
    fn next_candidate(&self) -> AccountNumber;
}

/// Uniform random draw over `100000..=999999`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomAccountNumbers;

impl RandomAccountNumbers {
    pub fn new() -> Self {
        Self
    }
}

impl AccountNumberSource for RandomAccountNumbers {
    fn next_candidate(&self) -> AccountNumber {
        let span = u128::from(AccountNumber::MAX - AccountNumber::MIN + 1);
        // v4 uuids carry 122 random bits; the modulo bias over 900k values is negligible.
        let offset = (Uuid::new_v4().as_u128() % span) as u32;
        AccountNumber::new(AccountNumber::MIN + offset)
            .unwrap_or_else(|_| unreachable!("offset is within the six-digit span"))
    }
}

/// Replays a fixed list of candidates, then repeats the last one.
///
/// Useful for forcing collisions in tests and for deterministic fixtures.
#[derive(Debug)]
pub struct ScriptedAccountNumbers {
    queue: Mutex<VecDeque<AccountNumber>>,
    last: AccountNumber,
}

impl ScriptedAccountNumbers {
    /// Panics if `numbers` is empty.
    pub fn new(numbers: impl IntoIterator<Item = AccountNumber>) -> Self {
        let queue: VecDeque<AccountNumber> = numbers.into_iter().collect();
        let last = *queue.back().expect("scripted account numbers must not be empty");
        Self {
            queue: Mutex::new(queue),
            last,
        }
    }
}

impl AccountNumberSource for ScriptedAccountNumbers {
    fn next_candidate(&self) -> AccountNumber {
        let mut queue = match self.queue.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        queue.pop_front().unwrap_or(self.last)
    }
}

impl<S> AccountNumberSource for std::sync::Arc<S>
where
    S: AccountNumberSource + ?Sized,
{
    fn next_candidate(&self) -> AccountNumber {
        (**self).next_candidate()
    }
}
