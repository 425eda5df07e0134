use std::{collections::HashMap, num::NonZeroU64, path::Path, sync::Arc};

use tokio::sync::Mutex;

pub mod store;

use store::{AccountRecord, Document, LoadError, PersistError, Store};

/// A point-in-time copy of an account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub password: String,
    pub balance: u64,
}

impl From<AccountRecord> for Account {
    fn from(value: AccountRecord) -> Self {
        Self {
            password: value.password,
            balance: value.balance,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum WithdrawError {
    #[error("no such account")]
    NotFound,

    #[error("insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: u64, requested: u64 },

    #[error("failed to persist the ledger: {0}")]
    Persistence(#[from] PersistError),
}

/// The process-wide ledger.
///
/// Every account sits behind its own lock, so operations on one account run
/// one at a time while other accounts are left alone. The set of accounts is
/// fixed once loaded.
#[derive(Debug)]
pub struct Ledger {
    accounts: HashMap<String, Mutex<Account>>,
    store: Store,
}

pub type SharedLedger = Arc<Ledger>;

impl Ledger {
    /// Loads the ledger persisted at `path`
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let store = Store::load(path.as_ref()).await?;
        let document = store.snapshot().await;

        Ok(Self::from_parts(document, store))
    }

    /// Creates a ledger out of an in-memory document that will be persisted at `path`
    #[cfg(test)]
    pub fn with_accounts(path: impl AsRef<Path>, document: Document) -> Self {
        let store = Store::new(path.as_ref(), document.clone());
        Self::from_parts(document, store)
    }

    fn from_parts(document: Document, store: Store) -> Self {
        let accounts = document
            .into_iter()
            .map(|(id, record)| (id, Mutex::new(record.into())))
            .collect();

        Self { accounts, store }
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }

    pub async fn lookup(&self, id: &str) -> Option<Account> {
        let account = self.accounts.get(id)?;
        let snapshot = account.lock().await.clone();
        Some(snapshot)
    }

    /// Checks `password` against the stored one, an unknown account never matches
    pub async fn verify_credential(&self, id: &str, password: &str) -> bool {
        match self.lookup(id).await {
            Some(account) => account.password == password,
            None => false,
        }
    }

    /// Withdraws `amount` from the account, returning the new balance.
    ///
    /// The check, the durable write and the in-memory update happen while the
    /// account lock is held, the in-memory balance only changes once the new
    /// ledger is safely on disk.
    pub async fn withdraw(&self, id: &str, amount: NonZeroU64) -> Result<u64, WithdrawError> {
        let account = self.accounts.get(id).ok_or(WithdrawError::NotFound)?;
        let mut account = account.lock().await;

        let balance = account.balance.checked_sub(amount.get()).ok_or(
            WithdrawError::InsufficientFunds {
                balance: account.balance,
                requested: amount.get(),
            },
        )?;

        self.store.commit_balance(id, balance).await?;
        account.balance = balance;

        Ok(balance)
    }
}
