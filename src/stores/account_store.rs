use crate::core::error::StoreError;
use crate::models::account::Account;
use crate::wal::wal::{Wal, WalOperation};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Persistent account records, addressed by name pair or by id
pub trait AccountStore: Send + Sync {
    fn get(&self, first_name: &str, last_name: &str) -> Option<Account>;

    fn get_by_id(&self, user_id: Uuid) -> Option<Account>;

    /// Create and persist an account unless the name pair is taken, in which
    /// case the existing record is returned. The flag is true if created.
    fn create_if_absent(
        &self,
        first_name: &str,
        last_name: &str,
        password: &str,
    ) -> Result<(Account, bool), StoreError>;

    /// Persist a prepared record unless its name pair is taken, in which case
    /// the existing record is returned untouched. The flag is true if inserted.
    fn insert_if_absent(&self, account: Account) -> Result<(Account, bool), StoreError>;

    fn save(&self, account: &Account) -> Result<(), StoreError>;

    fn len(&self) -> usize;

    fn create(&self, first_name: &str, last_name: &str, password: &str) -> Result<Account, StoreError> {
        self.create_if_absent(first_name, last_name, password)
            .map(|(account, _)| account)
    }

    /// Look the pair up, creating it on first use. The flag is true if created.
    fn resolve_or_create(
        &self,
        first_name: &str,
        last_name: &str,
        password: &str,
    ) -> Result<(Account, bool), StoreError> {
        match self.get(first_name, last_name) {
            Some(account) => Ok((account, false)),
            None => self.create_if_absent(first_name, last_name, password),
        }
    }
}

/// In-memory account map backed by an append-only journal
pub struct JournaledAccountStore {
    by_name: DashMap<String, Account>,
    name_by_id: DashMap<Uuid, String>,
    wal: Option<Arc<Wal>>,
}

impl JournaledAccountStore {
    pub fn new(wal: Arc<Wal>) -> Self {
        Self {
            by_name: DashMap::new(),
            name_by_id: DashMap::new(),
            wal: Some(wal),
        }
    }

    /// Store without a journal; nothing survives the process
    pub fn in_memory() -> Self {
        Self {
            by_name: DashMap::new(),
            name_by_id: DashMap::new(),
            wal: None,
        }
    }

    /// Rebuild the maps from replayed journal operations. Later records win.
    pub fn apply(&self, operations: &[WalOperation]) {
        for op in operations {
            match op {
                WalOperation::PutAccount(account) => self.insert_unlogged(account.clone()),
            }
        }
    }

    fn insert_unlogged(&self, account: Account) {
        let key = Account::name_key(&account.first_name, &account.last_name);
        self.name_by_id.insert(account.user_id, key.clone());
        self.by_name.insert(key, account);
    }

    /// Build and persist the record for `key` only if the slot is vacant
    fn insert_with(
        &self,
        key: String,
        build: impl FnOnce() -> Account,
    ) -> Result<(Account, bool), StoreError> {
        // The entry guard holds the shard lock, so a racing insert for the
        // same pair waits here and then sees the occupied entry.
        match self.by_name.entry(key.clone()) {
            Entry::Occupied(existing) => Ok((existing.get().clone(), false)),
            Entry::Vacant(slot) => {
                let account = build();
                self.journal(&account)?;
                self.name_by_id.insert(account.user_id, key);
                slot.insert(account.clone());

                tracing::info!(
                    account_id = %account.user_id,
                    name = %account.full_name(),
                    "Account created"
                );
                Ok((account, true))
            }
        }
    }

    fn journal(&self, account: &Account) -> Result<(), StoreError> {
        match &self.wal {
            Some(wal) => wal
                .log_operation(&WalOperation::PutAccount(account.clone()))
                .map_err(|e| StoreError::Journal(format!("{:#}", e))),
            None => Ok(()),
        }
    }
}

impl AccountStore for JournaledAccountStore {
    fn get(&self, first_name: &str, last_name: &str) -> Option<Account> {
        self.by_name
            .get(&Account::name_key(first_name, last_name))
            .map(|entry| entry.value().clone())
    }

    fn get_by_id(&self, user_id: Uuid) -> Option<Account> {
        let key = self.name_by_id.get(&user_id)?.value().clone();
        self.by_name.get(&key).map(|entry| entry.value().clone())
    }

    fn create_if_absent(
        &self,
        first_name: &str,
        last_name: &str,
        password: &str,
    ) -> Result<(Account, bool), StoreError> {
        self.insert_with(Account::name_key(first_name, last_name), || {
            Account::new(first_name, last_name, password)
        })
    }

    fn insert_if_absent(&self, account: Account) -> Result<(Account, bool), StoreError> {
        let key = Account::name_key(&account.first_name, &account.last_name);
        self.insert_with(key, || account)
    }

    fn save(&self, account: &Account) -> Result<(), StoreError> {
        self.journal(account)?;
        self.insert_unlogged(account.clone());
        Ok(())
    }

    fn len(&self) -> usize {
        self.by_name.len()
    }
}
