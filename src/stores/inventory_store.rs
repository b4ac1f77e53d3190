use crate::core::error::StoreError;
use crate::models::account::Account;
use crate::models::inventory::{InventoryTree, TreeSnapshot};
use crate::stores::account_store::AccountStore;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

pub const PERSONAL_ROOT_NAME: &str = "Inventory";
pub const LIBRARY_ROOT_NAME: &str = "Library";

pub const LIBRARIAN_FIRST_NAME: &str = "Librarian";
pub const LIBRARIAN_LAST_NAME: &str = "Reaper";
pub const LIBRARIAN_LEVEL: i32 = 250;
pub const LIBRARIAN_TITLE: &str = "Librarian of the Reapers";

/// Loads, bootstraps and persists folder trees, one JSON file per owner
pub struct InventoryTreeService {
    dir: PathBuf,
    cache: DashMap<Uuid, Arc<InventoryTree>>,
    /// Serializes check-then-create for every owner's tree
    bootstrap_lock: Mutex<()>,
    /// Library account id once resolved
    library: Mutex<Option<Uuid>>,
}

impl InventoryTreeService {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            dir: data_dir.join("inventory"),
            cache: DashMap::new(),
            bootstrap_lock: Mutex::new(()),
            library: Mutex::new(None),
        }
    }

    fn tree_path(&self, owner_id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", owner_id))
    }

    fn lock_bootstrap(&self) -> MutexGuard<'_, ()> {
        self.bootstrap_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The owner's tree, read from disk or created with the system folders
    pub fn load_or_bootstrap(
        &self,
        owner_id: Uuid,
        root_name: &str,
    ) -> Result<Arc<InventoryTree>, StoreError> {
        if let Some(tree) = self.cache.get(&owner_id) {
            return Ok(Arc::clone(tree.value()));
        }

        let _guard = self.lock_bootstrap();

        // Another caller may have finished while we waited
        if let Some(tree) = self.cache.get(&owner_id) {
            return Ok(Arc::clone(tree.value()));
        }

        let path = self.tree_path(owner_id);
        let tree = if path.exists() {
            let tree = read_tree(&path)?;
            if tree.owner_id() != owner_id {
                return Err(StoreError::Corrupt {
                    path: path.display().to_string(),
                    reason: format!("tree belongs to {}", tree.owner_id()),
                });
            }
            debug!(owner_id = %owner_id, folders = tree.len(), "Inventory tree loaded");
            tree
        } else {
            let tree = InventoryTree::bootstrap(owner_id, root_name);
            write_tree(&path, &tree)?;
            info!(owner_id = %owner_id, folders = tree.len(), "Inventory tree bootstrapped");
            tree
        };

        let tree = Arc::new(tree);
        self.cache.insert(owner_id, Arc::clone(&tree));
        Ok(tree)
    }

    pub fn personal_tree(&self, account: &Account) -> Result<Arc<InventoryTree>, StoreError> {
        self.load_or_bootstrap(account.user_id, PERSONAL_ROOT_NAME)
    }

    /// Replace an owner's tree on disk and in the cache
    pub fn save(&self, tree: InventoryTree) -> Result<Arc<InventoryTree>, StoreError> {
        let _guard = self.lock_bootstrap();

        write_tree(&self.tree_path(tree.owner_id()), &tree)?;
        let tree = Arc::new(tree);
        self.cache.insert(tree.owner_id(), Arc::clone(&tree));
        Ok(tree)
    }

    /// The shared library account and its tree, created at most once.
    pub fn library(
        &self,
        accounts: &dyn AccountStore,
    ) -> Result<(Account, Arc<InventoryTree>), StoreError> {
        let mut library = self
            .library
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let account = match (*library).and_then(|id| accounts.get_by_id(id)) {
            Some(account) => account,
            None => {
                let account = match accounts.get(LIBRARIAN_FIRST_NAME, LIBRARIAN_LAST_NAME) {
                    Some(existing) => existing,
                    None => create_librarian(accounts)?,
                };
                if !is_librarian(&account) {
                    return Err(StoreError::BootstrapConflict(format!(
                        "library owner {} is held by a regular account",
                        account.full_name()
                    )));
                }
                *library = Some(account.user_id);
                account
            }
        };

        let tree = self.load_or_bootstrap(account.user_id, LIBRARY_ROOT_NAME)?;
        Ok((account, tree))
    }

    pub fn cached_trees(&self) -> usize {
        self.cache.len()
    }
}

/// Whether a login name pair belongs to the library owner and must not be claimed
pub fn is_reserved_name(first_name: &str, last_name: &str) -> bool {
    Account::name_key(first_name, last_name)
        == Account::name_key(LIBRARIAN_FIRST_NAME, LIBRARIAN_LAST_NAME)
}

fn is_librarian(account: &Account) -> bool {
    account.user_level == LIBRARIAN_LEVEL && account.password_hash.is_empty()
}

fn create_librarian(accounts: &dyn AccountStore) -> Result<Account, StoreError> {
    let mut account = Account::new(LIBRARIAN_FIRST_NAME, LIBRARIAN_LAST_NAME, "");
    // No usable credentials: an empty hash never verifies
    account.password_hash.clear();
    account.password_salt.clear();
    account.user_level = LIBRARIAN_LEVEL;
    account.user_title = LIBRARIAN_TITLE.to_string();
    account.agreed_to_tos = true;
    account.read_critical = true;

    let (account, created) = accounts.insert_if_absent(account)?;
    if created {
        info!(account_id = %account.user_id, "Library account created");
    }
    Ok(account)
}

fn read_tree(path: &Path) -> Result<InventoryTree, StoreError> {
    let content = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let snapshot: TreeSnapshot =
        serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

    InventoryTree::from_snapshot(snapshot).map_err(|e| StoreError::Corrupt {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

fn write_tree(path: &Path, tree: &InventoryTree) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let json = serde_json::to_string_pretty(&tree.to_snapshot())
        .map_err(|e| StoreError::Serialize(e.to_string()))?;

    // Write beside the target and rename so readers never see half a tree
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)?;

    Ok(())
}
