// Application state (AppState)

use crate::core::config::Config;
use crate::features::bus::FeatureBus;
use crate::metrics::collector::Metrics;
use crate::stores::account_store::JournaledAccountStore;
use crate::stores::inventory_store::InventoryTreeService;
use crate::stores::presence_registry::{PresenceRegistry, SweepPolicy};
use crate::wal::wal::Wal;
use anyhow::{Context, Result};
use std::sync::Arc;

pub const ACCOUNTS_WAL: &str = "accounts.wal";

/// Shared application state
///
/// Everything a login negotiation or the sweep task touches.
/// All fields are wrapped in Arc for efficient cloning across threads.
#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<JournaledAccountStore>,

    pub inventory: Arc<InventoryTreeService>,

    /// Live sessions and the circuit code counter
    pub presence: Arc<PresenceRegistry>,

    /// Feature providers consulted for every granted login
    pub bus: Arc<FeatureBus>,

    pub metrics: Arc<Metrics>,

    /// Account journal
    pub wal: Arc<Wal>,

    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, wal: Wal) -> Self {
        let config = Arc::new(config);
        let wal = Arc::new(wal);

        let accounts = Arc::new(JournaledAccountStore::new(Arc::clone(&wal)));
        let inventory = Arc::new(InventoryTreeService::new(&config.storage.data_dir));

        let policy = SweepPolicy {
            stale_after: config.presence.stale_after,
            eviction_grace: config.presence.eviction_grace,
        };
        let presence = Arc::new(PresenceRegistry::new(
            policy,
            config.presence.first_circuit_code,
        ));

        let bus = Arc::new(FeatureBus::with_default_providers(
            Arc::clone(&inventory),
            accounts.clone(),
            &config.grid,
        ));

        Self {
            accounts,
            inventory,
            presence,
            bus,
            metrics: Arc::new(Metrics::new()),
            wal,
            config,
        }
    }

    /// Open the journal under `data_dir` and build the state around it
    pub fn from_config(config: Config) -> Result<Self> {
        let wal_path = config.storage.data_dir.join(ACCOUNTS_WAL);
        let wal = Wal::new(wal_path.clone())
            .with_context(|| format!("Failed to open account journal {}", wal_path.display()))?;

        Ok(Self::new(config, wal))
    }
}

#[cfg(test)]
pub(crate) fn test_state(data_dir: &std::path::Path) -> AppState {
    let config = crate::core::config::test_config(data_dir);
    AppState::from_config(config).expect("test state must build")
}
