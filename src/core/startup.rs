use anyhow::{Context, Result};
use tracing::info;

use crate::core::state::AppState;
use crate::stores::account_store::AccountStore;

// this runs at boot time
pub fn replay_accounts(state: &AppState) -> Result<usize> {
    let operations = state
        .wal
        .replay()
        .context("Failed to replay account journal")?;

    state.accounts.apply(&operations);

    info!(
        operations_replayed = operations.len(),
        accounts_loaded = state.accounts.len(),
        wal_path = %state.wal.path().display(),
        "Account journal replayed"
    );

    Ok(operations.len())
}
