use crate::core::error::PresenceError;
use crate::models::account::Account;
use crate::models::presence::Presence;
use crate::network::circuit::UseCircuitCode;
use crate::utils::time::{current_timestamp, deadline_reached, is_expired};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Answer of a stale handler for one presence in one sweep
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StaleVerdict {
    Evict,
    Veto,
}

/// Subscriber notified when a presence went quiet for longer than the window
pub trait StaleHandler: Send + Sync {
    fn on_stale(&self, presence: &Presence) -> StaleVerdict;
}

/// Sweep timing policy, in seconds
#[derive(Clone, Copy, Debug)]
pub struct SweepPolicy {
    pub stale_after: i64,
    pub eviction_grace: i64,
}

impl Default for SweepPolicy {
    fn default() -> Self {
        Self {
            stale_after: 15,
            eviction_grace: 3,
        }
    }
}

/// What one sweep did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Presences whose grace period ended during this sweep
    pub removed: usize,
    /// Presences newly marked for removal
    pub scheduled: usize,
    pub vetoed: usize,
}

#[derive(Default)]
struct PresenceTable {
    by_account: HashMap<Uuid, Presence>,
    by_circuit: HashMap<u32, Uuid>,
}

impl PresenceTable {
    fn remove(&mut self, account_id: &Uuid) -> Option<Presence> {
        let presence = self.by_account.remove(account_id)?;
        self.by_circuit.remove(&presence.circuit_code);
        Some(presence)
    }
}

/// Set of active sessions, keyed by account, one per account.
///
/// All presence state sits behind a single mutex. Stale handlers are called
/// with the lock released.
pub struct PresenceRegistry {
    table: Mutex<PresenceTable>,
    next_circuit: AtomicU32,
    policy: SweepPolicy,
    handlers: Vec<Box<dyn StaleHandler>>,
}

impl PresenceRegistry {
    pub fn new(policy: SweepPolicy, first_circuit_code: u32) -> Self {
        Self {
            table: Mutex::new(PresenceTable::default()),
            next_circuit: AtomicU32::new(first_circuit_code),
            policy,
            handlers: Vec::new(),
        }
    }

    /// Add a stale handler. Handlers are fixed before the registry is shared.
    pub fn with_handler(mut self, handler: Box<dyn StaleHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    fn lock(&self) -> MutexGuard<'_, PresenceTable> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn policy(&self) -> SweepPolicy {
        self.policy
    }

    /// Register a session for `account`, replacing any session it already had
    pub fn register(&self, account: &Account) -> Presence {
        self.register_at(account, current_timestamp())
    }

    pub fn register_at(&self, account: &Account, now: i64) -> Presence {
        let mut table = self.lock();

        // Allocated under the table lock so the stored presence always carries
        // the newest code. Wraparound after u32::MAX logins is not handled.
        let circuit_code = self.next_circuit.fetch_add(1, Ordering::Relaxed);
        let presence = Presence::new(account.user_id, circuit_code, now);

        if let Some(previous) = table.remove(&account.user_id) {
            info!(
                account_id = %account.user_id,
                old_circuit_code = previous.circuit_code,
                new_circuit_code = circuit_code,
                "Replacing existing presence"
            );
        }
        table.by_circuit.insert(circuit_code, account.user_id);
        table.by_account.insert(account.user_id, presence.clone());

        presence
    }

    pub fn lookup(&self, account_id: Uuid) -> Option<Presence> {
        self.lock().by_account.get(&account_id).cloned()
    }

    pub fn lookup_circuit(&self, circuit_code: u32) -> Option<Presence> {
        let table = self.lock();
        let account_id = table.by_circuit.get(&circuit_code)?;
        table.by_account.get(account_id).cloned()
    }

    /// Refresh the liveness timestamp. Returns false if the account has no presence.
    pub fn ping(&self, account_id: Uuid) -> bool {
        self.ping_at(account_id, current_timestamp())
    }

    pub fn ping_at(&self, account_id: Uuid, now: i64) -> bool {
        match self.lock().by_account.get_mut(&account_id) {
            Some(presence) => {
                presence.ping(now);
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, account_id: Uuid) -> Option<Presence> {
        self.lock().remove(&account_id)
    }

    /// Remove the presence holding `circuit_code`, leaving a newer
    /// presence of the same account alone
    pub fn remove_circuit(&self, circuit_code: u32) -> Option<Presence> {
        let mut table = self.lock();
        let account_id = *table.by_circuit.get(&circuit_code)?;
        table.remove(&account_id)
    }

    /// Bind a circuit packet to its presence and count it as a keep-alive
    pub fn use_circuit(&self, packet: &UseCircuitCode, now: i64) -> Result<Presence, PresenceError> {
        let mut table = self.lock();

        let account_id = *table
            .by_circuit
            .get(&packet.circuit_code)
            .ok_or(PresenceError::UnknownCircuit(packet.circuit_code))?;

        let presence = table
            .by_account
            .get_mut(&account_id)
            .ok_or(PresenceError::UnknownCircuit(packet.circuit_code))?;

        if presence.session_id != packet.session_id || presence.account_id != packet.agent_id {
            return Err(PresenceError::SessionMismatch(packet.circuit_code));
        }

        presence.ping(now);
        Ok(presence.clone())
    }

    /// Drop presences whose eviction deadline has passed
    pub fn reap(&self, now: i64) -> usize {
        let mut table = self.lock();

        let due: Vec<Uuid> = table
            .by_account
            .values()
            .filter(|p| p.evict_at.is_some_and(|at| deadline_reached(at, now)))
            .map(|p| p.account_id)
            .collect();

        for account_id in &due {
            if let Some(presence) = table.remove(account_id) {
                info!(
                    account_id = %account_id,
                    circuit_code = presence.circuit_code,
                    "Stale presence removed"
                );
            }
        }

        due.len()
    }

    /// Scan for stale presences and decide their fate.
    ///
    /// Never fails. A handler that panics counts as not vetoing.
    pub fn sweep(&self, now: i64) -> SweepReport {
        let mut report = SweepReport {
            removed: self.reap(now),
            ..SweepReport::default()
        };

        let candidates: Vec<Presence> = self
            .lock()
            .by_account
            .values()
            .filter(|p| !p.is_pending_eviction())
            .filter(|p| is_expired(p.last_packet, self.policy.stale_after, now))
            .cloned()
            .collect();

        for candidate in candidates {
            let verdict = self.ask_handlers(&candidate);

            let mut table = self.lock();
            let Some(presence) = table.by_account.get_mut(&candidate.account_id) else {
                continue;
            };
            // Replaced or pinged while the handlers ran
            if presence.circuit_code != candidate.circuit_code
                || presence.last_packet != candidate.last_packet
            {
                continue;
            }

            match verdict {
                StaleVerdict::Veto => {
                    presence.ping(now);
                    report.vetoed += 1;
                    debug!(
                        account_id = %presence.account_id,
                        circuit_code = presence.circuit_code,
                        "Stale presence eviction vetoed"
                    );
                }
                StaleVerdict::Evict => {
                    presence.evict_at = Some(now + self.policy.eviction_grace);
                    report.scheduled += 1;
                    debug!(
                        account_id = %presence.account_id,
                        circuit_code = presence.circuit_code,
                        grace_seconds = self.policy.eviction_grace,
                        "Stale presence scheduled for removal"
                    );
                }
            }
        }

        report
    }

    fn ask_handlers(&self, presence: &Presence) -> StaleVerdict {
        let mut verdict = StaleVerdict::Evict;

        for (idx, handler) in self.handlers.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| handler.on_stale(presence))) {
                Ok(StaleVerdict::Veto) => verdict = StaleVerdict::Veto,
                Ok(StaleVerdict::Evict) => {}
                Err(_) => {
                    warn!(
                        handler = idx,
                        account_id = %presence.account_id,
                        "Stale handler panicked, treating as no veto"
                    );
                }
            }
        }

        verdict
    }

    pub fn len(&self) -> usize {
        self.lock().by_account.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().by_account.is_empty()
    }

    /// Drop every presence, as on shutdown
    pub fn close(&self) {
        let mut table = self.lock();
        let count = table.by_account.len();
        table.by_account.clear();
        table.by_circuit.clear();
        info!(presences = count, "Presence registry closed");
    }
}
