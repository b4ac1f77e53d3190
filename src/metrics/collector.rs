use crate::stores::account_store::AccountStore;
use crate::stores::presence_registry::{PresenceRegistry, SweepReport};
use crate::utils::time::current_timestamp;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct Metrics {
    pub total_logins: AtomicU64,
    pub successful_logins: AtomicU64,
    /// Well-formed logins answered with `login=false`
    pub denied_logins: AtomicU64,
    /// Faults: malformed requests and storage failures
    pub failed_logins: AtomicU64,
    pub provider_failures: AtomicU64,
    pub evictions: AtomicU64,
    pub vetoes: AtomicU64,
    pub start_time: i64,
}

#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct MetricsSnapshot {
    pub total_logins: u64,
    pub successful_logins: u64,
    pub denied_logins: u64,
    pub failed_logins: u64,
    pub success_rate: f64,
    pub provider_failures: u64,
    pub evictions: u64,
    pub vetoes: u64,
    pub active_presences: usize,
    pub accounts: usize,
    pub uptime_seconds: i64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            total_logins: AtomicU64::new(0),
            successful_logins: AtomicU64::new(0),
            denied_logins: AtomicU64::new(0),
            failed_logins: AtomicU64::new(0),
            provider_failures: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            vetoes: AtomicU64::new(0),
            start_time: current_timestamp(),
        }
    }

    pub fn increment_logins(&self) {
        self.total_logins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_successful(&self) {
        self.successful_logins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_denied(&self) {
        self.denied_logins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failed(&self) {
        self.failed_logins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_provider_failures(&self, count: usize) {
        self.provider_failures.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn add_evictions(&self, count: usize) {
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_sweep(&self, report: &SweepReport) {
        self.add_evictions(report.removed);
        self.vetoes.fetch_add(report.vetoed as u64, Ordering::Relaxed);
    }

    pub fn get_snapshot(
        &self,
        presences: &PresenceRegistry,
        accounts: &dyn AccountStore,
    ) -> MetricsSnapshot {
        let total_logins = self.total_logins.load(Ordering::Relaxed);
        let successful_logins = self.successful_logins.load(Ordering::Relaxed);

        let success_rate = if total_logins > 0 {
            (successful_logins as f64 / total_logins as f64) * 100.0
        } else {
            0.0
        };

        MetricsSnapshot {
            total_logins,
            successful_logins,
            denied_logins: self.denied_logins.load(Ordering::Relaxed),
            failed_logins: self.failed_logins.load(Ordering::Relaxed),
            success_rate,
            provider_failures: self.provider_failures.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            vetoes: self.vetoes.load(Ordering::Relaxed),
            active_presences: presences.len(),
            accounts: accounts.len(),
            uptime_seconds: current_timestamp() - self.start_time,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
