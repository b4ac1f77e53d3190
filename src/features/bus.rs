use super::grid_info::GridInfoProvider;
use super::inventory::InventoryProvider;
use super::login_flags::LoginFlagsProvider;
use super::max_groups::MaxGroupsProvider;
use super::ui_config::UiConfigProvider;
use crate::core::config::GridConfig;
use crate::core::error::{FeatureError, StoreError};
use crate::models::account::Account;
use crate::models::login::{FeatureSections, LoginResponse};
use crate::stores::account_store::AccountStore;
use crate::stores::inventory_store::InventoryTreeService;
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

/// What a provider sees of the negotiation in progress
pub struct NegotiationContext<'a> {
    pub options: &'a [String],
    pub account: &'a Account,
    /// Fields seeded by the login codec before the bus ran
    pub response: &'a LoginResponse,
    pub now: i64,
}

impl NegotiationContext<'_> {
    pub fn wants(&self, option: &str) -> bool {
        self.options.iter().any(|o| o == option)
    }
}

/// A source of optional login reply sections
pub trait FeatureProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Add zero or more sections. Sections written by others are read-only.
    fn contribute(
        &self,
        ctx: &NegotiationContext<'_>,
        sections: &mut FeatureSections,
    ) -> Result<(), FeatureError>;
}

/// Insert a section, logging when another provider already owns the name
pub fn publish(sections: &mut FeatureSections, provider: &str, name: &str, value: Value) {
    if !sections.insert(name, value) {
        warn!(provider, section = name, "Section already present, contribution refused");
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NegotiationReport {
    /// Providers that returned an error or panicked
    pub failed: Vec<&'static str>,
}

/// Fixed table of providers, all invoked for every negotiation in order
#[derive(Default)]
pub struct FeatureBus {
    providers: Vec<Arc<dyn FeatureProvider>>,
}

impl FeatureBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// The providers shipped with the service, in invocation order
    pub fn with_default_providers(
        trees: Arc<InventoryTreeService>,
        accounts: Arc<dyn AccountStore>,
        grid: &GridConfig,
    ) -> Self {
        Self::new()
            .register(Arc::new(InventoryProvider::new(trees, accounts)))
            .register(Arc::new(GridInfoProvider::new(grid)))
            .register(Arc::new(LoginFlagsProvider))
            .register(Arc::new(MaxGroupsProvider))
            .register(Arc::new(UiConfigProvider))
    }

    pub fn register(mut self, provider: Arc<dyn FeatureProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Run every provider against `response`.
    ///
    /// A provider failure is logged and skipped. A storage failure aborts
    /// the negotiation and is returned to the caller.
    pub fn negotiate(
        &self,
        account: &Account,
        response: &mut LoginResponse,
        now: i64,
    ) -> Result<NegotiationReport, StoreError> {
        let mut sections = std::mem::take(&mut response.sections);
        let result = self.run(account, response, &mut sections, now);
        response.sections = sections;
        result
    }

    fn run(
        &self,
        account: &Account,
        response: &LoginResponse,
        sections: &mut FeatureSections,
        now: i64,
    ) -> Result<NegotiationReport, StoreError> {
        let ctx = NegotiationContext {
            options: &response.requested_options,
            account,
            response,
            now,
        };
        let mut report = NegotiationReport::default();

        for provider in &self.providers {
            let name = provider.name();
            let outcome = catch_unwind(AssertUnwindSafe(|| provider.contribute(&ctx, sections)));

            match outcome {
                Ok(Ok(())) => debug!(provider = name, "Provider finished"),
                Ok(Err(FeatureError::Storage(e))) => {
                    warn!(provider = name, error = %e, "Provider storage failure, aborting negotiation");
                    return Err(e);
                }
                Ok(Err(FeatureError::Failed(reason))) => {
                    warn!(provider = name, error = %reason, "Provider failed, skipping");
                    report.failed.push(name);
                }
                Err(_) => {
                    warn!(provider = name, "Provider panicked, skipping");
                    report.failed.push(name);
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::login::sample_request;
    use serde_json::json;

    struct Fixed(&'static str, &'static str);

    impl FeatureProvider for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }

        fn contribute(
            &self,
            _ctx: &NegotiationContext<'_>,
            sections: &mut FeatureSections,
        ) -> Result<(), FeatureError> {
            publish(sections, self.0, self.1, json!(self.0));
            Ok(())
        }
    }

    struct Broken;

    impl FeatureProvider for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn contribute(
            &self,
            _ctx: &NegotiationContext<'_>,
            _sections: &mut FeatureSections,
        ) -> Result<(), FeatureError> {
            Err(FeatureError::Failed("no backend".to_string()))
        }
    }

    struct Panicky;

    impl FeatureProvider for Panicky {
        fn name(&self) -> &'static str {
            "panicky"
        }

        fn contribute(
            &self,
            _ctx: &NegotiationContext<'_>,
            _sections: &mut FeatureSections,
        ) -> Result<(), FeatureError> {
            panic!("provider bug")
        }
    }

    struct DiskFull;

    impl FeatureProvider for DiskFull {
        fn name(&self) -> &'static str {
            "disk-full"
        }

        fn contribute(
            &self,
            _ctx: &NegotiationContext<'_>,
            _sections: &mut FeatureSections,
        ) -> Result<(), FeatureError> {
            Err(StoreError::Serialize("disk full".to_string()).into())
        }
    }

    #[test]
    fn test_failures_are_isolated() {
        let bus = FeatureBus::new()
            .register(Arc::new(Broken))
            .register(Arc::new(Panicky))
            .register(Arc::new(Fixed("after", "after-section")));
        let account = Account::new("A", "B", "pw");
        let mut response = LoginResponse::seeded(&account, &sample_request("A", "B", &[]));

        let report = bus.negotiate(&account, &mut response, 0).unwrap();

        assert_eq!(report.failed, vec!["broken", "panicky"]);
        assert!(response.sections.contains("after-section"));
    }

    #[test]
    fn test_first_writer_keeps_section() {
        let bus = FeatureBus::new()
            .register(Arc::new(Fixed("first", "shared")))
            .register(Arc::new(Fixed("second", "shared")));
        let account = Account::new("A", "B", "pw");
        let mut response = LoginResponse::seeded(&account, &sample_request("A", "B", &[]));

        bus.negotiate(&account, &mut response, 0).unwrap();

        assert_eq!(response.sections.len(), 1);
        assert_eq!(response.sections.get("shared"), Some(&json!("first")));
    }

    #[test]
    fn test_storage_failure_aborts() {
        let bus = FeatureBus::new()
            .register(Arc::new(DiskFull))
            .register(Arc::new(Fixed("later", "later-section")));
        let account = Account::new("A", "B", "pw");
        let mut response = LoginResponse::seeded(&account, &sample_request("A", "B", &[]));

        let err = bus.negotiate(&account, &mut response, 0).unwrap_err();

        assert!(matches!(err, StoreError::Serialize(_)));
        assert!(!response.sections.contains("later-section"));
    }

    #[test]
    fn test_default_providers_end_to_end() {
        let dir = tempfile::TempDir::new().unwrap();
        let accounts = Arc::new(crate::stores::account_store::JournaledAccountStore::in_memory());
        let trees = Arc::new(InventoryTreeService::new(dir.path()));
        let bus = FeatureBus::with_default_providers(trees, accounts.clone(), &GridConfig::default());

        let account = accounts.create("Jane", "Doe", "pw").unwrap();
        let request = sample_request("Jane", "Doe", &["inventory-root", "login-flags", "max-agent-groups"]);
        let mut response = LoginResponse::seeded(&account, &request);

        let report = bus.negotiate(&account, &mut response, 0).unwrap();

        assert!(report.failed.is_empty());
        let names: Vec<&str> = response.sections.iter().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            vec!["inventory-root", "grid-info", "login-flags", "max-agent-groups", "ui-config"]
        );
    }

    #[test]
    fn test_provider_names_in_registration_order() {
        let bus = FeatureBus::new()
            .register(Arc::new(Broken))
            .register(Arc::new(Panicky));
        assert_eq!(bus.provider_names(), vec!["broken", "panicky"]);
    }
}
