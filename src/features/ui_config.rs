use super::bus::{publish, FeatureProvider, NegotiationContext};
use crate::core::error::FeatureError;
use crate::models::login::FeatureSections;
use serde_json::json;

pub const SECTION: &str = "ui-config";

/// Profile feature toggles. First-life profiles stay disabled.
pub struct UiConfigProvider;

impl FeatureProvider for UiConfigProvider {
    fn name(&self) -> &'static str {
        "ui-config"
    }

    fn contribute(
        &self,
        _ctx: &NegotiationContext<'_>,
        sections: &mut FeatureSections,
    ) -> Result<(), FeatureError> {
        publish(sections, self.name(), SECTION, json!([{ "allow_first_life": false }]));
        Ok(())
    }
}
