use super::bus::{publish, FeatureProvider, NegotiationContext};
use crate::core::error::FeatureError;
use crate::models::login::FeatureSections;
use serde_json::json;

pub const OPTION: &str = "max-agent-groups";

/// Group ceiling, omitted for accounts without one
pub struct MaxGroupsProvider;

impl FeatureProvider for MaxGroupsProvider {
    fn name(&self) -> &'static str {
        "max-groups"
    }

    fn contribute(
        &self,
        ctx: &NegotiationContext<'_>,
        sections: &mut FeatureSections,
    ) -> Result<(), FeatureError> {
        if !ctx.wants(OPTION) || ctx.response.unlimited_groups {
            return Ok(());
        }

        publish(sections, self.name(), OPTION, json!(ctx.response.max_groups));
        Ok(())
    }
}
