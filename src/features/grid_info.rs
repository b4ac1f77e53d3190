use super::bus::{publish, FeatureProvider, NegotiationContext};
use crate::core::config::GridConfig;
use crate::core::error::FeatureError;
use crate::models::grid_info::GridInfo;
use crate::models::login::FeatureSections;
use serde_json::Value;

pub const SECTION: &str = "grid-info";

/// Always contributes the grid description, whatever was requested
pub struct GridInfoProvider {
    info: GridInfo,
}

impl GridInfoProvider {
    pub fn new(grid: &GridConfig) -> Self {
        Self {
            info: GridInfo::from_config(grid),
        }
    }
}

impl FeatureProvider for GridInfoProvider {
    fn name(&self) -> &'static str {
        "grid-info"
    }

    fn contribute(
        &self,
        _ctx: &NegotiationContext<'_>,
        sections: &mut FeatureSections,
    ) -> Result<(), FeatureError> {
        let mut value = serde_json::to_value(&self.info)
            .map_err(|e| FeatureError::Failed(e.to_string()))?;
        if let Value::Object(map) = &mut value {
            map.insert("status".to_string(), Value::from("online"));
        }

        publish(sections, self.name(), SECTION, value);
        Ok(())
    }
}
