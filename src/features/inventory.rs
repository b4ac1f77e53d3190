use super::bus::{publish, FeatureProvider, NegotiationContext};
use crate::core::error::FeatureError;
use crate::models::inventory::InventoryTree;
use crate::models::login::FeatureSections;
use crate::stores::account_store::AccountStore;
use crate::stores::inventory_store::InventoryTreeService;
use serde_json::{json, Value};
use std::sync::Arc;

pub const SKELETON: &str = "inventory-skeleton";
pub const ROOT: &str = "inventory-root";
pub const LIB_OWNER: &str = "inventory-lib-owner";
pub const SKEL_LIB: &str = "inventory-skel-lib";
pub const LIB_ROOT: &str = "inventory-lib-root";

/// Answers the personal and library inventory options
pub struct InventoryProvider {
    trees: Arc<InventoryTreeService>,
    accounts: Arc<dyn AccountStore>,
}

impl InventoryProvider {
    pub fn new(trees: Arc<InventoryTreeService>, accounts: Arc<dyn AccountStore>) -> Self {
        Self { trees, accounts }
    }
}

fn skeleton(tree: &InventoryTree) -> Result<Value, FeatureError> {
    serde_json::to_value(tree.serialize())
        .map_err(|e| FeatureError::Failed(format!("cannot encode folders: {}", e)))
}

impl FeatureProvider for InventoryProvider {
    fn name(&self) -> &'static str {
        "inventory"
    }

    fn contribute(
        &self,
        ctx: &NegotiationContext<'_>,
        sections: &mut FeatureSections,
    ) -> Result<(), FeatureError> {
        let name = self.name();

        if ctx.wants(SKELETON) || ctx.wants(ROOT) {
            let tree = self.trees.personal_tree(ctx.account)?;

            if ctx.wants(SKELETON) {
                publish(sections, name, SKELETON, skeleton(&tree)?);
            }
            if ctx.wants(ROOT) {
                publish(sections, name, ROOT, json!([{ "folder_id": tree.root_id() }]));
            }
        }

        if ctx.wants(LIB_OWNER) || ctx.wants(SKEL_LIB) || ctx.wants(LIB_ROOT) {
            let (librarian, tree) = self.trees.library(self.accounts.as_ref())?;

            if ctx.wants(LIB_OWNER) {
                publish(sections, name, LIB_OWNER, json!([{ "agent_id": librarian.user_id }]));
            }
            if ctx.wants(SKEL_LIB) {
                publish(sections, name, SKEL_LIB, skeleton(&tree)?);
            }
            if ctx.wants(LIB_ROOT) {
                publish(sections, name, LIB_ROOT, json!([{ "folder_id": tree.root_id() }]));
            }
        }

        Ok(())
    }
}
