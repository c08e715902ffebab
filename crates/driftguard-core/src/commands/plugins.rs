//! Plugin listing for the `plugins` subcommand.

use serde::Serialize;

use crate::plugin::{PluginCategory, RemoteHooks};

use super::context::DriftContext;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginInfo {
    pub id: String,
    pub category: PluginCategory,
    /// Relevant to this project
    pub loaded: bool,
    /// Remote hooks, for loaded pipeline plugins
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hooks: Option<RemoteHooks>,
    pub fixes: usize,
}

/// Every registered plugin, in registry order, with its load state.
pub fn list_plugins(drift: &DriftContext) -> Vec<PluginInfo> {
    let loaded = drift
        .registry
        .load_relevant(drift.ctx.root_dir(), &drift.config);
    drift
        .registry
        .all()
        .map(|plugin| {
            let id = plugin.id();
            PluginInfo {
                id: id.to_string(),
                category: plugin.category(),
                loaded: loaded.ids().contains(&id),
                hooks: loaded.pipeline(id).map(|p| p.hooks),
                fixes: plugin.fixes(&drift.config).len()
                    + plugin.required_env_vars(&drift.config).len() * 3,
            }
        })
        .collect()
}
