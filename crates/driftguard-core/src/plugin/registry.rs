//! Plugin registry and loader.
//!
//! The registry holds every known plugin in priority order. Loading filters it
//! down to the plugins whose `should_load` predicate accepts the project, and
//! captures each pipeline's capabilities once.

use std::path::Path;
use std::sync::Arc;

use crate::config::ProjectConfig;
use crate::remote::runner::{CommandRunner, ProcessRunner};

use super::{
    DockerPlugin, EnvFilesPlugin, GithubActionsPipeline, PipelinePlugin, Plugin, RemoteHooks,
};

#[derive(Debug, Clone)]
struct PluginEntry {
    plugin: Arc<dyn Plugin>,
    pipeline: Option<Arc<dyn PipelinePlugin>>,
}

/// Registry of known plugins, in priority order.
#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    entries: Vec<PluginEntry>,
}

impl PluginRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Create a registry with the built-in plugins, running commands for real.
    pub fn with_builtin_plugins() -> Self {
        Self::with_runner(Arc::new(ProcessRunner))
    }

    /// Built-in plugins sharing the given command runner.
    pub fn with_runner(runner: Arc<dyn CommandRunner>) -> Self {
        let mut registry = Self::new();
        registry.register_pipeline(GithubActionsPipeline::new(runner.clone()));
        registry.register(DockerPlugin::new(runner));
        registry.register(EnvFilesPlugin::new());
        registry
    }

    /// Register a server or secrets plugin.
    pub fn register<P: Plugin + 'static>(&mut self, plugin: P) {
        self.entries.push(PluginEntry {
            plugin: Arc::new(plugin),
            pipeline: None,
        });
    }

    /// Register a pipeline plugin.
    pub fn register_pipeline<P: PipelinePlugin + 'static>(&mut self, plugin: P) {
        let plugin = Arc::new(plugin);
        self.entries.push(PluginEntry {
            plugin: plugin.clone(),
            pipeline: Some(plugin),
        });
    }

    pub fn all(&self) -> impl Iterator<Item = &dyn Plugin> {
        self.entries.iter().map(|e| e.plugin.as_ref())
    }

    pub fn get(&self, id: &str) -> Option<&dyn Plugin> {
        self.all().find(|p| p.id() == id)
    }

    pub fn plugin_ids(&self) -> Vec<&'static str> {
        self.all().map(|p| p.id()).collect()
    }

    /// Keep the plugins that apply to this project, in registry order.
    pub fn load_relevant(&self, root_dir: &Path, config: &ProjectConfig) -> LoadedPlugins {
        let mut loaded = LoadedPlugins::default();
        for entry in &self.entries {
            if !entry.plugin.should_load(root_dir, config) {
                tracing::debug!(plugin = entry.plugin.id(), "plugin not relevant");
                continue;
            }
            tracing::debug!(plugin = entry.plugin.id(), "plugin loaded");
            loaded.plugins.push(entry.plugin.clone());
            if let Some(pipeline) = &entry.pipeline {
                loaded.pipelines.push(LoadedPipeline {
                    hooks: pipeline.remote_hooks(),
                    plugin: pipeline.clone(),
                });
            }
        }
        loaded
    }
}

/// A loaded pipeline plugin with its hook support resolved.
#[derive(Debug, Clone)]
pub struct LoadedPipeline {
    pub plugin: Arc<dyn PipelinePlugin>,
    pub hooks: RemoteHooks,
}

/// Plugins relevant to one invocation.
#[derive(Debug, Clone, Default)]
pub struct LoadedPlugins {
    plugins: Vec<Arc<dyn Plugin>>,
    pipelines: Vec<LoadedPipeline>,
}

impl LoadedPlugins {
    pub fn plugins(&self) -> &[Arc<dyn Plugin>] {
        &self.plugins
    }

    pub fn pipelines(&self) -> &[LoadedPipeline] {
        &self.pipelines
    }

    pub fn pipeline(&self, id: &str) -> Option<&LoadedPipeline> {
        self.pipelines.iter().find(|p| p.plugin.id() == id)
    }

    /// Pipeline that owns deploys: the resolved owner, then the configured
    /// default, then the first loaded.
    pub fn deploy_pipeline(
        &self,
        owner: Option<&str>,
        config: &ProjectConfig,
    ) -> Option<&LoadedPipeline> {
        owner
            .and_then(|id| self.pipeline(id))
            .or_else(|| config.pipeline.as_deref().and_then(|id| self.pipeline(id)))
            .or_else(|| self.pipelines.first())
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|p| p.id()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}
