//! Shared state for one scan/fix/deploy invocation.
//!
//! `DriftContext` bundles the plugin registry, the loaded configuration and
//! the execution context. Each command rebuilds the loaded plugin set and the
//! fix catalog from it, so nothing carries over between invocations.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use crate::config::{ConfigStore, ProjectConfig};
use crate::context::ExecutionContext;
use crate::fix::FixCatalog;
use crate::plugin::{LoadedPlugins, PluginRegistry};
use crate::remote::{CommandRunner, ProcessRunner};

#[derive(Debug, Clone)]
pub struct DriftContext {
    pub registry: PluginRegistry,
    pub config: ProjectConfig,
    pub ctx: ExecutionContext,
    /// Runner for commands the engine itself issues (local deploys)
    pub runner: Arc<dyn CommandRunner>,
}

/// Plugins and fixes for one pass.
#[derive(Debug, Clone)]
pub struct Session {
    pub plugins: LoadedPlugins,
    pub catalog: FixCatalog,
}

impl DriftContext {
    pub fn new(
        registry: PluginRegistry,
        config: ProjectConfig,
        ctx: ExecutionContext,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            registry,
            config,
            ctx,
            runner,
        }
    }

    /// Load `driftguard.toml` from `root` and snapshot the process environment.
    pub fn from_root(root: PathBuf, remote_executor: bool) -> anyhow::Result<Self> {
        let store = ConfigStore::from_root(&root);
        let config = store.load()?;
        config
            .validate()
            .with_context(|| format!("Invalid {}", store.config_path().display()))?;
        let ctx = ExecutionContext::from_process(root)?.with_remote_executor(remote_executor);
        let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner);
        Ok(Self::new(
            PluginRegistry::with_runner(runner.clone()),
            config,
            ctx,
            runner,
        ))
    }

    /// Load relevant plugins and build the fix catalog.
    pub fn session(&self) -> anyhow::Result<Session> {
        let plugins = self.registry.load_relevant(self.ctx.root_dir(), &self.config);
        tracing::debug!(plugins = ?plugins.ids(), "plugins loaded");
        let catalog = FixCatalog::build(&plugins, &self.config)?;
        tracing::debug!(fixes = catalog.len(), "fix catalog built");
        Ok(Session { plugins, catalog })
    }
}
