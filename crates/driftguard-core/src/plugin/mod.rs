//! Plugin layer
//!
//! Plugins contribute fixes for the stages they care about. Three categories
//! exist:
//! - `pipeline`: decides stage reachability and owns remote delegation
//! - `server`: checks and repairs the machines behind a stage
//! - `secrets`: checks env files and secret plumbing
//!
//! Capabilities are explicit traits. A pipeline plugin implements
//! [`PipelinePlugin`] and declares its optional remote hooks through
//! [`RemoteHooks`], which the registry reads once at load time.

pub mod docker;
pub mod env_files;
pub mod github_actions;
pub mod registry;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::ProjectConfig;
use crate::context::ExecutionContext;
use crate::fix::Fix;
use crate::reach::{Reachability, Via};
use crate::remote::{CommandRunner, CommandSpec};
use crate::types::Stage;

pub use docker::DockerPlugin;
pub use env_files::EnvFilesPlugin;
pub use github_actions::GithubActionsPipeline;
pub use registry::{LoadedPipeline, LoadedPlugins, PluginRegistry};

/// Ids of the plugins shipped with driftguard, in registry order.
pub const BUILTIN_PLUGIN_IDS: &[&str] = &["github-actions", "docker", "env-files"];

/// Builtin ids that may be named as the default `pipeline`.
pub const BUILTIN_PIPELINE_IDS: &[&str] = &["github-actions"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginCategory {
    Pipeline,
    Server,
    Secrets,
}

impl PluginCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginCategory::Pipeline => "pipeline",
            PluginCategory::Server => "server",
            PluginCategory::Secrets => "secrets",
        }
    }
}

/// A deployment capability plugin.
pub trait Plugin: Send + Sync + fmt::Debug {
    fn id(&self) -> &'static str;

    fn category(&self) -> PluginCategory;

    /// Whether this plugin applies to the project.
    fn should_load(&self, root_dir: &Path, config: &ProjectConfig) -> bool;

    /// Fixes this plugin contributes. The catalog stamps the plugin id.
    fn fixes(&self, config: &ProjectConfig) -> Vec<Fix>;

    /// Environment variables every env file must assign.
    fn required_env_vars(&self, _config: &ProjectConfig) -> Vec<String> {
        Vec::new()
    }
}

/// Remote hooks a pipeline plugin supports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RemoteHooks {
    pub scan: bool,
    pub fix: bool,
    pub deploy: bool,
}

impl RemoteHooks {
    pub fn all() -> Self {
        Self {
            scan: true,
            fix: true,
            deploy: true,
        }
    }
}

/// Options passed through to remote hooks.
#[derive(Debug, Clone, Copy, Default)]
pub struct HookOptions {
    /// Capture remote output instead of streaming it
    pub silent: bool,
}

/// Result of a remote scan/fix hook. The detail is display-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookOutcome {
    pub handled: bool,
    pub detail: Option<String>,
}

impl HookOutcome {
    pub fn handled(detail: impl Into<String>) -> Self {
        Self {
            handled: true,
            detail: Some(detail.into()),
        }
    }

    pub fn not_handled(detail: impl Into<String>) -> Self {
        Self {
            handled: false,
            detail: Some(detail.into()),
        }
    }
}

/// Outcome of deploying one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployResult {
    pub success: bool,
    pub stage: Stage,
    pub via: Option<Via>,
    pub error: Option<String>,
    pub details: Vec<String>,
}

impl DeployResult {
    pub fn succeeded(stage: Stage, via: Via) -> Self {
        Self {
            success: true,
            stage,
            via: Some(via),
            error: None,
            details: Vec::new(),
        }
    }

    pub fn failed(stage: Stage, error: impl Into<String>) -> Self {
        Self {
            success: false,
            stage,
            via: None,
            error: Some(error.into()),
            details: Vec::new(),
        }
    }

    pub fn with_via(mut self, via: Via) -> Self {
        self.via = Some(via);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.details.push(detail.into());
        self
    }
}

/// A plugin that decides reachability and can act on stages remotely.
pub trait PipelinePlugin: Plugin {
    /// Decide whether and how a stage can be acted on from here.
    ///
    /// May probe the context's environment snapshot and local files; must not
    /// touch the network.
    fn can_reach(
        &self,
        stage: Stage,
        config: &ProjectConfig,
        ctx: &ExecutionContext,
    ) -> Reachability;

    fn remote_hooks(&self) -> RemoteHooks {
        RemoteHooks::default()
    }

    fn scan_stage(
        &self,
        stage: Stage,
        _config: &ProjectConfig,
        _ctx: &ExecutionContext,
        _opts: HookOptions,
    ) -> anyhow::Result<HookOutcome> {
        anyhow::bail!("{} does not support remote scans of {}", self.id(), stage)
    }

    fn fix_stage(
        &self,
        stage: Stage,
        _config: &ProjectConfig,
        _ctx: &ExecutionContext,
        _opts: HookOptions,
    ) -> anyhow::Result<HookOutcome> {
        anyhow::bail!("{} does not support remote fixes of {}", self.id(), stage)
    }

    /// Deploy a stage. Implementations re-check reachability themselves.
    fn deploy_stage(
        &self,
        stage: Stage,
        _config: &ProjectConfig,
        _ctx: &ExecutionContext,
        _opts: HookOptions,
    ) -> DeployResult {
        DeployResult::failed(stage, format!("{} does not support deploys", self.id()))
    }
}

/// Run a stage's `deploy_command` on this machine, from the project root.
pub fn deploy_locally(
    runner: &dyn CommandRunner,
    stage: Stage,
    config: &ProjectConfig,
    ctx: &ExecutionContext,
    opts: HookOptions,
) -> DeployResult {
    let Some(command) = config
        .environment(stage)
        .and_then(|env| env.deploy_command.as_deref())
    else {
        return DeployResult::failed(
            stage,
            format!("No deploy_command configured for {}", stage),
        )
        .with_via(Via::Local);
    };

    tracing::info!(%stage, command, "deploying locally");
    let spec = CommandSpec::shell(command).current_dir(ctx.root_dir());
    match runner.run(&spec, !opts.silent) {
        Ok(output) if output.success => {
            DeployResult::succeeded(stage, Via::Local).with_detail(format!("ran `{}`", command))
        }
        Ok(output) => DeployResult::failed(
            stage,
            format!("`{}` failed: {}", command, output.failure_summary()),
        )
        .with_via(Via::Local),
        Err(e) => DeployResult::failed(stage, format!("{:#}", e)).with_via(Via::Local),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deploy_result_builders() {
        let ok = DeployResult::succeeded(Stage::Prod, Via::Workflow).with_detail("run 42");
        assert!(ok.success);
        assert_eq!(ok.via, Some(Via::Workflow));
        assert_eq!(ok.details, vec!["run 42".to_string()]);

        let failed = DeployResult::failed(Stage::Prod, "boom");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_deploy_locally_requires_command() {
        let runner = crate::remote::RecordingRunner::new();
        let ctx = ExecutionContext::new("/work".into(), "/home/u".into(), Default::default());
        let result = deploy_locally(
            &runner,
            Stage::Dev,
            &ProjectConfig::new(),
            &ctx,
            HookOptions::default(),
        );
        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("No deploy_command configured for dev")
        );
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_deploy_locally_reports_exit_failure() {
        let runner = crate::remote::RecordingRunner::new().respond(
            "make deploy",
            crate::remote::CommandOutput::failed(2, "no rule"),
        );
        let mut config = ProjectConfig::new();
        config.environments.insert(
            "dev".to_string(),
            crate::config::EnvironmentConfig {
                deploy_command: Some("make deploy".to_string()),
                ..Default::default()
            },
        );
        let ctx = ExecutionContext::new("/work".into(), "/home/u".into(), Default::default());
        let opts = HookOptions { silent: true };
        let result = deploy_locally(&runner, Stage::Dev, &config, &ctx, opts);
        assert!(!result.success);
        assert!(result.error.unwrap().contains("exit code 2"));
        assert_eq!(runner.calls()[0].cwd.as_deref(), Some(std::path::Path::new("/work")));
    }

    #[test]
    fn test_hook_outcome() {
        assert!(HookOutcome::handled("ok").handled);
        assert!(!HookOutcome::not_handled("no").handled);
    }

    #[test]
    fn test_category_names() {
        assert_eq!(PluginCategory::Pipeline.as_str(), "pipeline");
        let json = serde_json::to_string(&PluginCategory::Secrets).expect("serialize");
        assert_eq!(json, "\"secrets\"");
    }
}
