//! GitHub Actions pipeline plugin.
//!
//! Decides how each stage is reached from the current machine and delegates
//! remote stages either over SSH or by dispatching the deploy workflow.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use crate::config::{HostClass, ProjectConfig, classify_host};
use crate::context::ExecutionContext;
use crate::error::DriftError;
use crate::fix::{Detection, Fix};
use crate::git::resolve_repository;
use crate::reach::{Reachability, Via};
use crate::remote::ssh::searched_keys;
use crate::remote::{
    CommandRunner, GithubWorkflowClient, PollPolicy, SshTarget, WorkflowApi, WorkflowInputs,
    remote_invocation, resolve_ssh_key, run_workflow,
};
use crate::types::{Severity, Stage};

use super::{
    DeployResult, HookOptions, HookOutcome, PipelinePlugin, Plugin, PluginCategory, RemoteHooks,
    deploy_locally,
};

pub const PLUGIN_ID: &str = "github-actions";

#[derive(Debug, Clone)]
pub struct GithubActionsPipeline {
    runner: Arc<dyn CommandRunner>,
    workflow_api: Option<Arc<dyn WorkflowApi>>,
    poll: Option<PollPolicy>,
}

impl GithubActionsPipeline {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            workflow_api: None,
            poll: None,
        }
    }

    /// Use a fixed workflow client instead of the REST client built from the
    /// repository and token.
    pub fn with_workflow_api(mut self, api: Arc<dyn WorkflowApi>) -> Self {
        self.workflow_api = Some(api);
        self
    }

    /// Override the `[github]` poll settings.
    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poll = Some(policy);
        self
    }

    fn workflow_client(
        &self,
        config: &ProjectConfig,
        ctx: &ExecutionContext,
    ) -> anyhow::Result<Arc<dyn WorkflowApi>> {
        if let Some(api) = &self.workflow_api {
            return Ok(api.clone());
        }
        let slug = resolve_repository(config, ctx.root_dir())
            .context("No GitHub repository configured or detected from origin")?;
        let token = github_token(ctx).context("GITHUB_TOKEN is not set")?;
        Ok(Arc::new(GithubWorkflowClient::new(
            slug,
            &config.github_or_default(),
            token,
        )?))
    }

    fn workflow_available(&self, config: &ProjectConfig, ctx: &ExecutionContext) -> bool {
        self.workflow_api.is_some()
            || (github_token(ctx).is_some() && resolve_repository(config, ctx.root_dir()).is_some())
    }

    fn poll_policy(&self, config: &ProjectConfig) -> PollPolicy {
        self.poll
            .unwrap_or_else(|| PollPolicy::from_github(&config.github_or_default()))
    }

    /// Run `command` for a remote stage; `Ok` carries whether it succeeded.
    fn delegate(
        &self,
        command: &'static str,
        stage: Stage,
        config: &ProjectConfig,
        ctx: &ExecutionContext,
        opts: HookOptions,
    ) -> anyhow::Result<(Via, bool, String)> {
        let via = match self.can_reach(stage, config, ctx) {
            Reachability::Reachable { via } => via,
            Reachability::Unreachable { reason, .. } => {
                return Err(DriftError::UnreachableStage { stage, reason }.into());
            }
        };
        let remote_err = |e: anyhow::Error| DriftError::Remote {
            stage,
            operation: command.to_string(),
            message: format!("{:#}", e),
        };

        match via {
            Via::Ssh => {
                let target = SshTarget::for_stage(stage, config, ctx).map_err(remote_err)?;
                let invocation = remote_invocation(command, stage, opts.silent);
                let output = target
                    .run(self.runner.as_ref(), &invocation, opts.silent)
                    .map_err(remote_err)?;
                let detail = if output.success {
                    format!("{} on {} completed", command, target.destination)
                } else {
                    format!(
                        "{} on {} failed: {}",
                        command,
                        target.destination,
                        output.failure_summary()
                    )
                };
                Ok((via, output.success, detail))
            }
            Via::Workflow => {
                let api = self.workflow_client(config, ctx).map_err(remote_err)?;
                let run = run_workflow(
                    api.as_ref(),
                    WorkflowInputs { command, stage },
                    self.poll_policy(config),
                )
                .map_err(remote_err)?;
                Ok((via, run.succeeded(), run.summary()))
            }
            Via::Local => Ok((via, false, format!("{} is reachable locally", stage))),
        }
    }

    fn hook(
        &self,
        command: &'static str,
        stage: Stage,
        config: &ProjectConfig,
        ctx: &ExecutionContext,
        opts: HookOptions,
    ) -> anyhow::Result<HookOutcome> {
        let (_, success, detail) = self.delegate(command, stage, config, ctx, opts)?;
        Ok(if success {
            HookOutcome::handled(detail)
        } else {
            HookOutcome::not_handled(detail)
        })
    }
}

fn github_token(ctx: &ExecutionContext) -> Option<String> {
    ctx.env_var("GITHUB_TOKEN")
        .or_else(|| ctx.env_var("GH_TOKEN"))
        .map(str::to_string)
}

impl Plugin for GithubActionsPipeline {
    fn id(&self) -> &'static str {
        PLUGIN_ID
    }

    fn category(&self) -> PluginCategory {
        PluginCategory::Pipeline
    }

    fn should_load(&self, _root_dir: &Path, config: &ProjectConfig) -> bool {
        config.pipeline.as_deref().is_none_or(|p| p == PLUGIN_ID)
    }

    fn fixes(&self, config: &ProjectConfig) -> Vec<Fix> {
        let workflow = config.github_or_default().workflow;
        let relative = format!(".github/workflows/{}", workflow);
        let detect_path = relative.clone();
        let write_path = relative.clone();

        vec![
            Fix::new(
                "deploy-workflow-present",
                Stage::Dev,
                Severity::Info,
                format!("Deploy workflow {} is missing", relative),
                move |config, ctx| {
                    let has_server_stage = [Stage::Staging, Stage::Prod]
                        .into_iter()
                        .any(|s| config.stage_configured(s));
                    if !has_server_stage {
                        return Ok(Detection::NotApplicable);
                    }
                    Ok(Detection::from_problem(!ctx.project_path(&detect_path).exists()))
                },
            )
            .with_remedy(move |_, ctx| {
                let path = ctx.project_path(&write_path);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("Failed to create {}", parent.display()))?;
                }
                std::fs::write(&path, WORKFLOW_TEMPLATE)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                Ok(true)
            })
            .with_manual_fix(format!(
                "Create {} with a workflow_dispatch trigger taking `command` and `stage` inputs",
                relative
            )),
        ]
    }
}

impl PipelinePlugin for GithubActionsPipeline {
    fn can_reach(
        &self,
        stage: Stage,
        config: &ProjectConfig,
        ctx: &ExecutionContext,
    ) -> Reachability {
        if matches!(stage, Stage::Dev | Stage::Secrets) {
            return Reachability::local();
        }
        let Some(env) = config.environment(stage) else {
            return Reachability::unreachable(format!("{} is not configured", stage))
                .with_suggestion(format!("Add [environments.{}] to driftguard.toml", stage));
        };
        if ctx.is_remote_executor() || ctx.is_ci() {
            return Reachability::local();
        }
        let Some(host) = env.host.as_deref() else {
            return Reachability::unreachable(format!("{} has no host configured", stage))
                .with_suggestion(format!("Set environments.{}.host", stage));
        };

        let has_key = resolve_ssh_key(Some(env), ctx).is_some();
        match classify_host(host) {
            HostClass::Loopback => Reachability::local(),
            HostClass::Private if has_key => Reachability::via(Via::Ssh),
            HostClass::Private => Reachability::unreachable(format!(
                "{} host {} is on a private network and no SSH key was found (looked for {})",
                stage,
                host,
                searched_keys(Some(env))
            ))
            .with_suggestion(format!(
                "Run ssh-keygen or set environments.{}.ssh_key",
                stage
            )),
            HostClass::Public if self.workflow_available(config, ctx) => {
                Reachability::via(Via::Workflow)
            }
            HostClass::Public if has_key => Reachability::via(Via::Ssh),
            HostClass::Public => Reachability::unreachable(format!(
                "{} host {} needs a GitHub token and repository, or an SSH key",
                stage, host
            ))
            .with_suggestion("Export GITHUB_TOKEN or configure an SSH key"),
        }
    }

    fn remote_hooks(&self) -> RemoteHooks {
        RemoteHooks::all()
    }

    fn scan_stage(
        &self,
        stage: Stage,
        config: &ProjectConfig,
        ctx: &ExecutionContext,
        opts: HookOptions,
    ) -> anyhow::Result<HookOutcome> {
        self.hook("scan", stage, config, ctx, opts)
    }

    fn fix_stage(
        &self,
        stage: Stage,
        config: &ProjectConfig,
        ctx: &ExecutionContext,
        opts: HookOptions,
    ) -> anyhow::Result<HookOutcome> {
        self.hook("fix", stage, config, ctx, opts)
    }

    fn deploy_stage(
        &self,
        stage: Stage,
        config: &ProjectConfig,
        ctx: &ExecutionContext,
        opts: HookOptions,
    ) -> DeployResult {
        if self.can_reach(stage, config, ctx).is_local() {
            return deploy_locally(self.runner.as_ref(), stage, config, ctx, opts);
        }
        match self.delegate("deploy", stage, config, ctx, opts) {
            Ok((via, true, detail)) => DeployResult::succeeded(stage, via).with_detail(detail),
            Ok((via, false, detail)) => DeployResult::failed(stage, detail).with_via(via),
            Err(e) => DeployResult::failed(stage, format!("{:#}", e)),
        }
    }
}

const WORKFLOW_TEMPLATE: &str = r#"name: deploy

on:
  workflow_dispatch:
    inputs:
      command:
        description: "driftguard subcommand (scan, fix, deploy)"
        required: true
        default: deploy
      stage:
        description: "Target stage"
        required: true

jobs:
  driftguard:
    runs-on: ubuntu-latest
    environment: ${{ inputs.stage }}
    steps:
      - uses: actions/checkout@v4
      - name: Install driftguard
        run: cargo install --locked --path crates/driftguard-cli
      - name: Run driftguard
        env:
          DRIFTGUARD_REMOTE: "1"
        run: |
          if [ "${{ inputs.command }}" = "deploy" ]; then
            driftguard deploy "${{ inputs.stage }}" --remote
          else
            driftguard "${{ inputs.command }}" "--${{ inputs.stage }}" --remote
          fi
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnvironmentConfig;
    use crate::remote::{CommandOutput, RecordingRunner};
    use chrono::{DateTime, Utc};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        root: TempDir,
        home: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                root: TempDir::new().unwrap(),
                home: TempDir::new().unwrap(),
            }
        }

        fn ctx(&self) -> ExecutionContext {
            ExecutionContext::new(
                self.root.path().to_path_buf(),
                self.home.path().to_path_buf(),
                HashMap::new(),
            )
        }

        fn add_default_key(&self) {
            std::fs::create_dir_all(self.home.path().join(".ssh")).unwrap();
            std::fs::write(self.home.path().join(".ssh/id_ed25519"), "key").unwrap();
        }
    }

    fn config_with(stage: &str, host: &str) -> ProjectConfig {
        let mut config = ProjectConfig::new();
        config.environments.insert(
            stage.to_string(),
            EnvironmentConfig {
                host: Some(host.to_string()),
                user: Some("deploy".to_string()),
                ..Default::default()
            },
        );
        config
    }

    fn pipeline(runner: Arc<RecordingRunner>) -> GithubActionsPipeline {
        GithubActionsPipeline::new(runner)
    }

    #[derive(Debug, Default)]
    struct SucceedingApi {
        dispatched: Mutex<Vec<WorkflowInputs>>,
    }

    impl WorkflowApi for SucceedingApi {
        fn dispatch(&self, inputs: WorkflowInputs) -> anyhow::Result<()> {
            self.dispatched.lock().unwrap().push(inputs);
            Ok(())
        }

        fn find_run(
            &self,
            _after: DateTime<Utc>,
        ) -> anyhow::Result<Option<crate::remote::WorkflowRun>> {
            Ok(Some(self.get_run(11)?))
        }

        fn get_run(&self, id: u64) -> anyhow::Result<crate::remote::WorkflowRun> {
            Ok(crate::remote::WorkflowRun {
                id,
                status: "completed".to_string(),
                conclusion: Some("success".to_string()),
                html_url: None,
                created_at: Utc::now(),
            })
        }
    }

    #[test]
    fn test_dev_and_secrets_always_local() {
        let fx = Fixture::new();
        let p = pipeline(Arc::new(RecordingRunner::new()));
        let config = ProjectConfig::new();
        assert!(p.can_reach(Stage::Dev, &config, &fx.ctx()).is_local());
        assert!(p.can_reach(Stage::Secrets, &config, &fx.ctx()).is_local());
    }

    #[test]
    fn test_unconfigured_stage_unreachable() {
        let fx = Fixture::new();
        let p = pipeline(Arc::new(RecordingRunner::new()));
        let reach = p.can_reach(Stage::Prod, &ProjectConfig::new(), &fx.ctx());
        assert_eq!(reach.reason(), Some("prod is not configured"));
    }

    #[test]
    fn test_private_host_without_key_names_missing_key() {
        let fx = Fixture::new();
        let p = pipeline(Arc::new(RecordingRunner::new()));
        let config = config_with("staging", "192.168.1.20");

        let reach = p.can_reach(Stage::Staging, &config, &fx.ctx());
        assert!(!reach.is_reachable());
        assert!(reach.reason().unwrap().contains("no SSH key"));
    }

    #[test]
    fn test_private_host_with_key_uses_ssh() {
        let fx = Fixture::new();
        fx.add_default_key();
        let p = pipeline(Arc::new(RecordingRunner::new()));
        let config = config_with("staging", "192.168.1.20");
        assert_eq!(
            p.can_reach(Stage::Staging, &config, &fx.ctx()).via_kind(),
            Some(Via::Ssh)
        );
    }

    #[test]
    fn test_remote_executor_and_ci_are_local() {
        let fx = Fixture::new();
        let p = pipeline(Arc::new(RecordingRunner::new()));
        let config = config_with("prod", "203.0.113.10");

        let remote = fx.ctx().with_remote_executor(true);
        assert!(p.can_reach(Stage::Prod, &config, &remote).is_local());

        let ci = fx.ctx().with_env("GITHUB_ACTIONS", "true");
        assert!(p.can_reach(Stage::Prod, &config, &ci).is_local());
    }

    #[test]
    fn test_public_host_prefers_workflow() {
        let fx = Fixture::new();
        fx.add_default_key();
        let p = pipeline(Arc::new(RecordingRunner::new()));
        let mut config = config_with("prod", "203.0.113.10");
        assert_eq!(
            p.can_reach(Stage::Prod, &config, &fx.ctx()).via_kind(),
            Some(Via::Ssh)
        );

        config.github = Some(crate::config::GithubConfig {
            repository: Some("acme/shop".to_string()),
            ..Default::default()
        });
        let ctx = fx.ctx().with_env("GH_TOKEN", "t0ken");
        assert_eq!(
            p.can_reach(Stage::Prod, &config, &ctx).via_kind(),
            Some(Via::Workflow)
        );
    }

    #[test]
    fn test_public_host_without_credentials() {
        let fx = Fixture::new();
        let p = pipeline(Arc::new(RecordingRunner::new()));
        let config = config_with("prod", "deploy.example.com");
        let reach = p.can_reach(Stage::Prod, &config, &fx.ctx());
        assert!(!reach.is_reachable());
    }

    #[test]
    fn test_scan_hook_runs_over_ssh() {
        let fx = Fixture::new();
        fx.add_default_key();
        let runner = Arc::new(RecordingRunner::new());
        let p = pipeline(runner.clone());
        let config = config_with("staging", "10.0.0.5");

        let outcome = p
            .scan_stage(Stage::Staging, &config, &fx.ctx(), HookOptions { silent: true })
            .unwrap();
        assert!(outcome.handled);

        let lines = runner.command_lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("ssh "));
        assert!(lines[0].contains("deploy@10.0.0.5"));
        assert!(lines[0].ends_with("driftguard scan --staging --remote --silent"));
    }

    #[test]
    fn test_failed_ssh_is_not_handled() {
        let fx = Fixture::new();
        fx.add_default_key();
        let runner = Arc::new(
            RecordingRunner::new().respond("ssh", CommandOutput::failed(255, "Connection refused")),
        );
        let p = pipeline(runner);
        let config = config_with("staging", "10.0.0.5");

        let outcome = p
            .fix_stage(Stage::Staging, &config, &fx.ctx(), HookOptions::default())
            .unwrap();
        assert!(!outcome.handled);
        assert!(outcome.detail.unwrap().contains("Connection refused"));
    }

    #[test]
    fn test_hook_on_unreachable_stage_errors() {
        let fx = Fixture::new();
        let p = pipeline(Arc::new(RecordingRunner::new()));
        let config = config_with("staging", "10.0.0.5");
        let err = p
            .scan_stage(Stage::Staging, &config, &fx.ctx(), HookOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("unreachable"));
    }

    #[test]
    fn test_deploy_via_workflow() {
        let fx = Fixture::new();
        let api = Arc::new(SucceedingApi::default());
        let p = pipeline(Arc::new(RecordingRunner::new()))
            .with_workflow_api(api.clone())
            .with_poll_policy(PollPolicy::new(Duration::ZERO, Duration::from_secs(1)));
        let config = config_with("prod", "deploy.example.com");

        let result = p.deploy_stage(Stage::Prod, &config, &fx.ctx(), HookOptions::default());
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.via, Some(Via::Workflow));

        let dispatched = api.dispatched.lock().unwrap();
        assert_eq!(dispatched.len(), 1);
        assert_eq!(dispatched[0].command, "deploy");
        assert_eq!(dispatched[0].stage, Stage::Prod);
    }

    #[test]
    fn test_deploy_local_runs_deploy_command() {
        let fx = Fixture::new();
        let runner = Arc::new(RecordingRunner::new());
        let p = pipeline(runner.clone());
        let mut config = ProjectConfig::new();
        config.environments.insert(
            "dev".to_string(),
            EnvironmentConfig {
                deploy_command: Some("docker compose up -d".to_string()),
                ..Default::default()
            },
        );

        let result = p.deploy_stage(Stage::Dev, &config, &fx.ctx(), HookOptions::default());
        assert!(result.success);
        assert_eq!(result.via, Some(Via::Local));
        assert_eq!(runner.command_lines(), vec!["sh -c docker compose up -d"]);
    }

    #[test]
    fn test_workflow_fix_writes_template() {
        let fx = Fixture::new();
        let p = pipeline(Arc::new(RecordingRunner::new()));
        let config = config_with("prod", "deploy.example.com");
        let fixes = p.fixes(&config);
        let fix = &fixes[0];

        assert_eq!(fix.scan(&config, &fx.ctx()).unwrap(), Detection::ProblemDetected);
        assert!(fix.apply(&config, &fx.ctx()).unwrap().unwrap());
        assert_eq!(fix.scan(&config, &fx.ctx()).unwrap(), Detection::Clean);

        assert_eq!(
            fix.scan(&ProjectConfig::new(), &fx.ctx()).unwrap(),
            Detection::NotApplicable
        );
    }

    #[test]
    fn test_should_load() {
        let p = pipeline(Arc::new(RecordingRunner::new()));
        let mut config = ProjectConfig::new();
        assert!(p.should_load(Path::new("."), &config));
        config.pipeline = Some("github-actions".to_string());
        assert!(p.should_load(Path::new("."), &config));
        config.pipeline = Some("gitlab".to_string());
        assert!(!p.should_load(Path::new("."), &config));
    }
}
