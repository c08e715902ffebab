#![allow(dead_code)]

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use driftguard_core::commands::DriftContext;
use driftguard_core::config::{ProjectConfig, parse_config_str};
use driftguard_core::context::ExecutionContext;
use driftguard_core::fix::{Detection, Fix};
use driftguard_core::plugin::{
    DeployResult, HookOptions, HookOutcome, PipelinePlugin, Plugin, PluginCategory,
    PluginRegistry, RemoteHooks,
};
use driftguard_core::reach::{Reachability, Via};
use driftguard_core::remote::RecordingRunner;
use driftguard_core::types::{Severity, Stage};
use tempfile::TempDir;

pub type FixFactory = Arc<dyn Fn() -> Vec<Fix> + Send + Sync>;

/// Shared call counter.
#[derive(Debug, Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// A server plugin whose fixes come from a closure.
pub struct ClosurePlugin {
    pub id: &'static str,
    pub fixes: FixFactory,
    pub env_vars: Vec<String>,
}

impl ClosurePlugin {
    pub fn new<F>(id: &'static str, fixes: F) -> Self
    where
        F: Fn() -> Vec<Fix> + Send + Sync + 'static,
    {
        Self {
            id,
            fixes: Arc::new(fixes),
            env_vars: Vec::new(),
        }
    }

    pub fn with_env_var(mut self, name: &str) -> Self {
        self.env_vars.push(name.to_string());
        self
    }
}

impl fmt::Debug for ClosurePlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosurePlugin").field("id", &self.id).finish()
    }
}

impl Plugin for ClosurePlugin {
    fn id(&self) -> &'static str {
        self.id
    }

    fn category(&self) -> PluginCategory {
        PluginCategory::Server
    }

    fn should_load(&self, _root_dir: &Path, _config: &ProjectConfig) -> bool {
        true
    }

    fn fixes(&self, _config: &ProjectConfig) -> Vec<Fix> {
        (self.fixes)()
    }

    fn required_env_vars(&self, _config: &ProjectConfig) -> Vec<String> {
        self.env_vars.clone()
    }
}

pub type ReachFn = Arc<dyn Fn(Stage) -> Reachability + Send + Sync>;

/// A pipeline with scripted reachability that counts hook calls.
#[derive(Clone)]
pub struct FakePipeline {
    pub id: &'static str,
    pub reach: ReachFn,
    pub hooks: RemoteHooks,
    pub scans: Counter,
    pub fixes: Counter,
    pub deploys: Counter,
}

impl FakePipeline {
    pub fn new<R>(id: &'static str, reach: R) -> Self
    where
        R: Fn(Stage) -> Reachability + Send + Sync + 'static,
    {
        Self {
            id,
            reach: Arc::new(reach),
            hooks: RemoteHooks::all(),
            scans: Counter::new(),
            fixes: Counter::new(),
            deploys: Counter::new(),
        }
    }

    /// Every stage local.
    pub fn local(id: &'static str) -> Self {
        Self::new(id, |_| Reachability::local())
    }

    pub fn with_hooks(mut self, hooks: RemoteHooks) -> Self {
        self.hooks = hooks;
        self
    }
}

impl fmt::Debug for FakePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakePipeline").field("id", &self.id).finish()
    }
}

impl Plugin for FakePipeline {
    fn id(&self) -> &'static str {
        self.id
    }

    fn category(&self) -> PluginCategory {
        PluginCategory::Pipeline
    }

    fn should_load(&self, _root_dir: &Path, _config: &ProjectConfig) -> bool {
        true
    }

    fn fixes(&self, _config: &ProjectConfig) -> Vec<Fix> {
        Vec::new()
    }
}

impl PipelinePlugin for FakePipeline {
    fn can_reach(
        &self,
        stage: Stage,
        _config: &ProjectConfig,
        _ctx: &ExecutionContext,
    ) -> Reachability {
        (self.reach)(stage)
    }

    fn remote_hooks(&self) -> RemoteHooks {
        self.hooks
    }

    fn scan_stage(
        &self,
        stage: Stage,
        _config: &ProjectConfig,
        _ctx: &ExecutionContext,
        _opts: HookOptions,
    ) -> anyhow::Result<HookOutcome> {
        self.scans.bump();
        Ok(HookOutcome::handled(format!("remote scan of {} clean", stage)))
    }

    fn fix_stage(
        &self,
        stage: Stage,
        _config: &ProjectConfig,
        _ctx: &ExecutionContext,
        _opts: HookOptions,
    ) -> anyhow::Result<HookOutcome> {
        self.fixes.bump();
        Ok(HookOutcome::handled(format!("remote fix of {} done", stage)))
    }

    fn deploy_stage(
        &self,
        stage: Stage,
        _config: &ProjectConfig,
        _ctx: &ExecutionContext,
        _opts: HookOptions,
    ) -> DeployResult {
        self.deploys.bump();
        DeployResult::succeeded(stage, Via::Workflow)
    }
}

/// Temp project root doubling as an empty home directory.
pub struct Project {
    pub dir: TempDir,
}

impl Project {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn ctx(&self) -> ExecutionContext {
        let home = self.dir.path().join("home");
        std::fs::create_dir_all(&home).unwrap();
        ExecutionContext::new(self.dir.path().to_path_buf(), home, Default::default())
    }

    pub fn write(&self, name: &str, content: &str) {
        std::fs::write(self.root().join(name), content).unwrap();
    }

    pub fn drift(&self, registry: PluginRegistry, config: ProjectConfig) -> DriftContext {
        self.drift_with_runner(registry, config, Arc::new(RecordingRunner::new()))
    }

    pub fn drift_with_runner(
        &self,
        registry: PluginRegistry,
        config: ProjectConfig,
        runner: Arc<RecordingRunner>,
    ) -> DriftContext {
        DriftContext::new(registry, config, self.ctx(), runner)
    }
}

/// A fix whose detector counts its calls and reports `detection`.
pub fn counted_fix(
    id: &str,
    stage: Stage,
    severity: Severity,
    detection: Detection,
    calls: &Counter,
) -> Fix {
    let calls = calls.clone();
    Fix::new(id, stage, severity, format!("{} drift", id), move |_, _| {
        calls.bump();
        Ok(detection)
    })
}

/// A fix that reports a problem until its marker file exists, and creates it.
pub fn marker_fix(id: &str, stage: Stage, marker: &'static str) -> Fix {
    Fix::new(id, stage, Severity::Warning, format!("{} missing", marker), move |_, ctx| {
        Ok(Detection::from_problem(!ctx.project_path(marker).exists()))
    })
    .with_remedy(move |_, ctx| {
        std::fs::write(ctx.project_path(marker), "ok")?;
        Ok(true)
    })
}

/// Config with `staging` and `prod` environments on the given hosts.
pub fn config_with_servers(staging: Option<&str>, prod: Option<&str>) -> ProjectConfig {
    let mut raw = String::new();
    if let Some(host) = staging {
        raw.push_str(&format!("[environments.staging]\nhost = \"{}\"\nuser = \"deploy\"\n", host));
    }
    if let Some(host) = prod {
        raw.push_str(&format!("[environments.prod]\nhost = \"{}\"\nuser = \"deploy\"\n", host));
    }
    parse_config_str(&raw).unwrap()
}
