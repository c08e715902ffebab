//! Fixes: a detector, an optional remediator, and manual guidance for one stage.

pub mod catalog;
pub mod env_vars;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ProjectConfig;
use crate::context::ExecutionContext;
use crate::types::{OsFilter, Severity, Stage, TargetOs};

pub use catalog::{FixCatalog, StageFixes};
pub use env_vars::{EnvFileTarget, synthesize_env_fixes};

/// Result of running a detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Detection {
    /// The check does not apply to this project (e.g. the stage is not configured)
    NotApplicable,
    /// The check applies and found nothing wrong
    Clean,
    ProblemDetected,
}

impl Detection {
    pub fn is_problem(&self) -> bool {
        matches!(self, Detection::ProblemDetected)
    }

    /// Map a plain "problem present" boolean onto a detection.
    pub fn from_problem(problem: bool) -> Self {
        if problem {
            Detection::ProblemDetected
        } else {
            Detection::Clean
        }
    }
}

pub type DetectFn =
    dyn Fn(&ProjectConfig, &ExecutionContext) -> anyhow::Result<Detection> + Send + Sync;

/// Returns `Ok(true)` when remediation succeeded.
pub type RemedyFn = dyn Fn(&ProjectConfig, &ExecutionContext) -> anyhow::Result<bool> + Send + Sync;

/// A unit of detectable (and possibly remediable) drift.
pub struct Fix {
    pub id: String,
    pub stage: Stage,
    pub severity: Severity,
    pub description: String,
    /// Guidance shown when there is no remediator or it failed
    pub manual_fix: String,
    /// Owning plugin id, stamped by the catalog
    pub plugin: String,
    pub os: Option<OsFilter>,
    detect: Box<DetectFn>,
    remedy: Option<Box<RemedyFn>>,
}

impl Fix {
    pub fn new<D>(
        id: impl Into<String>,
        stage: Stage,
        severity: Severity,
        description: impl Into<String>,
        detect: D,
    ) -> Self
    where
        D: Fn(&ProjectConfig, &ExecutionContext) -> anyhow::Result<Detection>
            + Send
            + Sync
            + 'static,
    {
        Self {
            id: id.into(),
            stage,
            severity,
            description: description.into(),
            manual_fix: String::new(),
            plugin: String::new(),
            os: None,
            detect: Box::new(detect),
            remedy: None,
        }
    }

    pub fn with_remedy<R>(mut self, remedy: R) -> Self
    where
        R: Fn(&ProjectConfig, &ExecutionContext) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        self.remedy = Some(Box::new(remedy));
        self
    }

    pub fn with_manual_fix(mut self, text: impl Into<String>) -> Self {
        self.manual_fix = text.into();
        self
    }

    pub fn with_os(mut self, os: OsFilter) -> Self {
        self.os = Some(os);
        self
    }

    pub fn with_plugin(mut self, plugin: impl Into<String>) -> Self {
        self.plugin = plugin.into();
        self
    }

    pub fn scan(
        &self,
        config: &ProjectConfig,
        ctx: &ExecutionContext,
    ) -> anyhow::Result<Detection> {
        (self.detect)(config, ctx)
    }

    /// Run the remediator, or `None` for a manual-only fix.
    pub fn apply(
        &self,
        config: &ProjectConfig,
        ctx: &ExecutionContext,
    ) -> Option<anyhow::Result<bool>> {
        self.remedy.as_ref().map(|remedy| remedy(config, ctx))
    }

    pub fn has_remedy(&self) -> bool {
        self.remedy.is_some()
    }

    pub fn applies_to_os(&self, os: TargetOs) -> bool {
        self.os.as_ref().is_none_or(|filter| filter.matches(os))
    }
}

impl fmt::Debug for Fix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fix")
            .field("id", &self.id)
            .field("stage", &self.stage)
            .field("severity", &self.severity)
            .field("plugin", &self.plugin)
            .field("os", &self.os)
            .field("has_remedy", &self.has_remedy())
            .finish()
    }
}
