//! Fixes synthesized from a plugin's required environment variables.
//!
//! Each required variable yields one manual-only check per env file. A check
//! whose environment is not configured reports `NotApplicable` so an unused
//! stage never surfaces missing-secret warnings.

use anyhow::Context;

use super::{Detection, Fix};
use crate::types::{Severity, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvFileTarget {
    Example,
    Staging,
    Prod,
}

impl EnvFileTarget {
    pub const ALL: [EnvFileTarget; 3] = [
        EnvFileTarget::Example,
        EnvFileTarget::Staging,
        EnvFileTarget::Prod,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            EnvFileTarget::Example => "example",
            EnvFileTarget::Staging => "staging",
            EnvFileTarget::Prod => "prod",
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            EnvFileTarget::Example => ".env.example",
            EnvFileTarget::Staging => ".env.staging",
            EnvFileTarget::Prod => ".env.prod",
        }
    }

    /// Stage the synthesized fix is filed under.
    pub fn stage(&self) -> Stage {
        match self {
            EnvFileTarget::Example => Stage::Dev,
            EnvFileTarget::Staging => Stage::Staging,
            EnvFileTarget::Prod => Stage::Prod,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            EnvFileTarget::Example => Severity::Warning,
            EnvFileTarget::Staging | EnvFileTarget::Prod => Severity::Critical,
        }
    }

    /// Environment that must be configured for the check to apply.
    fn gating_stage(&self) -> Option<Stage> {
        match self {
            EnvFileTarget::Example => None,
            EnvFileTarget::Staging => Some(Stage::Staging),
            EnvFileTarget::Prod => Some(Stage::Prod),
        }
    }

    pub fn fix_id(&self, var: &str) -> String {
        format!("missing-env-{}-{}", self.label(), var.to_lowercase())
    }
}

/// Build the three env-file checks for one required variable.
pub fn synthesize_env_fixes(plugin_id: &str, var: &str) -> Vec<Fix> {
    EnvFileTarget::ALL
        .into_iter()
        .map(|target| env_file_fix(plugin_id, var, target))
        .collect()
}

fn env_file_fix(plugin_id: &str, var: &str, target: EnvFileTarget) -> Fix {
    let name = var.to_string();
    let file = target.file_name();
    Fix::new(
        target.fix_id(var),
        target.stage(),
        target.severity(),
        format!("{} missing in {}", var, file),
        move |config, ctx| {
            if let Some(stage) = target.gating_stage()
                && !config.stage_configured(stage)
            {
                return Ok(Detection::NotApplicable);
            }
            let path = ctx.project_path(file);
            if !path.exists() {
                return Ok(Detection::ProblemDetected);
            }
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Ok(Detection::from_problem(!has_assignment(&content, &name)))
        },
    )
    .with_manual_fix(format!("Add {}=<value> to {}", var, file))
    .with_plugin(plugin_id)
}

/// Whether an env file assigns `name` as `NAME=`, optionally after
/// `export `. An empty value still counts; `NAME = value` does not.
pub fn has_assignment(content: &str, name: &str) -> bool {
    content.lines().any(|line| {
        let line = line.trim_start();
        let line = line.strip_prefix("export ").unwrap_or(line).trim_start();
        line.strip_prefix(name).is_some_and(|rest| rest.starts_with('='))
    })
}
