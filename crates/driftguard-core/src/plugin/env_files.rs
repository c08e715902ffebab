//! Env-file secrets plugin.
//!
//! Owns the `.env*` files: a committed `.env.example` template, per-stage env
//! files kept out of git, and the required variables each must assign.

use std::path::Path;

use anyhow::Context;

use crate::config::ProjectConfig;
use crate::fix::{Detection, Fix};
use crate::types::{Severity, Stage};

use super::{Plugin, PluginCategory};

pub const PLUGIN_ID: &str = "env-files";

const EXAMPLE_FILE: &str = ".env.example";
const GITIGNORE: &str = ".gitignore";

/// Env files holding real values; none may be committed.
const SECRET_FILES: &[&str] = &[".env", ".env.staging", ".env.prod"];

#[derive(Debug, Clone, Default)]
pub struct EnvFilesPlugin;

impl EnvFilesPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl Plugin for EnvFilesPlugin {
    fn id(&self) -> &'static str {
        PLUGIN_ID
    }

    fn category(&self) -> PluginCategory {
        PluginCategory::Secrets
    }

    fn should_load(&self, root_dir: &Path, config: &ProjectConfig) -> bool {
        config.secrets.is_some() || root_dir.join(EXAMPLE_FILE).exists()
    }

    fn fixes(&self, _config: &ProjectConfig) -> Vec<Fix> {
        vec![example_present_fix(), gitignored_fix()]
    }

    fn required_env_vars(&self, config: &ProjectConfig) -> Vec<String> {
        config.required_secrets().to_vec()
    }
}

fn example_present_fix() -> Fix {
    Fix::new(
        "env-example-present",
        Stage::Dev,
        Severity::Warning,
        format!("{} is missing", EXAMPLE_FILE),
        |_, ctx| Ok(Detection::from_problem(!ctx.project_path(EXAMPLE_FILE).exists())),
    )
    .with_remedy(|config, ctx| {
        let path = ctx.project_path(EXAMPLE_FILE);
        std::fs::write(&path, example_template(config.required_secrets()))
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(true)
    })
    .with_manual_fix(format!(
        "Create {} listing every required variable as NAME=",
        EXAMPLE_FILE
    ))
}

fn gitignored_fix() -> Fix {
    Fix::new(
        "env-files-gitignored",
        Stage::Secrets,
        Severity::Warning,
        format!("Env files are not ignored by {}", GITIGNORE),
        |_, ctx| {
            let content = read_optional(&ctx.project_path(GITIGNORE))?;
            Ok(Detection::from_problem(!missing_ignores(&content).is_empty()))
        },
    )
    .with_remedy(|_, ctx| {
        let path = ctx.project_path(GITIGNORE);
        let mut content = read_optional(&path)?;
        let missing = missing_ignores(&content);
        if missing.is_empty() {
            return Ok(true);
        }
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str("\n# env files (driftguard)\n");
        for name in missing {
            content.push_str(name);
            content.push('\n');
        }
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(true)
    })
    .with_manual_fix(format!("Add {} to {}", SECRET_FILES.join(", "), GITIGNORE))
}

fn read_optional(path: &Path) -> anyhow::Result<String> {
    if !path.exists() {
        return Ok(String::new());
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Secret env files not covered by any `.gitignore` line.
fn missing_ignores(gitignore: &str) -> Vec<&'static str> {
    let patterns: Vec<&str> = gitignore
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| l.trim_start_matches('/'))
        .collect();
    SECRET_FILES
        .iter()
        .copied()
        .filter(|name| !patterns.iter().any(|p| ignores(p, name)))
        .collect()
}

fn ignores(pattern: &str, name: &str) -> bool {
    match pattern {
        ".env*" => true,
        ".env.*" => name != ".env",
        p => p == name,
    }
}

fn example_template(required: &[String]) -> String {
    let mut out = String::from("# Copy to .env, .env.staging and .env.prod and fill in values\n");
    for var in required {
        out.push_str(var);
        out.push_str("=\n");
    }
    out
}
