//! Configuration schema for driftguard.toml
//!
//! One file per project, at the project root. Every section is optional so a
//! fresh checkout without a config still loads (bootstrap mode).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::plugin::{BUILTIN_PIPELINE_IDS, BUILTIN_PLUGIN_IDS};
use crate::types::{Stage, TargetOs};

/// Root configuration structure for driftguard.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProjectConfig {
    /// Default pipeline plugin id (e.g. "github-actions")
    #[serde(default)]
    pub pipeline: Option<String>,

    #[serde(default)]
    pub project: ProjectSection,

    /// Server environments keyed by stage name (dev, staging, prod)
    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentConfig>,

    #[serde(default)]
    pub secrets: Option<SecretsConfig>,

    #[serde(default)]
    pub docker: Option<DockerConfig>,

    #[serde(default)]
    pub github: Option<GithubConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProjectSection {
    #[serde(default)]
    pub name: Option<String>,

    /// Project checkout on remote hosts, used for SSH delegation
    #[serde(default)]
    pub remote_dir: Option<String>,
}

/// A deployment environment (one per server-backed stage)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub os: Option<TargetOs>,

    /// Private key used for SSH delegation ("~/" is expanded)
    #[serde(default)]
    pub ssh_key: Option<String>,

    /// Plugins this environment explicitly opts into
    #[serde(default)]
    pub plugins: Vec<String>,

    /// Shell command run on the target to deploy this stage
    #[serde(default)]
    pub deploy_command: Option<String>,

    /// Overrides `project.remote_dir` for this environment
    #[serde(default)]
    pub remote_dir: Option<String>,
}

impl EnvironmentConfig {
    pub fn uses_plugin(&self, id: &str) -> bool {
        self.plugins.iter().any(|p| p == id)
    }

    /// `user@host`, or just the host when no user is configured.
    pub fn ssh_destination(&self) -> Option<String> {
        let host = self.host.as_deref()?;
        Some(match self.user.as_deref() {
            Some(user) => format!("{}@{}", user, host),
            None => host.to_string(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecretsConfig {
    /// Environment variables every env file must assign
    #[serde(default)]
    pub required: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DockerConfig {
    /// Minimum docker engine version (semver)
    #[serde(default)]
    pub min_version: Option<String>,

    /// Services rendered into docker-compose.yml
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub image: String,

    #[serde(default)]
    pub ports: Vec<String>,

    #[serde(default)]
    pub env_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    /// "owner/repo"; detected from the origin remote when absent
    #[serde(default)]
    pub repository: Option<String>,

    #[serde(default = "default_workflow")]
    pub workflow: String,

    #[serde(rename = "ref", default = "default_ref")]
    pub git_ref: String,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            repository: None,
            workflow: default_workflow(),
            git_ref: default_ref(),
            poll_interval_secs: default_poll_interval(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_workflow() -> String {
    "deploy.yml".to_string()
}

fn default_ref() -> String {
    "main".to_string()
}

fn default_poll_interval() -> u64 {
    5
}

fn default_timeout() -> u64 {
    900
}

impl ProjectConfig {
    /// Create an empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Environment backing a stage, if configured.
    pub fn environment(&self, stage: Stage) -> Option<&EnvironmentConfig> {
        if !stage.has_environment() {
            return None;
        }
        self.environments.get(stage.as_str())
    }

    /// Whether the project declares this stage at all.
    ///
    /// `dev` and `secrets` always exist; `staging` and `prod` need an
    /// `[environments.<stage>]` table.
    pub fn stage_configured(&self, stage: Stage) -> bool {
        match stage {
            Stage::Dev | Stage::Secrets => true,
            Stage::Staging | Stage::Prod => self.environments.contains_key(stage.as_str()),
        }
    }

    /// OS of the machine a stage runs on.
    ///
    /// Local stages default to the current OS, server stages to linux.
    pub fn target_os(&self, stage: Stage) -> TargetOs {
        if let Some(os) = self.environment(stage).and_then(|e| e.os) {
            return os;
        }
        match stage {
            Stage::Dev | Stage::Secrets => TargetOs::current(),
            Stage::Staging | Stage::Prod => TargetOs::Linux,
        }
    }

    /// Remote checkout directory for a stage.
    pub fn remote_dir(&self, stage: Stage) -> Option<&str> {
        self.environment(stage)
            .and_then(|e| e.remote_dir.as_deref())
            .or(self.project.remote_dir.as_deref())
    }

    pub fn required_secrets(&self) -> &[String] {
        self.secrets
            .as_ref()
            .map(|s| s.required.as_slice())
            .unwrap_or(&[])
    }

    pub fn github_or_default(&self) -> GithubConfig {
        self.github.clone().unwrap_or_default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, env) in &self.environments {
            let stage: Stage = name.parse().map_err(|_| {
                anyhow::anyhow!("Unknown environment '{}': use dev, staging, or prod", name)
            })?;
            if stage == Stage::Secrets {
                anyhow::bail!("'secrets' is not a server environment; use the [secrets] table");
            }
            if stage.as_str() != name {
                anyhow::bail!(
                    "Environment '{}' must be spelled '{}'",
                    name,
                    stage.as_str()
                );
            }
            for plugin in &env.plugins {
                if !BUILTIN_PLUGIN_IDS.contains(&plugin.as_str()) {
                    anyhow::bail!(
                        "Environment '{}' names unknown plugin '{}' (known: {})",
                        name,
                        plugin,
                        BUILTIN_PLUGIN_IDS.join(", ")
                    );
                }
            }
        }

        if let Some(pipeline) = &self.pipeline
            && !BUILTIN_PIPELINE_IDS.contains(&pipeline.as_str())
        {
            anyhow::bail!(
                "'{}' is not a pipeline plugin (known: {})",
                pipeline,
                BUILTIN_PIPELINE_IDS.join(", ")
            );
        }

        if let Some(github) = &self.github {
            if github.poll_interval_secs == 0 {
                anyhow::bail!("github.poll_interval_secs must be at least 1");
            }
            if github.timeout_secs == 0 {
                anyhow::bail!("github.timeout_secs must be at least 1");
            }
        }

        if let Some(min) = self.docker.as_ref().and_then(|d| d.min_version.as_deref()) {
            semver::Version::parse(min)
                .map_err(|e| anyhow::anyhow!("Invalid docker.min_version '{}': {}", min, e))?;
        }

        for secret in self.required_secrets() {
            if secret.is_empty() || secret.contains('=') || secret.contains(char::is_whitespace) {
                anyhow::bail!("Invalid secret name '{}'", secret);
            }
        }

        Ok(())
    }
}
