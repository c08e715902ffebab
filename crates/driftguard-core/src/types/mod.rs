//! Shared core types used across configuration, plugins and orchestration.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Deployment stage.
///
/// The declaration order is significant: `Ord` follows it, and every pass walks
/// stages through [`Stage::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Dev,
    Secrets,
    Staging,
    Prod,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Dev, Stage::Secrets, Stage::Staging, Stage::Prod];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Dev => "dev",
            Stage::Secrets => "secrets",
            Stage::Staging => "staging",
            Stage::Prod => "prod",
        }
    }

    /// Stages backed by a server environment in `driftguard.toml`.
    pub fn has_environment(&self) -> bool {
        !matches!(self, Stage::Secrets)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Stage::Dev),
            "secrets" => Ok(Stage::Secrets),
            "staging" | "stage" => Ok(Stage::Staging),
            "prod" | "production" => Ok(Stage::Prod),
            _ => anyhow::bail!(
                "Unknown stage: {}. Use 'dev', 'secrets', 'staging', or 'prod'",
                s
            ),
        }
    }
}

/// A set of requested stages, always iterated in stage order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StageSet(BTreeSet<Stage>);

impl StageSet {
    pub fn all() -> Self {
        Self(Stage::ALL.into_iter().collect())
    }

    pub fn only(stage: Stage) -> Self {
        Self([stage].into_iter().collect())
    }

    /// Explicit flags override; no flag means every stage.
    pub fn from_flags(stages: &[Stage]) -> Self {
        if stages.is_empty() {
            Self::all()
        } else {
            Self(stages.iter().copied().collect())
        }
    }

    pub fn contains(&self, stage: Stage) -> bool {
        self.0.contains(&stage)
    }

    pub fn insert(&mut self, stage: Stage) {
        self.0.insert(stage);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Stage> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Stage> for StageSet {
    fn from_iter<I: IntoIterator<Item = Stage>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Fix severity. Critical problems block deploys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operating system of a stage's server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetOs {
    Linux,
    Darwin,
    Windows,
}

impl TargetOs {
    /// The OS this process runs on.
    pub fn current() -> Self {
        match std::env::consts::OS {
            "macos" => TargetOs::Darwin,
            "windows" => TargetOs::Windows,
            _ => TargetOs::Linux,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetOs::Linux => "linux",
            TargetOs::Darwin => "darwin",
            TargetOs::Windows => "windows",
        }
    }
}

impl fmt::Display for TargetOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetOs {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "linux" => Ok(TargetOs::Linux),
            "darwin" | "macos" => Ok(TargetOs::Darwin),
            "windows" => Ok(TargetOs::Windows),
            _ => anyhow::bail!("Unknown os: {}. Use 'linux', 'darwin', or 'windows'", s),
        }
    }
}

/// OS restriction on a fix: a single OS or a set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsFilter(Vec<TargetOs>);

impl OsFilter {
    pub fn only(os: TargetOs) -> Self {
        Self(vec![os])
    }

    pub fn any_of(os: impl IntoIterator<Item = TargetOs>) -> Self {
        Self(os.into_iter().collect())
    }

    pub fn matches(&self, os: TargetOs) -> bool {
        self.0.contains(&os)
    }
}
