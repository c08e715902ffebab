//! Stage reachability and its resolution across pipeline plugins.

use std::fmt;

use serde::Serialize;

use crate::config::ProjectConfig;
use crate::context::ExecutionContext;
use crate::plugin::LoadedPlugins;
use crate::types::Stage;

/// How a reachable stage is acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Via {
    /// In this process
    Local,
    /// By dispatching a CI workflow run
    Workflow,
    /// Over an SSH session to the stage's host
    Ssh,
}

impl Via {
    pub fn as_str(&self) -> &'static str {
        match self {
            Via::Local => "local",
            Via::Workflow => "workflow",
            Via::Ssh => "ssh",
        }
    }
}

impl fmt::Display for Via {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Reachability {
    Reachable {
        via: Via,
    },
    Unreachable {
        reason: String,
        /// Command or config change that would make the stage reachable
        suggestion: Option<String>,
    },
}

impl Reachability {
    pub fn local() -> Self {
        Reachability::Reachable { via: Via::Local }
    }

    pub fn via(via: Via) -> Self {
        Reachability::Reachable { via }
    }

    pub fn unreachable(reason: impl Into<String>) -> Self {
        Reachability::Unreachable {
            reason: reason.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(self, hint: impl Into<String>) -> Self {
        match self {
            Reachability::Unreachable { reason, .. } => Reachability::Unreachable {
                reason,
                suggestion: Some(hint.into()),
            },
            reachable => reachable,
        }
    }

    pub fn is_reachable(&self) -> bool {
        matches!(self, Reachability::Reachable { .. })
    }

    pub fn via_kind(&self) -> Option<Via> {
        match self {
            Reachability::Reachable { via } => Some(*via),
            Reachability::Unreachable { .. } => None,
        }
    }

    pub fn is_local(&self) -> bool {
        self.via_kind() == Some(Via::Local)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Reachability::Unreachable { reason, .. } => Some(reason),
            Reachability::Reachable { .. } => None,
        }
    }
}

/// Reachability of one stage plus the pipeline that vouched for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub stage: Stage,
    pub reachability: Reachability,
    /// Pipeline plugin that reported the stage reachable
    pub owner: Option<&'static str>,
}

/// Ask each loaded pipeline, in registry order, whether it can reach `stage`.
///
/// The first reachable answer wins. With no pipeline loaded every stage is
/// local. When nobody can reach the stage, the configured default pipeline's
/// reason is reported, falling back to the last pipeline asked.
pub fn resolve(
    stage: Stage,
    config: &ProjectConfig,
    ctx: &ExecutionContext,
    plugins: &LoadedPlugins,
) -> Resolution {
    let pipelines = plugins.pipelines();
    if pipelines.is_empty() {
        tracing::debug!(%stage, "no pipeline plugin loaded, treating stage as local");
        return Resolution {
            stage,
            reachability: Reachability::local(),
            owner: None,
        };
    }

    let mut negatives: Vec<(&'static str, Reachability)> = Vec::new();
    for pipeline in pipelines {
        let id = pipeline.plugin.id();
        let reachability = pipeline.plugin.can_reach(stage, config, ctx);
        tracing::debug!(%stage, pipeline = id, ?reachability, "can_reach");
        if reachability.is_reachable() {
            return Resolution {
                stage,
                reachability,
                owner: Some(id),
            };
        }
        negatives.push((id, reachability));
    }

    let preferred = config
        .pipeline
        .as_deref()
        .and_then(|default| negatives.iter().position(|(id, _)| *id == default));
    let reachability = match preferred {
        Some(idx) => negatives.swap_remove(idx).1,
        None => negatives
            .pop()
            .map(|(_, r)| r)
            .unwrap_or_else(|| Reachability::unreachable("no pipeline plugin loaded")),
    };

    Resolution {
        stage,
        reachability,
        owner: None,
    }
}
