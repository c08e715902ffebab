//! Stage routing: resolve every requested stage and partition the result.

use crate::config::ProjectConfig;
use crate::context::ExecutionContext;
use crate::plugin::{HookOptions, LoadedPipeline, LoadedPlugins};
use crate::reach::{Reachability, Resolution, resolve};
use crate::status::{StageState, StageStatus};
use crate::types::{Stage, StageSet};

/// Resolutions for the requested stages, in stage order.
#[derive(Debug, Clone, Default)]
pub struct StagePlan {
    resolutions: Vec<Resolution>,
}

impl StagePlan {
    pub fn build(
        stages: &StageSet,
        config: &ProjectConfig,
        ctx: &ExecutionContext,
        plugins: &LoadedPlugins,
    ) -> Self {
        let resolutions = stages
            .iter()
            .map(|stage| resolve(stage, config, ctx, plugins))
            .collect();
        Self { resolutions }
    }

    pub fn all(&self) -> &[Resolution] {
        &self.resolutions
    }

    pub fn get(&self, stage: Stage) -> Option<&Resolution> {
        self.resolutions.iter().find(|r| r.stage == stage)
    }

    /// Stages acted on in this process.
    pub fn local(&self) -> impl Iterator<Item = &Resolution> {
        self.resolutions.iter().filter(|r| r.reachability.is_local())
    }

    /// Stages reachable only through a pipeline's remote hooks.
    pub fn remote(&self) -> impl Iterator<Item = &Resolution> {
        self.resolutions
            .iter()
            .filter(|r| r.reachability.is_reachable() && !r.reachability.is_local())
    }

    pub fn unreachable(&self) -> impl Iterator<Item = &Resolution> {
        self.resolutions
            .iter()
            .filter(|r| !r.reachability.is_reachable())
    }
}

/// Status for an unreachable stage; blocking when the project configures it.
pub fn unreachable_status(resolution: &Resolution, config: &ProjectConfig) -> StageStatus {
    let (reason, suggestion) = match &resolution.reachability {
        Reachability::Unreachable { reason, suggestion } => (reason.clone(), suggestion.clone()),
        Reachability::Reachable { .. } => (String::new(), None),
    };
    StageStatus::with_state(
        resolution.stage,
        StageState::Unreachable {
            reason,
            suggestion,
            blocking: config.stage_configured(resolution.stage),
        },
    )
}

/// Status for a remote stage before any hook has run.
pub fn remote_status(resolution: &Resolution) -> StageStatus {
    StageStatus::with_state(
        resolution.stage,
        StageState::RemoteDelegated {
            via: resolution.reachability.via_kind().unwrap_or(crate::reach::Via::Local),
            owner: resolution.owner.map(str::to_string),
            handled: None,
            detail: None,
        },
    )
}

/// Pipeline that owns a remote stage.
pub fn owner_pipeline<'a>(
    resolution: &Resolution,
    plugins: &'a LoadedPlugins,
) -> Option<&'a LoadedPipeline> {
    resolution.owner.and_then(|id| plugins.pipeline(id))
}

/// Outcome of calling a remote scan or fix hook for one stage.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct HookRecord {
    pub stage: Stage,
    pub owner: String,
    pub handled: bool,
    pub detail: Option<String>,
    pub error: Option<String>,
}

impl HookRecord {
    pub fn failed(&self) -> bool {
        !self.handled
    }
}

/// Run a hook and fold its result into a record and the stage status.
pub(crate) fn run_hook<F>(
    stage: Stage,
    pipeline: &LoadedPipeline,
    status: &mut StageStatus,
    opts: HookOptions,
    call: F,
) -> HookRecord
where
    F: FnOnce(HookOptions) -> anyhow::Result<crate::plugin::HookOutcome>,
{
    let owner = pipeline.plugin.id().to_string();
    let record = match call(opts) {
        Ok(outcome) => HookRecord {
            stage,
            owner,
            handled: outcome.handled,
            detail: outcome.detail,
            error: None,
        },
        Err(e) => {
            tracing::warn!(%stage, error = %format!("{:#}", e), "remote hook failed");
            HookRecord {
                stage,
                owner,
                handled: false,
                detail: None,
                error: Some(format!("{:#}", e)),
            }
        }
    };
    if let StageState::RemoteDelegated {
        handled, detail, ..
    } = &mut status.state
    {
        *handled = Some(record.handled);
        *detail = record.detail.clone().or_else(|| record.error.clone());
    }
    record
}
