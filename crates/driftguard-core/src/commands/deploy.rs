//! Deploy command implementation.
//!
//! A deploy is gated on the target stage being free of critical problems.
//! Critical problems with a remediator are fixed first; if any critical
//! problem remains the pipeline is never asked to deploy.

use serde::Serialize;

use crate::error::DriftError;
use crate::plugin::{DeployResult, HookOptions, deploy_locally};
use crate::reach::resolve;
use crate::types::{Stage, StageSet};

use super::context::DriftContext;
use super::fix::{FixOutcome, FixStatus, apply_fix};
use super::scan::{ProblemSummary, ScanCommand, ScanOptions};

/// Options for the deploy command
#[derive(Debug, Clone, Copy, Default)]
pub struct DeployOptions {
    pub silent: bool,
}

impl DeployOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }
}

/// Deploy result plus what the gate did before handing off.
#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    pub result: DeployResult,
    /// Critical problems the gate tried to fix
    pub auto_fixed: Vec<FixOutcome>,
    /// Critical problems still present; non-empty means the deploy was blocked
    pub remaining: Vec<ProblemSummary>,
    /// Pipeline that performed the deploy
    pub pipeline: Option<String>,
}

impl DeployReport {
    pub fn blocked(&self) -> bool {
        !self.remaining.is_empty()
    }
}

/// Deploy command executor
pub struct DeployCommand<'a> {
    drift: &'a DriftContext,
}

impl<'a> DeployCommand<'a> {
    pub fn new(drift: &'a DriftContext) -> Self {
        Self { drift }
    }

    pub fn execute(&self, stage: Stage, options: &DeployOptions) -> anyhow::Result<DeployReport> {
        let config = &self.drift.config;
        let ctx = &self.drift.ctx;
        let session = self.drift.session()?;

        // Gate: silent local scan of the target stage. Remote stages run
        // their own gate on the far side.
        let scan = ScanCommand::new(self.drift).execute_with(
            &session,
            &ScanOptions::new()
                .with_stages(StageSet::only(stage))
                .with_silent(true)
                .with_delegate_remote(false),
        );

        let mut auto_fixed = Vec::new();
        let mut remaining = Vec::new();
        for fix in scan.problems.critical() {
            if fix.has_remedy() {
                let outcome = apply_fix(fix, config, ctx);
                let fixed = outcome.status == FixStatus::Fixed;
                auto_fixed.push(outcome);
                if fixed {
                    continue;
                }
            }
            remaining.push(ProblemSummary::from(fix.as_ref()));
        }

        if !remaining.is_empty() {
            let err = DriftError::CriticalBlock {
                stage,
                remaining: remaining.iter().map(|p| p.id.clone()).collect(),
            };
            tracing::warn!(%stage, remaining = remaining.len(), "deploy blocked");
            let mut result = DeployResult::failed(stage, err.to_string());
            for problem in &remaining {
                let mut detail = format!("{}: {}", problem.id, problem.description);
                if let Some(manual) = &problem.manual_fix {
                    detail.push_str(&format!(" (fix: {})", manual));
                }
                result = result.with_detail(detail);
            }
            return Ok(DeployReport {
                result,
                auto_fixed,
                remaining,
                pipeline: None,
            });
        }

        let owner = resolve(stage, config, ctx, &session.plugins).owner;
        let opts = HookOptions {
            silent: options.silent,
        };

        let (result, pipeline) = match session.plugins.deploy_pipeline(owner, config) {
            Some(pipeline) => {
                tracing::info!(%stage, pipeline = pipeline.plugin.id(), "deploying");
                (
                    pipeline.plugin.deploy_stage(stage, config, ctx, opts),
                    Some(pipeline.plugin.id().to_string()),
                )
            }
            None => {
                tracing::info!(%stage, "no pipeline loaded, deploying locally");
                (
                    deploy_locally(self.drift.runner.as_ref(), stage, config, ctx, opts),
                    None,
                )
            }
        };

        Ok(DeployReport {
            result,
            auto_fixed,
            remaining,
            pipeline,
        })
    }
}
