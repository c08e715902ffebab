//! Fix command implementation.
//!
//! Scans the local stages, runs the remediator of every detected problem in
//! stage then catalog order, and delegates remote stages to the owning
//! pipeline's fix hook (or fixes them here when it has none).

use serde::Serialize;

use crate::config::ProjectConfig;
use crate::context::ExecutionContext;
use crate::error::DriftError;
use crate::fix::Fix;
use crate::plugin::HookOptions;
use crate::status::StageStatus;
use crate::types::{Stage, StageSet};

use super::context::{DriftContext, Session};
use super::routing::{
    HookRecord, StagePlan, owner_pipeline, remote_status, run_hook, unreachable_status,
};
use super::scan::{DetectorFailure, SkippedFix, scan_local_stage};

/// Options for the fix command
#[derive(Debug, Clone)]
pub struct FixOptions {
    pub stages: StageSet,
    pub silent: bool,
}

impl Default for FixOptions {
    fn default() -> Self {
        Self {
            stages: StageSet::all(),
            silent: false,
        }
    }
}

impl FixOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stages(mut self, stages: StageSet) -> Self {
        self.stages = stages;
        self
    }

    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FixStatus {
    Fixed,
    Manual,
    Failed,
}

impl FixStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FixStatus::Fixed => "fixed",
            FixStatus::Manual => "manual",
            FixStatus::Failed => "failed",
        }
    }
}

/// What happened to one detected problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixOutcome {
    pub id: String,
    pub stage: Stage,
    pub status: FixStatus,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_fix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FixCounts {
    pub fixed: usize,
    pub manual: usize,
    pub failed: usize,
}

/// Run the remediator of one detected problem and record the outcome.
///
/// `Ok(true)` is fixed; `Ok(false)` and errors are failed; no remediator is
/// manual. Failures never propagate.
pub fn apply_fix(fix: &Fix, config: &ProjectConfig, ctx: &ExecutionContext) -> FixOutcome {
    let manual_fix = (!fix.manual_fix.is_empty()).then(|| fix.manual_fix.clone());
    let (status, error) = match fix.apply(config, ctx) {
        None => (FixStatus::Manual, None),
        Some(Ok(true)) => {
            tracing::info!(fix = %fix.id, stage = %fix.stage, "fixed");
            (FixStatus::Fixed, None)
        }
        Some(Ok(false)) => {
            let err = DriftError::RemediatorDeclined {
                fix_id: fix.id.clone(),
            };
            tracing::warn!(error = %err, "remediation failed");
            (FixStatus::Failed, Some(err.to_string()))
        }
        Some(Err(e)) => {
            let err = DriftError::remediator(&fix.id, &e);
            tracing::warn!(error = %err, "remediation failed");
            (FixStatus::Failed, Some(format!("{:#}", e)))
        }
    };
    FixOutcome {
        id: fix.id.clone(),
        stage: fix.stage,
        status,
        description: fix.description.clone(),
        manual_fix,
        error,
    }
}

/// Result of a fix pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FixReport {
    pub counts: FixCounts,
    /// In stage order, then catalog order
    pub outcomes: Vec<FixOutcome>,
    pub statuses: Vec<StageStatus>,
    pub detector_failures: Vec<DetectorFailure>,
    pub os_skipped: Vec<SkippedFix>,
    pub hooks: Vec<HookRecord>,
}

impl FixReport {
    fn record(&mut self, outcome: FixOutcome) {
        match outcome.status {
            FixStatus::Fixed => self.counts.fixed += 1,
            FixStatus::Manual => self.counts.manual += 1,
            FixStatus::Failed => self.counts.failed += 1,
        }
        self.outcomes.push(outcome);
    }

    pub fn status(&self, stage: Stage) -> Option<&StageStatus> {
        self.statuses.iter().find(|s| s.stage == stage)
    }

    pub fn outcomes_with(&self, status: FixStatus) -> impl Iterator<Item = &FixOutcome> {
        self.outcomes.iter().filter(move |o| o.status == status)
    }

    pub fn has_blocking_unreachable(&self) -> bool {
        self.statuses.iter().any(StageStatus::is_blocking)
    }

    /// No fix or remote fix failed and no blocking stage was skipped.
    pub fn success(&self) -> bool {
        self.counts.failed == 0
            && !self.hooks.iter().any(HookRecord::failed)
            && !self.has_blocking_unreachable()
    }
}

/// Fix command executor
pub struct FixCommand<'a> {
    drift: &'a DriftContext,
}

impl<'a> FixCommand<'a> {
    pub fn new(drift: &'a DriftContext) -> Self {
        Self { drift }
    }

    pub fn execute(&self, options: &FixOptions) -> anyhow::Result<FixReport> {
        let session = self.drift.session()?;
        Ok(self.execute_with(&session, options))
    }

    fn execute_with(&self, session: &Session, options: &FixOptions) -> FixReport {
        let config = &self.drift.config;
        let ctx = &self.drift.ctx;
        let plan = StagePlan::build(&options.stages, config, ctx, &session.plugins);
        let mut report = FixReport::default();

        for resolution in plan.all() {
            if !resolution.reachability.is_reachable() {
                report.statuses.push(unreachable_status(resolution, config));
            } else if resolution.reachability.is_local() {
                self.fix_locally(resolution.stage, session, &mut report);
            } else {
                report.statuses.push(remote_status(resolution));
            }
        }

        let opts = HookOptions {
            silent: options.silent,
        };
        for resolution in plan.remote() {
            let stage = resolution.stage;
            let pipeline = owner_pipeline(resolution, &session.plugins);
            match pipeline.filter(|p| p.hooks.fix) {
                Some(pipeline) => {
                    let Some(status) = report.statuses.iter_mut().find(|s| s.stage == stage)
                    else {
                        continue;
                    };
                    tracing::info!(%stage, owner = pipeline.plugin.id(), "delegating fix");
                    let record = run_hook(stage, pipeline, status, opts, |opts| {
                        pipeline.plugin.fix_stage(stage, config, ctx, opts)
                    });
                    report.hooks.push(record);
                }
                None => {
                    tracing::info!(%stage, "no remote fix hook, fixing locally");
                    report.statuses.retain(|s| s.stage != stage);
                    self.fix_locally(stage, session, &mut report);
                }
            }
        }

        // Local fallbacks may have appended out of order.
        report.statuses.sort_by_key(|s| s.stage);
        report
    }

    fn fix_locally(&self, stage: Stage, session: &Session, report: &mut FixReport) {
        let config = &self.drift.config;
        let ctx = &self.drift.ctx;
        let scan = scan_local_stage(stage, &session.catalog, config, ctx);
        report.detector_failures.extend(scan.detector_failures);
        report.os_skipped.extend(scan.os_skipped);

        let mut unresolved = 0;
        for fix in &scan.problems {
            let outcome = apply_fix(fix, config, ctx);
            if outcome.status != FixStatus::Fixed {
                unresolved += 1;
            }
            report.record(outcome);
        }
        report.statuses.push(StageStatus::local(stage, unresolved));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fix::Detection;
    use crate::types::Severity;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("/work".into(), "/home/u".into(), Default::default())
    }

    fn problem(id: &str) -> Fix {
        Fix::new(id, Stage::Dev, Severity::Warning, "drift", |_, _| {
            Ok(Detection::ProblemDetected)
        })
    }

    #[test]
    fn test_apply_fix_statuses() {
        let config = ProjectConfig::new();

        let fixed = apply_fix(&problem("a").with_remedy(|_, _| Ok(true)), &config, &ctx());
        assert_eq!(fixed.status, FixStatus::Fixed);

        let declined = apply_fix(&problem("b").with_remedy(|_, _| Ok(false)), &config, &ctx());
        assert_eq!(declined.status, FixStatus::Failed);
        assert!(declined.error.unwrap().contains("reported no change"));

        let errored = apply_fix(
            &problem("c").with_remedy(|_, _| anyhow::bail!("permission denied")),
            &config,
            &ctx(),
        );
        assert_eq!(errored.status, FixStatus::Failed);
        assert_eq!(errored.error.as_deref(), Some("permission denied"));

        let manual = apply_fix(
            &problem("d").with_manual_fix("do it by hand"),
            &config,
            &ctx(),
        );
        assert_eq!(manual.status, FixStatus::Manual);
        assert_eq!(manual.manual_fix.as_deref(), Some("do it by hand"));
        assert!(manual.error.is_none());
    }

    #[test]
    fn test_report_counts_and_success() {
        let mut report = FixReport::default();
        let fixable = problem("a").with_remedy(|_, _| Ok(true));
        report.record(apply_fix(&fixable, &ProjectConfig::new(), &ctx()));
        report.record(apply_fix(&problem("b"), &ProjectConfig::new(), &ctx()));
        assert_eq!(
            report.counts,
            FixCounts {
                fixed: 1,
                manual: 1,
                failed: 0
            }
        );
        assert!(report.success());

        report.record(apply_fix(
            &problem("c").with_remedy(|_, _| Ok(false)),
            &ProjectConfig::new(),
            &ctx(),
        ));
        assert!(!report.success());
        assert_eq!(report.outcomes_with(FixStatus::Failed).count(), 1);
    }
}
