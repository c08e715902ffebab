//! Scan command implementation.
//!
//! Runs the detectors of every requested, locally reachable stage and hands
//! remote stages to their owning pipeline's scan hook.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};

use crate::config::ProjectConfig;
use crate::context::ExecutionContext;
use crate::error::DriftError;
use crate::fix::{Detection, Fix, FixCatalog};
use crate::plugin::HookOptions;
use crate::status::StageStatus;
use crate::types::{Severity, Stage, StageSet, TargetOs};

use super::context::{DriftContext, Session};
use super::routing::{
    HookRecord, StagePlan, owner_pipeline, remote_status, run_hook, unreachable_status,
};

/// Options for the scan command
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Stages to scan; empty flags mean all four
    pub stages: StageSet,
    /// Suppress remote output
    pub silent: bool,
    /// Call the owning pipeline's scan hook for remote stages
    pub delegate_remote: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            stages: StageSet::all(),
            silent: false,
            delegate_remote: true,
        }
    }
}

impl ScanOptions {
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

    pub fn with_delegate_remote(mut self, delegate: bool) -> Self {
        self.delegate_remote = delegate;
        self
    }
}

/// Detected problems per stage, each list in catalog order.
#[derive(Debug, Clone, Default)]
pub struct ScanProblems(BTreeMap<Stage, Vec<Arc<Fix>>>);

impl ScanProblems {
    pub fn get(&self, stage: Stage) -> &[Arc<Fix>] {
        self.0.get(&stage).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn insert(&mut self, stage: Stage, fixes: Vec<Arc<Fix>>) {
        if !fixes.is_empty() {
            self.0.insert(stage, fixes);
        }
    }

    /// Problems in stage order, then catalog order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Fix>> {
        self.0.values().flatten()
    }

    pub fn stages(&self) -> impl Iterator<Item = Stage> + '_ {
        self.0.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.iter().map(|f| f.id.as_str()).collect()
    }

    pub fn critical(&self) -> impl Iterator<Item = &Arc<Fix>> {
        self.iter().filter(|f| f.severity == Severity::Critical)
    }
}

/// Serializable view of a detected fix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProblemSummary {
    pub id: String,
    pub stage: Stage,
    pub severity: Severity,
    pub description: String,
    pub plugin: String,
    pub auto_fixable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_fix: Option<String>,
}

impl From<&Fix> for ProblemSummary {
    fn from(fix: &Fix) -> Self {
        Self {
            id: fix.id.clone(),
            stage: fix.stage,
            severity: fix.severity,
            description: fix.description.clone(),
            plugin: fix.plugin.clone(),
            auto_fixable: fix.has_remedy(),
            manual_fix: (!fix.manual_fix.is_empty()).then(|| fix.manual_fix.clone()),
        }
    }
}

impl Serialize for ScanProblems {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (stage, fixes) in &self.0 {
            let summaries: Vec<ProblemSummary> =
                fixes.iter().map(|f| ProblemSummary::from(f.as_ref())).collect();
            map.serialize_entry(stage.as_str(), &summaries)?;
        }
        map.end()
    }
}

/// A detector that returned an error; its fix is counted as a problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectorFailure {
    pub fix_id: String,
    pub stage: Stage,
    pub message: String,
}

/// A fix skipped because its OS filter excludes the stage's target OS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFix {
    pub fix_id: String,
    pub stage: Stage,
    pub os: TargetOs,
}

/// Result of scanning one local stage.
#[derive(Debug, Clone, Default)]
pub struct LocalScan {
    pub problems: Vec<Arc<Fix>>,
    pub detector_failures: Vec<DetectorFailure>,
    pub os_skipped: Vec<SkippedFix>,
}

/// Run the detectors of one stage in catalog order.
pub fn scan_local_stage(
    stage: Stage,
    catalog: &FixCatalog,
    config: &ProjectConfig,
    ctx: &ExecutionContext,
) -> LocalScan {
    let os = config.target_os(stage);
    let fixes = catalog.applicable(stage, os);
    let mut result = LocalScan {
        os_skipped: fixes
            .os_skipped
            .iter()
            .map(|f| SkippedFix {
                fix_id: f.id.clone(),
                stage,
                os,
            })
            .collect(),
        ..Default::default()
    };

    for fix in fixes.applicable {
        match fix.scan(config, ctx) {
            Ok(Detection::ProblemDetected) => {
                tracing::debug!(fix = %fix.id, %stage, "problem detected");
                result.problems.push(fix);
            }
            Ok(detection) => {
                tracing::trace!(fix = %fix.id, %stage, ?detection, "no problem");
            }
            Err(e) => {
                let err = DriftError::detector(&fix.id, &e);
                tracing::warn!(%stage, error = %err, "detector failed, counting as problem");
                result.detector_failures.push(DetectorFailure {
                    fix_id: fix.id.clone(),
                    stage,
                    message: format!("{:#}", e),
                });
                result.problems.push(fix);
            }
        }
    }
    result
}

/// Result of a scan pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub statuses: Vec<StageStatus>,
    pub problems: ScanProblems,
    pub detector_failures: Vec<DetectorFailure>,
    pub os_skipped: Vec<SkippedFix>,
    pub hooks: Vec<HookRecord>,
}

impl ScanReport {
    pub fn status(&self, stage: Stage) -> Option<&StageStatus> {
        self.statuses.iter().find(|s| s.stage == stage)
    }

    pub fn has_blocking_unreachable(&self) -> bool {
        self.statuses.iter().any(StageStatus::is_blocking)
    }

    pub fn has_critical(&self) -> bool {
        self.problems.critical().next().is_some()
    }

    /// No blocking stage was skipped, no critical problem was found and
    /// every remote scan that ran reported success.
    pub fn success(&self) -> bool {
        !self.has_blocking_unreachable()
            && !self.has_critical()
            && !self.hooks.iter().any(HookRecord::failed)
    }
}

/// Scan command executor
pub struct ScanCommand<'a> {
    drift: &'a DriftContext,
}

impl<'a> ScanCommand<'a> {
    pub fn new(drift: &'a DriftContext) -> Self {
        Self { drift }
    }

    pub fn execute(&self, options: &ScanOptions) -> anyhow::Result<ScanReport> {
        let session = self.drift.session()?;
        Ok(self.execute_with(&session, options))
    }

    pub(crate) fn execute_with(&self, session: &Session, options: &ScanOptions) -> ScanReport {
        let config = &self.drift.config;
        let ctx = &self.drift.ctx;
        let plan = StagePlan::build(&options.stages, config, ctx, &session.plugins);
        let mut report = ScanReport::default();

        for resolution in plan.all() {
            let stage = resolution.stage;
            if !resolution.reachability.is_reachable() {
                let reason = resolution.reachability.reason();
                tracing::debug!(%stage, ?reason, "stage unreachable");
                report.statuses.push(unreachable_status(resolution, config));
            } else if resolution.reachability.is_local() {
                let scan = scan_local_stage(stage, &session.catalog, config, ctx);
                report
                    .statuses
                    .push(StageStatus::local(stage, scan.problems.len()));
                report.detector_failures.extend(scan.detector_failures);
                report.os_skipped.extend(scan.os_skipped);
                report.problems.insert(stage, scan.problems);
            } else {
                report.statuses.push(remote_status(resolution));
            }
        }

        if options.delegate_remote {
            let opts = HookOptions {
                silent: options.silent,
            };
            for resolution in plan.remote() {
                let stage = resolution.stage;
                let Some(pipeline) = owner_pipeline(resolution, &session.plugins) else {
                    continue;
                };
                if !pipeline.hooks.scan {
                    tracing::debug!(%stage, owner = pipeline.plugin.id(), "no remote scan hook");
                    continue;
                }
                let Some(status) = report.statuses.iter_mut().find(|s| s.stage == stage) else {
                    continue;
                };
                tracing::info!(%stage, owner = pipeline.plugin.id(), "delegating scan");
                let record = run_hook(stage, pipeline, status, opts, |opts| {
                    pipeline.plugin.scan_stage(stage, config, ctx, opts)
                });
                report.hooks.push(record);
            }
        }

        report
    }
}
