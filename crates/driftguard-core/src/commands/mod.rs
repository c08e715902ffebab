//! High-level commands for driftguard operations.
//!
//! Each command rebuilds the plugin set, fix catalog and stage routing from a
//! [`DriftContext`] and returns a report; frontends decide how to print it.

pub mod context;
pub mod deploy;
pub mod fix;
pub mod plugins;
pub mod routing;
pub mod scan;

pub use context::{DriftContext, Session};
pub use deploy::{DeployCommand, DeployOptions, DeployReport};
pub use fix::{FixCommand, FixCounts, FixOptions, FixOutcome, FixReport, FixStatus, apply_fix};
pub use plugins::{PluginInfo, list_plugins};
pub use routing::{HookRecord, StagePlan};
pub use scan::{
    DetectorFailure, ProblemSummary, ScanCommand, ScanOptions, ScanProblems, ScanReport,
    SkippedFix, scan_local_stage,
};
