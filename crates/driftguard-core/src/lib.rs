//! Driftguard Core Library
//!
//! Detects and repairs configuration drift across the `dev`, `secrets`,
//! `staging` and `prod` stages of a project, delegating stages that cannot be
//! reached from this machine to a pipeline plugin.

pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod fix;
pub mod git;
pub mod plugin;
pub mod reach;
pub mod remote;
pub mod status;
pub mod types;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{ConfigStore, EnvironmentConfig, ProjectConfig};
    pub use crate::context::ExecutionContext;

    // Commands
    pub use crate::commands::{
        DeployCommand, DeployOptions, DeployReport, DriftContext, FixCommand, FixOptions,
        FixReport, FixStatus, ScanCommand, ScanOptions, ScanReport,
    };

    // Plugins and fixes
    pub use crate::fix::{Detection, Fix, FixCatalog};
    pub use crate::plugin::{
        DeployResult, HookOptions, HookOutcome, PipelinePlugin, Plugin, PluginCategory,
        PluginRegistry, RemoteHooks,
    };

    // Routing
    pub use crate::reach::{Reachability, Resolution, Via};
    pub use crate::status::{StageState, StageStatus};

    pub use crate::error::DriftError;
    pub use crate::types::{OsFilter, Severity, Stage, StageSet, TargetOs};
}
