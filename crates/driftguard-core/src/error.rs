//! Error taxonomy for drift detection and remediation.

use crate::types::Stage;

/// Errors recorded or raised by the orchestration passes.
///
/// Per-fix variants (`Detector`, `Remediator`) are captured into reports and
/// never abort a pass; only `CriticalBlock` stops a deploy.
#[derive(Debug, thiserror::Error)]
pub enum DriftError {
    #[error("detector '{fix_id}' failed: {message}")]
    Detector { fix_id: String, message: String },

    #[error("remediator '{fix_id}' failed: {message}")]
    Remediator { fix_id: String, message: String },

    #[error("remediator '{fix_id}' reported no change")]
    RemediatorDeclined { fix_id: String },

    #[error("stage {stage} is unreachable: {reason}")]
    UnreachableStage { stage: Stage, reason: String },

    #[error("Critical issues remain")]
    CriticalBlock { stage: Stage, remaining: Vec<String> },

    #[error("duplicate fix id '{id}' (from plugins '{first}' and '{second}')")]
    DuplicateFixId {
        id: String,
        first: String,
        second: String,
    },

    #[error("remote {operation} for {stage} failed: {message}")]
    Remote {
        stage: Stage,
        operation: String,
        message: String,
    },

    #[error("timed out after {seconds}s waiting for {what}")]
    Timeout { what: String, seconds: u64 },
}

impl DriftError {
    pub fn detector(fix_id: &str, err: &anyhow::Error) -> Self {
        DriftError::Detector {
            fix_id: fix_id.to_string(),
            message: format!("{:#}", err),
        }
    }

    pub fn remediator(fix_id: &str, err: &anyhow::Error) -> Self {
        DriftError::Remediator {
            fix_id: fix_id.to_string(),
            message: format!("{:#}", err),
        }
    }
}
