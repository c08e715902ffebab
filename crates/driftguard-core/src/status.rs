//! Per-stage status as reported by the scan, fix and deploy passes.

use serde::Serialize;

use crate::reach::Via;
use crate::types::Stage;

/// Where a stage ended up after routing and (for local stages) scanning.
///
/// `Unreachable` is terminal for the pass.
/// `LocalWithProblems` becomes `LocalReady` only through a fix pass that
/// resolved every problem of the stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StageState {
    Unreachable {
        reason: String,
        suggestion: Option<String>,
        /// The project configures this stage, so skipping it is a failure
        blocking: bool,
    },
    RemoteDelegated {
        via: Via,
        owner: Option<String>,
        /// `None` when no remote hook ran
        handled: Option<bool>,
        detail: Option<String>,
    },
    LocalWithProblems {
        count: usize,
    },
    LocalReady,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageStatus {
    pub stage: Stage,
    #[serde(flatten)]
    pub state: StageState,
}

impl StageStatus {
    pub fn with_state(stage: Stage, state: StageState) -> Self {
        Self { stage, state }
    }

    /// Local stage state from the number of unresolved problems.
    pub fn local(stage: Stage, problems: usize) -> Self {
        let state = if problems == 0 {
            StageState::LocalReady
        } else {
            StageState::LocalWithProblems { count: problems }
        };
        Self { stage, state }
    }

    pub fn is_blocking(&self) -> bool {
        matches!(self.state, StageState::Unreachable { blocking: true, .. })
    }

    /// One-line summary, e.g. `staging  unreachable: no SSH key`.
    pub fn line(&self) -> String {
        let stage = format!("{:<8}", self.stage.as_str());
        match &self.state {
            StageState::Unreachable { reason, .. } => {
                format!("{} unreachable: {}", stage, reason)
            }
            StageState::RemoteDelegated {
                via,
                owner,
                handled,
                detail,
            } => {
                let mut line = format!("{} remote via {}", stage, via);
                if let Some(owner) = owner {
                    line.push_str(&format!(" ({})", owner));
                }
                match handled {
                    Some(true) => line.push_str(", handled"),
                    Some(false) => line.push_str(", not handled"),
                    None => {}
                }
                if let Some(detail) = detail {
                    line.push_str(&format!(": {}", detail));
                }
                line
            }
            StageState::LocalWithProblems { count } => {
                let noun = if *count == 1 { "issue" } else { "issues" };
                format!("{} local, {} {}", stage, count, noun)
            }
            StageState::LocalReady => format!("{} local, ready", stage),
        }
    }
}
