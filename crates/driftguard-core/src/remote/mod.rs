//! Remote execution: local commands, SSH delegation and workflow dispatch.

pub mod poll;
pub mod runner;
pub mod ssh;
pub mod workflow;

pub use poll::{Poll, PollPolicy, poll_until};
pub use runner::{CommandOutput, CommandRunner, CommandSpec, ProcessRunner, RecordingRunner};
pub use ssh::{SshTarget, remote_invocation, resolve_ssh_key};
pub use workflow::{GithubWorkflowClient, WorkflowApi, WorkflowInputs, WorkflowRun, run_workflow};
