//! SSH delegation: run driftguard on a stage's host with the system `ssh`.

use std::path::PathBuf;

use crate::config::{EnvironmentConfig, ProjectConfig};
use crate::context::{ExecutionContext, REMOTE_ENV_VAR};
use crate::types::Stage;

use super::runner::{CommandOutput, CommandRunner, CommandSpec};

/// Keys tried, in order, when an environment names none.
const DEFAULT_KEYS: &[&str] = &["~/.ssh/id_ed25519", "~/.ssh/id_ecdsa", "~/.ssh/id_rsa"];

const CONNECT_TIMEOUT_SECS: u32 = 10;

/// Where and how to reach a stage's host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub destination: String,
    pub port: Option<u16>,
    pub key: Option<PathBuf>,
    pub remote_dir: Option<String>,
}

impl SshTarget {
    pub fn for_stage(
        stage: Stage,
        config: &ProjectConfig,
        ctx: &ExecutionContext,
    ) -> anyhow::Result<Self> {
        let env = config
            .environment(stage)
            .ok_or_else(|| anyhow::anyhow!("{} has no environment configured", stage))?;
        let destination = env
            .ssh_destination()
            .ok_or_else(|| anyhow::anyhow!("{} environment has no host", stage))?;
        Ok(Self {
            destination,
            port: env.port,
            key: resolve_ssh_key(Some(env), ctx),
            remote_dir: config.remote_dir(stage).map(str::to_string),
        })
    }

    /// `ssh ... <destination> "cd <dir> && <remote_command>"`
    pub fn command(&self, remote_command: &str) -> CommandSpec {
        let mut spec = CommandSpec::new("ssh").args([
            "-o",
            "BatchMode=yes",
            "-o",
            &format!("ConnectTimeout={}", CONNECT_TIMEOUT_SECS),
        ]);
        if let Some(port) = self.port {
            spec = spec.arg("-p").arg(port.to_string());
        }
        if let Some(key) = &self.key {
            spec = spec.arg("-i").arg(key.to_string_lossy());
        }
        let script = match &self.remote_dir {
            Some(dir) => format!("cd {} && {}", shell_quote(dir), remote_command),
            None => remote_command.to_string(),
        };
        spec.arg(&self.destination).arg(script)
    }

    pub fn run(
        &self,
        runner: &dyn CommandRunner,
        remote_command: &str,
        silent: bool,
    ) -> anyhow::Result<CommandOutput> {
        tracing::info!(
            destination = %self.destination,
            command = remote_command,
            "running over ssh"
        );
        runner.run(&self.command(remote_command), !silent)
    }
}

/// The configured key if it exists, else the first default key that exists.
pub fn resolve_ssh_key(env: Option<&EnvironmentConfig>, ctx: &ExecutionContext) -> Option<PathBuf> {
    if let Some(configured) = env.and_then(|e| e.ssh_key.as_deref()) {
        let path = ctx.expand_home(configured);
        return path.exists().then_some(path);
    }
    DEFAULT_KEYS
        .iter()
        .map(|k| ctx.expand_home(k))
        .find(|p| p.exists())
}

/// Key paths searched for a stage, for error messages.
pub fn searched_keys(env: Option<&EnvironmentConfig>) -> String {
    match env.and_then(|e| e.ssh_key.as_deref()) {
        Some(configured) => configured.to_string(),
        None => DEFAULT_KEYS.join(", "),
    }
}

/// The driftguard command line a remote executor runs for `stage`.
pub fn remote_invocation(subcommand: &str, stage: Stage, silent: bool) -> String {
    let mut line = match subcommand {
        "deploy" => format!("{}=1 driftguard deploy {} --remote", REMOTE_ENV_VAR, stage),
        other => format!("{}=1 driftguard {} --{} --remote", REMOTE_ENV_VAR, other, stage),
    };
    if silent {
        line.push_str(" --silent");
    }
    line
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
