//! Command runner abstraction for executing external programs.
//!
//! `CommandRunner` is the seam every fix and hook uses to run commands.
//! `ProcessRunner` spawns real processes; `RecordingRunner` records calls and
//! returns canned output for tests.

use std::fmt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Mutex;

use anyhow::Context;

/// A program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    /// `sh -c <script>`
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("sh").arg("-c").arg(script)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Human-readable command line (not shell-safe).
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    /// Empty when output was streamed to the terminal
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Short failure description for reports.
    pub fn failure_summary(&self) -> String {
        let code = self
            .code
            .map(|c| format!("exit code {}", c))
            .unwrap_or_else(|| "terminated by signal".to_string());
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            code
        } else {
            format!("{}: {}", code, stderr.lines().last().unwrap_or(stderr))
        }
    }
}

pub trait CommandRunner: Send + Sync + fmt::Debug {
    /// Run a command to completion. With `stream`, output goes to the terminal.
    ///
    /// Errors only when the program cannot be started; a non-zero exit is
    /// reported through `CommandOutput::success`.
    fn run(&self, spec: &CommandSpec, stream: bool) -> anyhow::Result<CommandOutput>;
}

/// Production runner.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, spec: &CommandSpec, stream: bool) -> anyhow::Result<CommandOutput> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args).stdin(Stdio::null());
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }
        tracing::debug!(command = %spec.display(), stream, "running command");

        if stream {
            let status = cmd
                .status()
                .with_context(|| format!("Failed to execute {}", spec.program))?;
            return Ok(CommandOutput {
                success: status.success(),
                code: status.code(),
                stdout: String::new(),
                stderr: String::new(),
            });
        }

        let output = cmd
            .output()
            .with_context(|| format!("Failed to execute {}", spec.program))?;
        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Test double that records commands and answers from substring rules.
///
/// The first rule whose pattern occurs in the command line decides the output;
/// unmatched commands succeed with empty output.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<CommandSpec>>,
    rules: Mutex<Vec<(String, CommandOutput)>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, pattern: impl Into<String>, output: CommandOutput) -> Self {
        self.rules
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((pattern.into(), output));
        self
    }

    /// Replace the answer for an existing pattern (or add it).
    pub fn set_response(&self, pattern: &str, output: CommandOutput) {
        let mut rules = self.rules.lock().unwrap_or_else(|e| e.into_inner());
        match rules.iter_mut().find(|(p, _)| p == pattern) {
            Some(rule) => rule.1 = output,
            None => rules.push((pattern.to_string(), output)),
        }
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(CommandSpec::display).collect()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, spec: &CommandSpec, _stream: bool) -> anyhow::Result<CommandOutput> {
        let line = spec.display();
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(spec.clone());
        let rules = self.rules.lock().unwrap_or_else(|e| e.into_inner());
        Ok(rules
            .iter()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| CommandOutput::ok("")))
    }
}
