//! Execution context threaded into every detector, remediator and hook.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Set by the SSH delegation command line so the far side knows it is the executor.
pub const REMOTE_ENV_VAR: &str = "DRIFTGUARD_REMOTE";

/// Snapshot of everything a pass may read from its surroundings.
///
/// Frontends create this once per invocation; fixes never read process state
/// directly.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    root_dir: PathBuf,
    home_dir: PathBuf,
    env: HashMap<String, String>,
    remote_executor: bool,
}

impl ExecutionContext {
    /// Create a context with explicit values (for testing and embedding).
    pub fn new(root_dir: PathBuf, home_dir: PathBuf, env: HashMap<String, String>) -> Self {
        let remote_executor = is_truthy(env.get(REMOTE_ENV_VAR).map(String::as_str));
        Self {
            root_dir,
            home_dir,
            env,
            remote_executor,
        }
    }

    /// Snapshot the current process environment.
    pub fn from_process(root_dir: PathBuf) -> anyhow::Result<Self> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;
        Ok(Self::new(root_dir, home_dir, std::env::vars().collect()))
    }

    /// Mark this process as the remote executor of a delegated stage.
    pub fn with_remote_executor(mut self, remote: bool) -> Self {
        self.remote_executor = self.remote_executor || remote;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        if key == REMOTE_ENV_VAR {
            self.remote_executor = true;
        }
        self.env.insert(key, value.into());
        self
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    pub fn env_var(&self, name: &str) -> Option<&str> {
        self.env.get(name).map(String::as_str).filter(|v| !v.is_empty())
    }

    pub fn env(&self) -> &HashMap<String, String> {
        &self.env
    }

    pub fn is_remote_executor(&self) -> bool {
        self.remote_executor
    }

    /// Running inside a CI runner (GitHub Actions or a generic `CI=true`).
    pub fn is_ci(&self) -> bool {
        is_truthy(self.env_var("GITHUB_ACTIONS")) || is_truthy(self.env_var("CI"))
    }

    /// Expand a leading `~/` against the context's home directory.
    pub fn expand_home(&self, path: &str) -> PathBuf {
        match path.strip_prefix("~/") {
            Some(rest) => self.home_dir.join(rest),
            None if path == "~" => self.home_dir.clone(),
            None => PathBuf::from(path),
        }
    }

    /// Resolve a project-relative path.
    pub fn project_path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root_dir.join(relative)
    }
}

fn is_truthy(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.to_ascii_lowercase()).as_deref(),
        Some("1") | Some("true") | Some("yes")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(env: &[(&str, &str)]) -> ExecutionContext {
        ExecutionContext::new(
            PathBuf::from("/work/app"),
            PathBuf::from("/home/dev"),
            env.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_remote_flag_from_env() {
        assert!(ctx(&[(REMOTE_ENV_VAR, "1")]).is_remote_executor());
        assert!(!ctx(&[]).is_remote_executor());
        assert!(ctx(&[]).with_remote_executor(true).is_remote_executor());
    }

    #[test]
    fn test_ci_marker() {
        assert!(ctx(&[("GITHUB_ACTIONS", "true")]).is_ci());
        assert!(ctx(&[("CI", "1")]).is_ci());
        assert!(!ctx(&[("CI", "")]).is_ci());
    }

    #[test]
    fn test_expand_home() {
        let c = ctx(&[]);
        assert_eq!(
            c.expand_home("~/.ssh/id_ed25519"),
            PathBuf::from("/home/dev/.ssh/id_ed25519")
        );
        assert_eq!(c.expand_home("/etc/key"), PathBuf::from("/etc/key"));
    }

    #[test]
    fn test_empty_env_var_is_unset() {
        let c = ctx(&[("GITHUB_TOKEN", "")]);
        assert!(c.env_var("GITHUB_TOKEN").is_none());
    }
}
