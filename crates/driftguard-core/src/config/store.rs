//! Config store for loading driftguard.toml.

use std::path::{Path, PathBuf};

use super::{ProjectConfig, parser};

pub const CONFIG_FILE_NAME: &str = "driftguard.toml";

#[derive(Debug, Clone)]
pub struct ConfigStore {
    config_path: PathBuf,
}

impl ConfigStore {
    pub fn from_root(project_root: &Path) -> Self {
        Self {
            config_path: project_root.join(CONFIG_FILE_NAME),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load the project config. A missing file yields the empty bootstrap config.
    pub fn load(&self) -> anyhow::Result<ProjectConfig> {
        if !self.config_path.exists() {
            tracing::debug!(
                path = %self.config_path.display(),
                "no config file, using bootstrap defaults"
            );
            return Ok(ProjectConfig::new());
        }
        parser::parse_config(&self.config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_file_is_bootstrap() {
        let temp = TempDir::new().unwrap();
        let store = ConfigStore::from_root(temp.path());
        let config = store.load().unwrap();
        assert!(config.environments.is_empty());
    }

    #[test]
    fn test_load_reads_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(CONFIG_FILE_NAME),
            "pipeline = \"github-actions\"\n",
        )
        .unwrap();
        let store = ConfigStore::from_root(temp.path());

        let loaded = store.load().unwrap();
        assert_eq!(loaded.pipeline.as_deref(), Some("github-actions"));
    }

    #[test]
    fn test_load_rejects_non_pipeline_default() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(CONFIG_FILE_NAME), "pipeline = \"docker\"\n").unwrap();
        let store = ConfigStore::from_root(temp.path());
        assert!(store.load().is_err());
    }
}
