//! Project configuration
//!
//! A single `driftguard.toml` at the project root describes the environments
//! behind each stage, the required secrets, and plugin settings.

pub mod host;
pub mod parser;
pub mod schema;
pub mod store;

pub use host::{HostClass, classify_host};
pub use parser::{parse_config, parse_config_str};
pub use schema::{
    DockerConfig, EnvironmentConfig, GithubConfig, ProjectConfig, ProjectSection, SecretsConfig,
    ServiceConfig,
};
pub use store::{CONFIG_FILE_NAME, ConfigStore};
