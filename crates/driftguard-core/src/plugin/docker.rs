//! Docker server plugin.
//!
//! Checks the docker engine on every stage whose environment uses docker, and
//! keeps `docker-compose.yml` in sync with the `[docker.services]` table.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use semver::Version;

use crate::config::{DockerConfig, ProjectConfig, classify_host};
use crate::fix::{Detection, Fix};
use crate::remote::{CommandRunner, CommandSpec};
use crate::types::{OsFilter, Severity, Stage, TargetOs};

use super::{Plugin, PluginCategory};

pub const PLUGIN_ID: &str = "docker";

pub const COMPOSE_FILE: &str = "docker-compose.yml";

const INSTALL_SCRIPT: &str = "curl -fsSL https://get.docker.com | sh";

#[derive(Debug, Clone)]
pub struct DockerPlugin {
    runner: Arc<dyn CommandRunner>,
}

impl DockerPlugin {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    fn installed_fix(&self, stage: Stage) -> Fix {
        let detect_runner = self.runner.clone();
        let remedy_runner = self.runner.clone();
        Fix::new(
            format!("docker-installed-{}", stage),
            stage,
            Severity::Critical,
            format!("Docker is not installed on {}", stage),
            move |_, _| {
                let installed = detect_runner
                    .run(&CommandSpec::new("docker").arg("--version"), false)
                    .map(|out| out.success)
                    .unwrap_or(false);
                Ok(Detection::from_problem(!installed))
            },
        )
        .with_remedy(move |_, _| {
            let out = remedy_runner.run(&CommandSpec::shell(INSTALL_SCRIPT), true)?;
            if !out.success {
                anyhow::bail!("docker install script failed: {}", out.failure_summary());
            }
            Ok(true)
        })
        .with_manual_fix(format!("Install Docker: {}", INSTALL_SCRIPT))
        .with_os(OsFilter::only(TargetOs::Linux))
    }

    fn running_fix(&self, stage: Stage) -> Fix {
        let detect_runner = self.runner.clone();
        let remedy_runner = self.runner.clone();
        Fix::new(
            format!("docker-running-{}", stage),
            stage,
            Severity::Critical,
            format!("Docker daemon is not running on {}", stage),
            move |_, _| match detect_runner.run(&CommandSpec::new("docker").arg("info"), false) {
                Ok(out) => Ok(Detection::from_problem(!out.success)),
                // Not installed; docker-installed reports that.
                Err(_) => Ok(Detection::NotApplicable),
            },
        )
        .with_remedy(move |_, _| {
            let out = remedy_runner.run(
                &CommandSpec::new("systemctl").args(["start", "docker"]),
                false,
            )?;
            if !out.success {
                anyhow::bail!("systemctl start docker failed: {}", out.failure_summary());
            }
            let check = remedy_runner.run(&CommandSpec::new("docker").arg("info"), false)?;
            Ok(check.success)
        })
        .with_manual_fix("Start the daemon: sudo systemctl start docker")
        .with_os(OsFilter::only(TargetOs::Linux))
    }

    fn version_fix(&self, stage: Stage) -> Fix {
        let runner = self.runner.clone();
        Fix::new(
            format!("docker-version-{}", stage),
            stage,
            Severity::Warning,
            format!("Docker on {} is older than docker.min_version", stage),
            move |config, _| {
                let Some(min) = config.docker.as_ref().and_then(|d| d.min_version.as_deref()) else {
                    return Ok(Detection::NotApplicable);
                };
                let min = Version::parse(min)
                    .with_context(|| format!("Invalid docker.min_version '{}'", min))?;
                let out = match runner.run(&CommandSpec::new("docker").arg("--version"), false) {
                    Ok(out) if out.success => out,
                    _ => return Ok(Detection::NotApplicable),
                };
                let installed = parse_docker_version(&out.stdout).with_context(|| {
                    format!("Could not parse docker version from '{}'", out.stdout.trim())
                })?;
                Ok(Detection::from_problem(installed < min))
            },
        )
        .with_manual_fix("Upgrade Docker Engine to at least docker.min_version")
    }

    fn compose_fix(&self) -> Fix {
        Fix::new(
            "compose-drift",
            Stage::Dev,
            Severity::Warning,
            format!("{} does not match [docker.services]", COMPOSE_FILE),
            |config, ctx| {
                let Some(docker) = config.docker.as_ref().filter(|d| !d.services.is_empty())
                else {
                    return Ok(Detection::NotApplicable);
                };
                let path = ctx.project_path(COMPOSE_FILE);
                if !path.exists() {
                    return Ok(Detection::ProblemDetected);
                }
                let current = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                let expected = blake3::hash(render_compose(docker).as_bytes());
                let actual = blake3::hash(current.as_bytes());
                tracing::debug!(
                    expected = %expected.to_hex(),
                    actual = %actual.to_hex(),
                    "compose hash"
                );
                Ok(Detection::from_problem(expected != actual))
            },
        )
        .with_remedy(|config, ctx| {
            let Some(docker) = config.docker.as_ref() else {
                return Ok(false);
            };
            let path = ctx.project_path(COMPOSE_FILE);
            std::fs::write(&path, render_compose(docker))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            Ok(true)
        })
        .with_manual_fix(format!(
            "Regenerate {} from driftguard.toml with `driftguard fix --dev`",
            COMPOSE_FILE
        ))
    }
}

/// Stages whose environment uses docker, in stage order.
pub fn docker_stages(config: &ProjectConfig) -> Vec<Stage> {
    Stage::ALL
        .into_iter()
        .filter(|stage| {
            config.environment(*stage).is_some_and(|env| {
                env.uses_plugin(PLUGIN_ID)
                    || (*stage == Stage::Staging
                        && env
                            .host
                            .as_deref()
                            .is_some_and(|h| classify_host(h).is_private_or_local()))
            })
        })
        .collect()
}

impl Plugin for DockerPlugin {
    fn id(&self) -> &'static str {
        PLUGIN_ID
    }

    fn category(&self) -> PluginCategory {
        PluginCategory::Server
    }

    fn should_load(&self, _root_dir: &Path, config: &ProjectConfig) -> bool {
        !docker_stages(config).is_empty()
    }

    fn fixes(&self, config: &ProjectConfig) -> Vec<Fix> {
        let mut fixes = Vec::new();
        for stage in docker_stages(config) {
            fixes.push(self.installed_fix(stage));
            fixes.push(self.running_fix(stage));
            fixes.push(self.version_fix(stage));
        }
        fixes.push(self.compose_fix());
        fixes
    }
}

/// Extract the engine version from `docker --version` output
/// ("Docker version 24.0.7, build afdd53b").
pub fn parse_docker_version(output: &str) -> Option<Version> {
    let token = output
        .split_whitespace()
        .skip_while(|word| !word.eq_ignore_ascii_case("version"))
        .nth(1)?
        .trim_end_matches(',');
    let core = token.split(['+', '-']).next()?;
    let mut parts: Vec<&str> = core.split('.').take(3).collect();
    while parts.len() < 3 {
        parts.push("0");
    }
    Version::parse(&parts.join(".")).ok()
}

/// Render `docker-compose.yml` for the configured services.
///
/// Output is deterministic (services sorted by name) so it can be compared
/// byte-for-byte with the file on disk.
pub fn render_compose(docker: &DockerConfig) -> String {
    let mut out = String::from("# Generated by driftguard from driftguard.toml\nservices:\n");
    for (name, service) in &docker.services {
        out.push_str(&format!("  {}:\n", name));
        out.push_str(&format!("    image: {}\n", quote(&service.image)));
        if !service.ports.is_empty() {
            out.push_str("    ports:\n");
            for port in &service.ports {
                out.push_str(&format!("      - {}\n", quote(port)));
            }
        }
        if let Some(env_file) = &service.env_file {
            out.push_str(&format!("    env_file:\n      - {}\n", quote(env_file)));
        }
    }
    out
}

// JSON strings are valid YAML scalars.
fn quote(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EnvironmentConfig, ServiceConfig};
    use crate::context::ExecutionContext;
    use crate::remote::{CommandOutput, RecordingRunner};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn ctx(temp: &TempDir) -> ExecutionContext {
        ExecutionContext::new(
            temp.path().to_path_buf(),
            temp.path().to_path_buf(),
            Default::default(),
        )
    }

    fn config_with_docker_env(stage: &str) -> ProjectConfig {
        let mut config = ProjectConfig::new();
        config.environments.insert(
            stage.to_string(),
            EnvironmentConfig {
                plugins: vec!["docker".to_string()],
                ..Default::default()
            },
        );
        config
    }

    fn web_service() -> DockerConfig {
        let mut services = BTreeMap::new();
        services.insert(
            "web".to_string(),
            ServiceConfig {
                image: "ghcr.io/acme/shop:latest".to_string(),
                ports: vec!["80:8080".to_string()],
                env_file: Some(".env".to_string()),
            },
        );
        DockerConfig {
            min_version: None,
            services,
        }
    }

    fn fix<'a>(fixes: &'a [Fix], id: &str) -> &'a Fix {
        fixes.iter().find(|f| f.id == id).expect("fix present")
    }

    #[test]
    fn test_docker_stages() {
        assert!(docker_stages(&ProjectConfig::new()).is_empty());
        assert_eq!(docker_stages(&config_with_docker_env("prod")), vec![Stage::Prod]);

        let mut config = ProjectConfig::new();
        config.environments.insert(
            "staging".to_string(),
            EnvironmentConfig {
                host: Some("10.1.2.3".to_string()),
                ..Default::default()
            },
        );
        config.environments.insert(
            "prod".to_string(),
            EnvironmentConfig {
                host: Some("203.0.113.9".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(docker_stages(&config), vec![Stage::Staging]);
    }

    #[test]
    fn test_fix_ids_per_stage() {
        let plugin = DockerPlugin::new(Arc::new(RecordingRunner::new()));
        let ids: Vec<_> = plugin
            .fixes(&config_with_docker_env("prod"))
            .into_iter()
            .map(|f| f.id)
            .collect();
        assert_eq!(
            ids,
            vec![
                "docker-installed-prod",
                "docker-running-prod",
                "docker-version-prod",
                "compose-drift"
            ]
        );
    }

    #[test]
    fn test_daemon_down_is_detected_and_started() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(
            RecordingRunner::new()
                .respond("docker info", CommandOutput::failed(1, "Cannot connect")),
        );
        let plugin = DockerPlugin::new(runner.clone());
        let config = config_with_docker_env("prod");
        let fixes = plugin.fixes(&config);
        let running = fix(&fixes, "docker-running-prod");

        assert_eq!(running.scan(&config, &ctx(&temp)).unwrap(), Detection::ProblemDetected);

        runner.set_response("docker info", CommandOutput::ok("Server: ok"));
        assert!(running.apply(&config, &ctx(&temp)).unwrap().unwrap());
        assert!(runner
            .command_lines()
            .contains(&"systemctl start docker".to_string()));
    }

    #[test]
    fn test_installed_check_and_os_filter() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(
            RecordingRunner::new().respond("docker --version", CommandOutput::failed(127, "")),
        );
        let plugin = DockerPlugin::new(runner);
        let config = config_with_docker_env("staging");
        let fixes = plugin.fixes(&config);
        let installed = fix(&fixes, "docker-installed-staging");

        assert_eq!(installed.scan(&config, &ctx(&temp)).unwrap(), Detection::ProblemDetected);
        assert!(installed.applies_to_os(TargetOs::Linux));
        assert!(!installed.applies_to_os(TargetOs::Darwin));
    }

    #[test]
    fn test_version_minimum() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner::new().respond(
            "docker --version",
            CommandOutput::ok("Docker version 20.10.21, build baeda1f\n"),
        ));
        let plugin = DockerPlugin::new(runner);
        let mut config = config_with_docker_env("prod");
        let fixes = plugin.fixes(&config);
        let version = fix(&fixes, "docker-version-prod");

        assert_eq!(version.scan(&config, &ctx(&temp)).unwrap(), Detection::NotApplicable);

        config.docker = Some(DockerConfig {
            min_version: Some("24.0.0".to_string()),
            services: BTreeMap::new(),
        });
        assert_eq!(version.scan(&config, &ctx(&temp)).unwrap(), Detection::ProblemDetected);
        assert!(!version.has_remedy());

        config.docker = Some(DockerConfig {
            min_version: Some("20.10.0".to_string()),
            services: BTreeMap::new(),
        });
        assert_eq!(version.scan(&config, &ctx(&temp)).unwrap(), Detection::Clean);
    }

    #[test]
    fn test_parse_docker_version() {
        assert_eq!(
            parse_docker_version("Docker version 24.0.7, build afdd53b"),
            Some(Version::new(24, 0, 7))
        );
        assert_eq!(
            parse_docker_version("Docker version 20.10.21+dfsg1, build baeda1f"),
            Some(Version::new(20, 10, 21))
        );
        assert_eq!(parse_docker_version("Docker version 25.0"), Some(Version::new(25, 0, 0)));
        assert_eq!(parse_docker_version("command not found"), None);
    }

    #[test]
    fn test_compose_drift_round_trip() {
        let temp = TempDir::new().unwrap();
        let plugin = DockerPlugin::new(Arc::new(RecordingRunner::new()));
        let mut config = ProjectConfig::new();
        config.docker = Some(web_service());
        let fixes = plugin.fixes(&config);
        let compose = fix(&fixes, "compose-drift");

        assert_eq!(compose.scan(&config, &ctx(&temp)).unwrap(), Detection::ProblemDetected);
        assert!(compose.apply(&config, &ctx(&temp)).unwrap().unwrap());
        assert_eq!(compose.scan(&config, &ctx(&temp)).unwrap(), Detection::Clean);

        std::fs::write(temp.path().join(COMPOSE_FILE), "services: {}\n").unwrap();
        assert_eq!(compose.scan(&config, &ctx(&temp)).unwrap(), Detection::ProblemDetected);
    }

    #[test]
    fn test_compose_not_applicable_without_services() {
        let temp = TempDir::new().unwrap();
        let plugin = DockerPlugin::new(Arc::new(RecordingRunner::new()));
        let config = ProjectConfig::new();
        let fixes = plugin.fixes(&config);
        assert_eq!(
            fix(&fixes, "compose-drift").scan(&config, &ctx(&temp)).unwrap(),
            Detection::NotApplicable
        );
    }

    #[test]
    fn test_render_compose() {
        let rendered = render_compose(&web_service());
        assert_eq!(
            rendered,
            "# Generated by driftguard from driftguard.toml\n\
             services:\n  web:\n    image: \"ghcr.io/acme/shop:latest\"\n    \
             ports:\n      - \"80:8080\"\n    env_file:\n      - \".env\"\n"
        );
    }
}
