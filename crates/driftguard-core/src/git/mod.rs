//! Repository detection for workflow delegation.
//!
//! Reads the `origin` remote of the project checkout and turns it into an
//! `owner/repo` slug.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use git2::Repository;

use crate::config::ProjectConfig;

/// A GitHub repository, `owner/repo`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoSlug {
    pub owner: String,
    pub repo: String,
}

impl RepoSlug {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// Parse a GitHub remote URL.
    ///
    /// Accepts `https://github.com/o/r(.git)`, `ssh://git@github.com/o/r.git`
    /// and scp-style `git@github.com:o/r.git`. Other hosts yield `None`.
    pub fn from_remote_url(remote: &str) -> Option<Self> {
        let remote = remote.trim();
        let path = if let Ok(parsed) = url::Url::parse(remote) {
            if parsed.host_str() != Some("github.com") {
                return None;
            }
            parsed.path().trim_start_matches('/').to_string()
        } else {
            // scp-like: [user@]github.com:owner/repo.git
            let (host, path) = remote.split_once(':')?;
            let host = host.rsplit('@').next()?;
            if host != "github.com" {
                return None;
            }
            path.to_string()
        };
        path.trim_end_matches('/')
            .trim_end_matches(".git")
            .parse()
            .ok()
    }
}

impl FromStr for RepoSlug {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty() => {
                Ok(Self::new(owner, repo))
            }
            _ => anyhow::bail!("Invalid repository '{}': expected owner/repo", s),
        }
    }
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// Slug of the `origin` remote of the repository containing `root`.
pub fn origin_slug(root: &Path) -> Option<RepoSlug> {
    let repo = match Repository::discover(root) {
        Ok(repo) => repo,
        Err(e) => {
            tracing::debug!(root = %root.display(), error = %e, "not a git checkout");
            return None;
        }
    };
    let remote = repo.find_remote("origin").ok()?;
    RepoSlug::from_remote_url(remote.url()?)
}

/// The configured repository, falling back to the origin remote.
pub fn resolve_repository(config: &ProjectConfig, root: &Path) -> Option<RepoSlug> {
    if let Some(configured) = config.github.as_ref().and_then(|g| g.repository.as_deref()) {
        match configured.parse() {
            Ok(slug) => return Some(slug),
            Err(e) => tracing::warn!(error = %e, "ignoring github.repository"),
        }
    }
    origin_slug(root)
}
