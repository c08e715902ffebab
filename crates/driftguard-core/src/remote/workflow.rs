//! GitHub Actions workflow delegation.
//!
//! A stage is acted on by dispatching the project's deploy workflow with
//! `command` and `stage` inputs, then polling the run until it completes.

use std::time::Instant;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use url::Url;

use crate::config::GithubConfig;
use crate::git::RepoSlug;
use crate::types::Stage;

use super::poll::{Poll, PollPolicy, poll_until};

const API_BASE: &str = "https://api.github.com";

/// Tolerated clock skew between this machine and GitHub when matching runs.
const DISPATCH_SKEW_SECS: i64 = 10;

/// Inputs passed to `workflow_dispatch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowInputs {
    pub command: &'static str,
    pub stage: Stage,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct WorkflowRun {
    pub id: u64,
    pub status: String,
    #[serde(default)]
    pub conclusion: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl WorkflowRun {
    pub fn is_completed(&self) -> bool {
        self.status == "completed"
    }

    pub fn succeeded(&self) -> bool {
        self.is_completed() && self.conclusion.as_deref() == Some("success")
    }

    pub fn summary(&self) -> String {
        let state = self.conclusion.as_deref().unwrap_or(&self.status);
        match &self.html_url {
            Some(url) => format!("workflow run {} {} ({})", self.id, state, url),
            None => format!("workflow run {} {}", self.id, state),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RunList {
    #[serde(default)]
    workflow_runs: Vec<WorkflowRun>,
}

/// The three GitHub calls delegation needs.
pub trait WorkflowApi: Send + Sync + std::fmt::Debug {
    fn dispatch(&self, inputs: WorkflowInputs) -> anyhow::Result<()>;

    /// Newest dispatched run created at or after `after`, if any yet.
    fn find_run(&self, after: DateTime<Utc>) -> anyhow::Result<Option<WorkflowRun>>;

    fn get_run(&self, id: u64) -> anyhow::Result<WorkflowRun>;
}

/// Dispatch a run and wait for it to finish.
///
/// Waiting for the run to appear and then to complete share one policy
/// timeout, counted from the dispatch.
pub fn run_workflow(
    api: &dyn WorkflowApi,
    inputs: WorkflowInputs,
    policy: PollPolicy,
) -> anyhow::Result<WorkflowRun> {
    let dispatched_after = Utc::now() - chrono::Duration::seconds(DISPATCH_SKEW_SECS);
    let started = Instant::now();
    api.dispatch(inputs)?;
    tracing::info!(command = inputs.command, stage = %inputs.stage, "workflow dispatched");

    let run = poll_until(policy, started, "workflow run to start", || {
        Ok(match api.find_run(dispatched_after)? {
            Some(run) => Poll::Ready(run),
            None => Poll::Pending,
        })
    })?;
    tracing::debug!(run = run.id, "workflow run found");

    let run = poll_until(policy, started, "workflow run to complete", || {
        let current = api.get_run(run.id)?;
        Ok(if current.is_completed() {
            Poll::Ready(current)
        } else {
            Poll::Pending
        })
    })?;
    tracing::info!(run = run.id, conclusion = ?run.conclusion, "workflow run finished");
    Ok(run)
}

/// REST client for one repository's workflow.
#[derive(Debug)]
pub struct GithubWorkflowClient {
    api_base: Url,
    slug: RepoSlug,
    workflow: String,
    git_ref: String,
    token: String,
    http: reqwest::Client,
    runtime: tokio::runtime::Runtime,
}

impl GithubWorkflowClient {
    pub fn new(
        slug: RepoSlug,
        github: &GithubConfig,
        token: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("driftguard/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
        Ok(Self {
            api_base: Url::parse(API_BASE).context("Invalid GitHub API base")?,
            slug,
            workflow: github.workflow.clone(),
            git_ref: github.git_ref.clone(),
            token: token.into(),
            http,
            runtime,
        })
    }

    fn endpoint(&self, tail: &[&str]) -> anyhow::Result<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("GitHub API base cannot carry a path"))?
            .extend(["repos", self.slug.owner.as_str(), self.slug.repo.as_str()])
            .extend(tail);
        Ok(url)
    }

    fn get<T: serde::de::DeserializeOwned>(&self, url: Url) -> anyhow::Result<T> {
        self.runtime.block_on(async {
            let response = self
                .http
                .get(url.clone())
                .bearer_auth(&self.token)
                .header("Accept", "application/vnd.github+json")
                .header("X-GitHub-Api-Version", "2022-11-28")
                .send()
                .await
                .with_context(|| format!("Failed to reach {}", url))?;
            if !response.status().is_success() {
                anyhow::bail!("GitHub API returned HTTP {} for {}", response.status(), url);
            }
            response
                .json::<T>()
                .await
                .with_context(|| format!("Failed to parse response from {}", url))
        })
    }
}

impl WorkflowApi for GithubWorkflowClient {
    fn dispatch(&self, inputs: WorkflowInputs) -> anyhow::Result<()> {
        let url = self.endpoint(&["actions", "workflows", &self.workflow, "dispatches"])?;
        let body = serde_json::json!({
            "ref": self.git_ref,
            "inputs": {
                "command": inputs.command,
                "stage": inputs.stage.as_str(),
            },
        });
        self.runtime.block_on(async {
            let response = self
                .http
                .post(url.clone())
                .bearer_auth(&self.token)
                .header("Accept", "application/vnd.github+json")
                .header("X-GitHub-Api-Version", "2022-11-28")
                .json(&body)
                .send()
                .await
                .with_context(|| format!("Failed to reach {}", url))?;
            if !response.status().is_success() {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                anyhow::bail!("Workflow dispatch failed: HTTP {} {}", status, text.trim());
            }
            Ok(())
        })
    }

    fn find_run(&self, after: DateTime<Utc>) -> anyhow::Result<Option<WorkflowRun>> {
        let mut url = self.endpoint(&["actions", "workflows", &self.workflow, "runs"])?;
        url.query_pairs_mut()
            .append_pair("event", "workflow_dispatch")
            .append_pair("branch", &self.git_ref)
            .append_pair("per_page", "10");
        let list: RunList = self.get(url)?;
        Ok(newest_since(list.workflow_runs, after))
    }

    fn get_run(&self, id: u64) -> anyhow::Result<WorkflowRun> {
        let url = self.endpoint(&["actions", "runs", &id.to_string()])?;
        self.get(url)
    }
}

fn newest_since(runs: Vec<WorkflowRun>, after: DateTime<Utc>) -> Option<WorkflowRun> {
    runs.into_iter()
        .filter(|run| run.created_at >= after)
        .max_by_key(|run| run.created_at)
}
