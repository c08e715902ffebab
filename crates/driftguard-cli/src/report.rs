//! Plain-text rendering of scan, fix, deploy and plugin reports.

use std::fmt::Write;

use console::style;
use driftguard_core::commands::{
    DeployReport, FixReport, FixStatus, PluginInfo, ScanReport, ScanProblems,
};
use driftguard_core::status::{StageState, StageStatus};

fn status_lines(out: &mut String, statuses: &[StageStatus]) {
    for status in statuses {
        let line = status.line();
        let line = match &status.state {
            StageState::Unreachable { blocking: true, .. } => style(line).red().to_string(),
            StageState::Unreachable { .. } => style(line).dim().to_string(),
            StageState::LocalWithProblems { .. } => style(line).yellow().to_string(),
            StageState::LocalReady => style(line).green().to_string(),
            StageState::RemoteDelegated {
                handled: Some(false),
                ..
            } => style(line).red().to_string(),
            _ => line,
        };
        let _ = writeln!(out, "  {}", line);
        if let StageState::Unreachable {
            suggestion: Some(hint),
            ..
        } = &status.state
        {
            let _ = writeln!(out, "           hint: {}", hint);
        }
    }
}

fn problem_details(out: &mut String, problems: &ScanProblems) {
    for stage in problems.stages() {
        let _ = writeln!(out, "\n{}:", style(stage).bold());
        for fix in problems.get(stage) {
            let _ = writeln!(
                out,
                "  [{}] {}: {}",
                fix.severity.as_str(),
                fix.id,
                fix.description
            );
            if fix.has_remedy() {
                let _ = writeln!(out, "      auto-fixable (run 'driftguard fix --{}')", stage);
            } else if !fix.manual_fix.is_empty() {
                let _ = writeln!(out, "      fix: {}", fix.manual_fix);
            }
        }
    }
}

pub fn render_scan(report: &ScanReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Stages:");
    status_lines(&mut out, &report.statuses);

    problem_details(&mut out, &report.problems);

    if !report.detector_failures.is_empty() {
        let _ = writeln!(out, "\nDetector errors:");
        for failure in &report.detector_failures {
            let _ = writeln!(
                out,
                "  {} ({}): {}",
                failure.fix_id, failure.stage, failure.message
            );
        }
    }

    if !report.os_skipped.is_empty() {
        let _ = writeln!(out, "\nSkipped {} OS-specific fix(es)", report.os_skipped.len());
    }

    let total = report.problems.len();
    let _ = writeln!(out);
    if total == 0 {
        let _ = writeln!(out, "Summary: no issues found");
    } else {
        let critical = report.problems.critical().count();
        let _ = writeln!(
            out,
            "Summary: {} issue(s), {} critical (run 'driftguard fix' to resolve)",
            total, critical
        );
    }
    out
}

pub fn render_fix(report: &FixReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Stages:");
    status_lines(&mut out, &report.statuses);

    if !report.outcomes.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "  {:<8} {:<30} {:<8} Detail", "Stage", "Fix", "Result");
        let _ = writeln!(out, "  {}", "-".repeat(70));
        for outcome in &report.outcomes {
            let result = match outcome.status {
                FixStatus::Fixed => style(outcome.status.as_str()).green(),
                FixStatus::Manual => style(outcome.status.as_str()).yellow(),
                FixStatus::Failed => style(outcome.status.as_str()).red(),
            };
            let detail = match outcome.status {
                FixStatus::Fixed => outcome.description.clone(),
                FixStatus::Manual => outcome
                    .manual_fix
                    .clone()
                    .unwrap_or_else(|| outcome.description.clone()),
                FixStatus::Failed => format!(
                    "{} ({})",
                    outcome.description,
                    outcome.error.as_deref().unwrap_or("failed")
                ),
            };
            let _ = writeln!(
                out,
                "  {:<8} {:<30} {:<8} {}",
                outcome.stage.as_str(),
                truncate(&outcome.id, 30),
                result,
                detail
            );
        }
    }

    let counts = report.counts;
    let _ = writeln!(
        out,
        "\nSummary: {} fixed, {} manual, {} failed",
        counts.fixed, counts.manual, counts.failed
    );
    out
}

pub fn render_deploy(report: &DeployReport) -> String {
    let mut out = String::new();
    let result = &report.result;

    for outcome in &report.auto_fixed {
        let _ = writeln!(out, "  auto-fix {}: {}", outcome.id, outcome.status.as_str());
    }

    if result.success {
        let via = result.via.map(|v| v.as_str()).unwrap_or("local");
        let _ = writeln!(
            out,
            "{} Deployed {} via {}",
            style("✓").green(),
            result.stage,
            via
        );
    } else {
        let _ = writeln!(
            out,
            "{} Deploy of {} failed: {}",
            style("✗").red(),
            result.stage,
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
    for detail in &result.details {
        let _ = writeln!(out, "  {}", detail);
    }
    if let Some(pipeline) = &report.pipeline {
        let _ = writeln!(out, "  pipeline: {}", pipeline);
    }
    out
}

pub fn render_plugins(plugins: &[PluginInfo]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "  {:<16} {:<10} {:<8} {:<6} Hooks",
        "Plugin", "Category", "Loaded", "Fixes"
    );
    let _ = writeln!(out, "  {}", "-".repeat(56));
    for plugin in plugins {
        let hooks = plugin
            .hooks
            .map(|h| {
                let mut names = Vec::new();
                if h.scan {
                    names.push("scan");
                }
                if h.fix {
                    names.push("fix");
                }
                if h.deploy {
                    names.push("deploy");
                }
                names.join(",")
            })
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "  {:<16} {:<10} {:<8} {:<6} {}",
            plugin.id,
            plugin.category.as_str(),
            if plugin.loaded { "yes" } else { "no" },
            plugin.fixes,
            hooks
        );
    }
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max - 1).collect();
        format!("{}…", cut)
    }
}
