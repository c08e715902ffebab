//! Driftguard - configuration drift detection and repair
//!
//! Usage:
//!   driftguard scan [--dev|--secrets|--staging|--prod]   # Report drift
//!   driftguard fix [--dev|--secrets|--staging|--prod]    # Repair drift
//!   driftguard deploy <stage>                            # Gate, then deploy
//!   driftguard plugins                                   # List plugins

mod report;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use driftguard_core::commands::{
    DeployCommand, DeployOptions, DriftContext, FixCommand, FixOptions, ScanCommand, ScanOptions,
    list_plugins,
};
use driftguard_core::types::{Stage, StageSet};

#[derive(Parser)]
#[command(name = "driftguard")]
#[command(about = "Configuration drift detector and fixer", long_about = None)]
struct Cli {
    /// Project root containing driftguard.toml
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Suppress progress output (status lines, problem details, remote hook output)
    #[arg(long, global = true)]
    silent: bool,

    /// Act as the remote executor: every configured stage is local
    #[arg(long, global = true)]
    remote: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Stage selection; no flag selects every stage.
#[derive(Args, Debug, Clone, Default)]
struct StageFlags {
    #[arg(long)]
    dev: bool,

    #[arg(long)]
    secrets: bool,

    #[arg(long)]
    staging: bool,

    #[arg(long)]
    prod: bool,
}

impl StageFlags {
    fn stages(&self) -> StageSet {
        let selected: Vec<Stage> = [
            (self.dev, Stage::Dev),
            (self.secrets, Stage::Secrets),
            (self.staging, Stage::Staging),
            (self.prod, Stage::Prod),
        ]
        .into_iter()
        .filter_map(|(on, stage)| on.then_some(stage))
        .collect();
        StageSet::from_flags(&selected)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Detect drift in the selected stages
    Scan {
        #[command(flatten)]
        stages: StageFlags,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Repair drift in the selected stages
    Fix {
        #[command(flatten)]
        stages: StageFlags,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Deploy a stage once it is free of critical problems
    Deploy {
        /// Stage to deploy (dev, staging, prod)
        #[arg(value_parser = parse_stage)]
        stage: Stage,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// List registered plugins and whether they apply to this project
    Plugins {
        /// Print the listing as JSON
        #[arg(long)]
        json: bool,
    },
}

/// How a finished pass is printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Output {
    Text,
    Json,
    /// Nothing on stdout; the exit code carries the result
    Quiet,
}

impl Output {
    fn from_flags(silent: bool, json: bool) -> Self {
        if json {
            Output::Json
        } else if silent {
            Output::Quiet
        } else {
            Output::Text
        }
    }
}

fn parse_stage(s: &str) -> Result<Stage, String> {
    s.parse::<Stage>().map_err(|e| e.to_string())
}

/// Default log filter when `RUST_LOG` is unset.
fn default_filter(silent: bool) -> &'static str {
    if silent { "error" } else { "driftguard=info,warn" }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(cli.silent).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir().context("Failed to determine current directory")?,
    };
    let drift = DriftContext::from_root(root, cli.remote)?;

    let exit_code = match cli.command {
        Commands::Scan { stages, json } => run_scan(&drift, stages, cli.silent, json)?,
        Commands::Fix { stages, json } => run_fix(&drift, stages, cli.silent, json)?,
        Commands::Deploy { stage, json } => run_deploy(&drift, stage, cli.silent, json)?,
        Commands::Plugins { json } => run_plugins(&drift, json)?,
    };

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

fn run_scan(drift: &DriftContext, flags: StageFlags, silent: bool, json: bool) -> Result<i32> {
    let options = ScanOptions::new()
        .with_stages(flags.stages())
        .with_silent(silent);
    let report = ScanCommand::new(drift).execute(&options)?;

    match Output::from_flags(silent, json) {
        Output::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        Output::Text => print!("{}", report::render_scan(&report)),
        Output::Quiet => {}
    }
    Ok(if report.success() { 0 } else { 1 })
}

fn run_fix(drift: &DriftContext, flags: StageFlags, silent: bool, json: bool) -> Result<i32> {
    let options = FixOptions::new()
        .with_stages(flags.stages())
        .with_silent(silent);
    let report = FixCommand::new(drift).execute(&options)?;

    match Output::from_flags(silent, json) {
        Output::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        Output::Text => print!("{}", report::render_fix(&report)),
        Output::Quiet => {}
    }
    Ok(if report.success() { 0 } else { 1 })
}

fn run_deploy(drift: &DriftContext, stage: Stage, silent: bool, json: bool) -> Result<i32> {
    let options = DeployOptions::new().with_silent(silent);
    let report = DeployCommand::new(drift).execute(stage, &options)?;

    match Output::from_flags(silent, json) {
        Output::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        Output::Text => print!("{}", report::render_deploy(&report)),
        Output::Quiet => {}
    }
    Ok(if report.result.success { 0 } else { 1 })
}

fn run_plugins(drift: &DriftContext, json: bool) -> Result<i32> {
    let plugins = list_plugins(drift);
    if json {
        println!("{}", serde_json::to_string_pretty(&plugins)?);
    } else {
        print!("{}", report::render_plugins(&plugins));
    }
    Ok(0)
}
