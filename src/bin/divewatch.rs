// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: CLI entry point replaying a telemetry log through a scenario file.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Replay a recorded JSON-lines telemetry log through a TOML scenario.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use divewatch::{JsonLinesSource, MissionProgress, Sampler, ScenarioConfig, ScenarioRunner};
use env_logger::Env;
use log::LevelFilter;

/// divewatch command-line arguments.
#[derive(Debug, Parser)]
#[command(author = "Lukas Bower", version, about = "Replay telemetry through invariant watches", long_about = None)]
struct Cli {
    /// JSON-lines telemetry log to replay.
    #[arg(long)]
    log: PathBuf,

    /// TOML scenario describing the watch and wait steps.
    #[arg(long)]
    scenario: PathBuf,

    /// Enable debug logging.
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let mut builder =
        env_logger::Builder::from_env(Env::default().default_filter_or(default_level.as_str()));
    builder.format_timestamp_millis();
    let _ = builder.try_init();
}

fn run(cli: &Cli) -> Result<bool> {
    let config = ScenarioConfig::load(&cli.scenario)
        .with_context(|| format!("load scenario {}", cli.scenario.display()))?;
    let source = JsonLinesSource::open(&cli.log)
        .with_context(|| format!("open telemetry log {}", cli.log.display()))?;
    let progress = MissionProgress::new();
    let mut sampler = Sampler::new(source).with_progress(progress.clone());
    let runner = ScenarioRunner::from_config(&config);

    match runner.run(&mut sampler, &progress) {
        Ok(report) => {
            for outcome in &report.outcomes {
                println!("{outcome}");
            }
            println!("{}: PASS ({} steps)", report.name, report.outcomes.len());
            Ok(true)
        }
        Err(err) => {
            println!("{}: FAIL at step {}: {err}", runner.name(), err.index());
            Ok(false)
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let passed = run(&cli)?;
    Ok(if passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
