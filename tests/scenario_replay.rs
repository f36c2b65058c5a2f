// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Replay recorded telemetry logs through scenario files and live channels.
// Author: Lukas Bower

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;

use anyhow::Result;
use divewatch::{
    telemetry_channel, InvariantMonitor, JsonLinesSource, MissionProgress, MonitorError, Sample,
    Sampler, SamplerError, ScenarioConfig, ScenarioError, ScenarioRunner, SessionExit, Signal,
    SimTime,
};
use tempfile::TempDir;

const DIVE_SCENARIO: &str = r#"
name = "terrain_dive"

[[step]]
kind = "wait_range"
signal = "altitude"
min = -6.0
max = -5.0
timeout = 30.0
minimum_duration = 2.0

[[step]]
kind = "hold"
signal = "altitude"

[[step]]
kind = "progress_gated"
signal = "true_distance"
target = 15.0
tolerance = 1.5
timeout = 100.0
target_progress = 2

[[step]]
kind = "wait_statustext"
text = "Mission complete"
timeout = 30.0

[[step]]
kind = "delay"
seconds = 5.0
"#;

const EARLY_HOLD_SCENARIO: &str = r#"
name = "premature_hold"

[[step]]
kind = "hold"
signal = "altitude"
"#;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn dive_log() -> String {
    dive_log_from(0)
}

/// One line per message, one second apart: descent, then a survey mission.
/// Stamps start at `start` simulated seconds.
fn dive_log_from(start: u32) -> String {
    let mut log = String::from("# recorded SITL dive\n\n");
    for step in 0..=60u32 {
        let t = start + step;
        let alt = match step {
            0 => -1.0,
            1 => -3.0,
            _ => -5.5,
        };
        writeln!(log, r#"{{"time": {t}.0, "type": "VFR_HUD", "alt": {alt}, "heading": 90}}"#).ok();
        if step >= 10 && step % 10 == 0 {
            writeln!(log, r#"{{"time": {t}.0, "type": "MISSION_CURRENT", "seq": {}}}"#, step / 10)
                .ok();
        }
        if step == 40 {
            writeln!(log, r#"{{"time": {t}.0, "type": "STATUSTEXT", "text": "Mission complete"}}"#)
                .ok();
        } else if step >= 10 {
            writeln!(log, r##"{{"time": {t}.0, "type": "STATUSTEXT", "text": "#TR# 15.2000"}}"##)
                .ok();
            writeln!(log, r#"{{"time": {t}.0, "type": "STATUSTEXT", "text": "EKF3 lane switch"}}"#)
                .ok();
        }
    }
    log
}

fn write_fixture(dir: &TempDir, name: &str, body: &str) -> Result<PathBuf> {
    let path = dir.path().join(name);
    fs::write(&path, body)?;
    Ok(path)
}

fn replay(log: &Path, scenario: &Path) -> Result<Result<divewatch::ScenarioReport, ScenarioError>> {
    let config = ScenarioConfig::load(scenario)?;
    let progress = MissionProgress::new();
    let mut sampler = Sampler::new(JsonLinesSource::open(log)?).with_progress(progress.clone());
    Ok(ScenarioRunner::from_config(&config).run(&mut sampler, &progress))
}

#[test]
fn recorded_dive_passes_every_step() -> Result<()> {
    init_logging();
    let dir = TempDir::new()?;
    let log = write_fixture(&dir, "dive.jsonl", &dive_log())?;
    let scenario = write_fixture(&dir, "dive.toml", DIVE_SCENARIO)?;

    let report = replay(&log, &scenario)??;
    assert_eq!(report.name, "terrain_dive");
    assert_eq!(report.outcomes.len(), 5);
    assert_eq!(report.outcomes[0].finished_at, SimTime::from_secs(4.0));
    assert_eq!(report.outcomes[1].finished_at, SimTime::from_secs(10.0));
    assert!(report.outcomes[2].detail.contains("reached waypoint 2"));
    assert_eq!(report.outcomes[2].finished_at, SimTime::from_secs(20.0));
    assert!(report.outcomes[3].detail.contains("Mission complete"));
    assert_eq!(report.outcomes[4].finished_at, SimTime::from_secs(45.0));
    Ok(())
}

#[test]
fn hold_during_descent_fails_first_step() -> Result<()> {
    init_logging();
    let dir = TempDir::new()?;
    let log = write_fixture(&dir, "dive.jsonl", &dive_log())?;
    let scenario = write_fixture(&dir, "early.toml", EARLY_HOLD_SCENARIO)?;

    let err = replay(&log, &scenario)?.unwrap_err();
    assert_eq!(err.index(), 1);
    match err {
        ScenarioError::Monitor {
            source:
                MonitorError::InvariantViolation {
                    reference,
                    observed,
                    elapsed,
                    ..
                },
            ..
        } => {
            assert_eq!(reference, -1.0);
            assert_eq!(observed, -3.0);
            assert_eq!(elapsed, 1.0);
        }
        other => panic!("unexpected {other:?}"),
    }
    Ok(())
}

#[test]
fn late_starting_log_is_timed_from_its_first_record() -> Result<()> {
    init_logging();
    let dir = TempDir::new()?;
    let log = write_fixture(&dir, "late.jsonl", &dive_log_from(1000))?;
    let passing = write_fixture(&dir, "dive.toml", DIVE_SCENARIO)?;
    let failing = write_fixture(&dir, "early.toml", EARLY_HOLD_SCENARIO)?;

    let report = replay(&log, &passing)??;
    assert_eq!(report.outcomes.len(), 5);
    assert_eq!(report.outcomes[0].finished_at, SimTime::from_secs(1004.0));
    assert_eq!(report.outcomes[1].finished_at, SimTime::from_secs(1010.0));
    assert_eq!(report.outcomes[2].finished_at, SimTime::from_secs(1020.0));
    assert_eq!(report.outcomes[4].finished_at, SimTime::from_secs(1045.0));

    let err = replay(&log, &failing)?.unwrap_err();
    assert_eq!(err.index(), 1);
    assert!(matches!(
        err,
        ScenarioError::Monitor {
            source: MonitorError::InvariantViolation { elapsed, .. },
            ..
        } if elapsed == 1.0
    ));
    Ok(())
}

#[test]
fn malformed_log_line_surfaces_through_the_monitor() -> Result<()> {
    init_logging();
    let dir = TempDir::new()?;
    let log = write_fixture(
        &dir,
        "broken.jsonl",
        "{\"time\": 0.0, \"type\": \"VFR_HUD\", \"alt\": -5.0}\n{\"time\": 1.0, \"type\": \"VFR_HUD\", \"alt\": }\n",
    )?;
    let mut sampler = Sampler::new(JsonLinesSource::open(&log)?);
    let err = InvariantMonitor::new(&mut sampler)
        .hold(Signal::Altitude, 0.3, 5.0)
        .unwrap_err();
    assert!(matches!(
        err,
        MonitorError::Sampler(SamplerError::Decode { line: 2, .. })
    ));
    Ok(())
}

#[test]
fn channel_stream_feeds_consecutive_sessions_until_closed() {
    init_logging();
    let (feed, source) = telemetry_channel();
    let producer = thread::spawn(move || {
        for i in 0..20u32 {
            if feed.send(Sample::altitude(f64::from(i) * 0.5, -5.0)).is_err() {
                break;
            }
        }
    });

    let mut sampler = Sampler::new(source);
    let first = InvariantMonitor::new(&mut sampler)
        .hold(Signal::Altitude, 0.3, 5.0)
        .unwrap();
    assert_eq!(first.exit, SessionExit::DeadlineElapsed);
    assert_eq!(first.elapsed, 5.5);

    let second = InvariantMonitor::new(&mut sampler)
        .hold(Signal::Altitude, 0.3, 5.0)
        .unwrap_err();
    assert!(second.is_stream_closed());
    producer.join().unwrap();
}

#[test]
fn cli_reports_pass_and_fail() -> Result<()> {
    let dir = TempDir::new()?;
    let log = write_fixture(&dir, "dive.jsonl", &dive_log())?;
    let passing = write_fixture(&dir, "dive.toml", DIVE_SCENARIO)?;
    let failing = write_fixture(&dir, "early.toml", EARLY_HOLD_SCENARIO)?;

    let output = Command::new(env!("CARGO_BIN_EXE_divewatch"))
        .arg("--log")
        .arg(&log)
        .arg("--scenario")
        .arg(&passing)
        .output()?;
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("terrain_dive: PASS (5 steps)"));

    let output = Command::new(env!("CARGO_BIN_EXE_divewatch"))
        .arg("--log")
        .arg(&log)
        .arg("--scenario")
        .arg(&failing)
        .output()?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("premature_hold: FAIL at step 1"));
    Ok(())
}
