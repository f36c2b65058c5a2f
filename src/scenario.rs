// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Scenario driver sequencing watch and wait steps against a telemetry sampler.
// Author: Lukas Bower

//! Scenario driver.
//!
//! Runs the observation half of an acceptance scenario: each step either
//! opens a monitor session or waits for the vehicle to reach a state. The
//! first failing step ends the run; cleanup such as disarming belongs to
//! whoever drives the vehicle.

use std::fmt;

use log::{error, info};
use thiserror::Error;

use crate::clock::SimTime;
use crate::config::ScenarioConfig;
use crate::extract::Signal;
use crate::monitor::{InvariantMonitor, MonitorError, Watch};
use crate::progress::ProgressCounter;
use crate::sampler::TelemetrySampler;
use crate::wait::{self, WaitError};

/// One observation step.
#[derive(Debug, Clone)]
pub enum Step {
    /// Monitor session.
    Watch(Watch),
    /// Wait for `signal` to settle in `[min, max]`.
    WaitRange {
        /// Watched signal.
        signal: Signal,
        /// Lower edge.
        min: f64,
        /// Upper edge.
        max: f64,
        /// Deadline in simulated seconds.
        timeout: f64,
        /// Dwell required inside the band.
        minimum_duration: f64,
    },
    /// Wait for a heading.
    WaitHeading {
        /// Target heading in degrees.
        heading: f64,
        /// Allowed angular error.
        accuracy: f64,
        /// Deadline in simulated seconds.
        timeout: f64,
        /// Dwell required on heading.
        minimum_duration: f64,
    },
    /// Wait for a status text substring.
    WaitStatusText {
        /// Substring to look for.
        needle: String,
        /// Deadline in simulated seconds.
        timeout: f64,
    },
    /// Wait for a mission waypoint.
    WaitWaypoint {
        /// Waypoint index.
        waypoint: u32,
        /// Deadline in simulated seconds.
        timeout: f64,
    },
    /// Let simulated time pass.
    Delay {
        /// Simulated seconds.
        seconds: f64,
    },
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Watch(watch) => write!(f, "watch {} ({:?})", watch.signal.label(), watch.policy),
            Self::WaitRange { signal, min, max, .. } => {
                write!(f, "wait {} in {min:.2}..{max:.2}", signal.label())
            }
            Self::WaitHeading { heading, .. } => write!(f, "wait heading {heading:.0}"),
            Self::WaitStatusText { needle, .. } => write!(f, "wait status text {needle:?}"),
            Self::WaitWaypoint { waypoint, .. } => write!(f, "wait waypoint {waypoint}"),
            Self::Delay { seconds } => write!(f, "delay {seconds:.2}s"),
        }
    }
}

/// Failure of a scenario step.
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// A monitor session failed.
    #[error("{scenario} step {index} ({step}) failed: {source}")]
    Monitor {
        /// Scenario name.
        scenario: String,
        /// One-based step index.
        index: usize,
        /// Step description.
        step: String,
        /// Monitor failure.
        #[source]
        source: MonitorError,
    },
    /// A wait failed.
    #[error("{scenario} step {index} ({step}) failed: {source}")]
    Wait {
        /// Scenario name.
        scenario: String,
        /// One-based step index.
        index: usize,
        /// Step description.
        step: String,
        /// Wait failure.
        #[source]
        source: WaitError,
    },
}

impl ScenarioError {
    /// One-based index of the failing step.
    #[must_use]
    pub fn index(&self) -> usize {
        match self {
            Self::Monitor { index, .. } | Self::Wait { index, .. } => *index,
        }
    }
}

/// Completed step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// One-based step index.
    pub index: usize,
    /// Step description.
    pub step: String,
    /// Result summary.
    pub detail: String,
    /// Simulated time when the step finished.
    pub finished_at: SimTime,
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {:>2}. {}: {}", self.finished_at, self.index, self.step, self.detail)
    }
}

/// Report of a fully passing scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioReport {
    /// Scenario name.
    pub name: String,
    /// Outcomes in step order.
    pub outcomes: Vec<StepOutcome>,
}

/// Ordered steps run against one sampler.
#[derive(Debug, Clone)]
pub struct ScenarioRunner {
    name: String,
    steps: Vec<Step>,
}

enum StepFailure {
    Monitor(MonitorError),
    Wait(WaitError),
}

impl From<MonitorError> for StepFailure {
    fn from(err: MonitorError) -> Self {
        Self::Monitor(err)
    }
}

impl From<WaitError> for StepFailure {
    fn from(err: WaitError) -> Self {
        Self::Wait(err)
    }
}

impl ScenarioRunner {
    /// Build a runner from explicit steps.
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }

    /// Build a runner from a validated scenario file.
    #[must_use]
    pub fn from_config(config: &ScenarioConfig) -> Self {
        Self::new(config.name.clone(), config.build_steps())
    }

    /// Scenario name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configured steps.
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Run every step in order, stopping at the first failure.
    pub fn run<S: TelemetrySampler + ?Sized>(
        &self,
        sampler: &mut S,
        progress: &dyn ProgressCounter,
    ) -> Result<ScenarioReport, ScenarioError> {
        info!("scenario {}: {} steps", self.name, self.steps.len());
        let mut outcomes = Vec::with_capacity(self.steps.len());
        for (offset, step) in self.steps.iter().enumerate() {
            let index = offset + 1;
            match run_step(step, sampler, progress) {
                Ok(detail) => {
                    let outcome = StepOutcome {
                        index,
                        step: step.to_string(),
                        detail,
                        finished_at: sampler.now_cached(),
                    };
                    info!("{} {outcome}", self.name);
                    outcomes.push(outcome);
                }
                Err(failure) => {
                    let err = match failure {
                        StepFailure::Monitor(source) => ScenarioError::Monitor {
                            scenario: self.name.clone(),
                            index,
                            step: step.to_string(),
                            source,
                        },
                        StepFailure::Wait(source) => ScenarioError::Wait {
                            scenario: self.name.clone(),
                            index,
                            step: step.to_string(),
                            source,
                        },
                    };
                    error!("{err}");
                    return Err(err);
                }
            }
        }
        Ok(ScenarioReport {
            name: self.name.clone(),
            outcomes,
        })
    }
}

fn run_step<S: TelemetrySampler + ?Sized>(
    step: &Step,
    sampler: &mut S,
    progress: &dyn ProgressCounter,
) -> Result<String, StepFailure> {
    let detail = match step {
        Step::Watch(watch) => InvariantMonitor::new(sampler)
            .with_progress(progress)
            .watch(watch)?
            .to_string(),
        Step::WaitRange {
            signal,
            min,
            max,
            timeout,
            minimum_duration,
        } => {
            let report = wait::wait_range(sampler, signal, *min, *max, *timeout, *minimum_duration)?;
            format!("reached {:.2} after {:.2}s", report.value, report.elapsed)
        }
        Step::WaitHeading {
            heading,
            accuracy,
            timeout,
            minimum_duration,
        } => {
            let report = wait::wait_heading(sampler, *heading, *accuracy, *timeout, *minimum_duration)?;
            format!("heading {:.0} after {:.2}s", report.value, report.elapsed)
        }
        Step::WaitStatusText { needle, timeout } => {
            let text = wait::wait_statustext(sampler, needle, *timeout)?;
            format!("saw {text:?}")
        }
        Step::WaitWaypoint { waypoint, timeout } => {
            let seq = wait::wait_waypoint(sampler, *waypoint, *timeout)?;
            format!("at waypoint {seq}")
        }
        Step::Delay { seconds } => {
            let now = wait::delay_sim_time(sampler, *seconds)?;
            format!("clock at {now}")
        }
    };
    Ok(detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::MissionProgress;
    use crate::sampler::{Sampler, ScriptedSource};
    use crate::telemetry::Sample;

    #[test]
    fn stops_at_first_failing_step() {
        let progress = MissionProgress::new();
        let mut sampler = Sampler::new(ScriptedSource::new([
            Sample::altitude(0.0, -3.0),
            Sample::altitude(1.0, -5.5),
            Sample::altitude(2.0, -5.5),
            Sample::altitude(3.0, -7.0),
            Sample::altitude(4.0, -5.5),
        ]))
        .with_progress(progress.clone());
        let runner = ScenarioRunner::new(
            "dive",
            vec![
                Step::WaitRange {
                    signal: Signal::Altitude,
                    min: -6.0,
                    max: -5.0,
                    timeout: 10.0,
                    minimum_duration: 0.0,
                },
                Step::Watch(Watch::hold(Signal::Altitude)),
                Step::Delay { seconds: 1.0 },
            ],
        );
        let err = runner.run(&mut sampler, &progress).unwrap_err();
        assert_eq!(err.index(), 2);
        assert!(matches!(
            err,
            ScenarioError::Monitor {
                source: MonitorError::InvariantViolation { .. },
                ..
            }
        ));
    }

    #[test]
    fn report_lists_every_step() {
        let progress = MissionProgress::new();
        let mut sampler = Sampler::new(ScriptedSource::new([
            Sample::status_text(0.0, "rangefinder target is 15.00"),
            Sample::rangefinder(1.0, 15.0),
            Sample::rangefinder(3.0, 15.1),
            Sample::rangefinder(6.5, 14.9),
        ]));
        let runner = ScenarioRunner::new(
            "surftrak",
            vec![
                Step::WaitStatusText {
                    needle: "rangefinder target".to_owned(),
                    timeout: 5.0,
                },
                Step::Watch(Watch::hold(Signal::Rangefinder)),
            ],
        );
        let report = runner.run(&mut sampler, &progress).unwrap();
        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.outcomes[1].finished_at, SimTime::from_secs(6.5));
        assert!(report.outcomes[1].detail.contains("max delta 0.10"));
    }
}
