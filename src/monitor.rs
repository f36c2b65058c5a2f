// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Invariant monitor running hold, track and progress-gated sessions over telemetry.
// Author: Lukas Bower

//! Telemetry invariant monitor.
//!
//! One parameterised loop serves every watch in the acceptance scenarios:
//!
//! | Policy | Reference | Deadline reached |
//! |--------|-----------|------------------|
//! | [`Policy::Hold`] | first extractable sample | pass |
//! | [`Policy::Track`] | caller-supplied target | pass |
//! | [`Policy::ProgressGated`] | caller-supplied target | fail unless no progress was required |
//!
//! Elapsed time is always simulated time read from the sampler between
//! blocking receives, counted from the sampler's anchor (the first stamp on a
//! fresh stream), so a deadline is only noticed once the next sample
//! arrives. A sample deviating from the reference by more than the tolerance
//! ends the session immediately; samples whose metric cannot be extracted are
//! skipped.

use std::fmt;

use log::{debug, info, trace};
use thiserror::Error;

use crate::clock::SimTime;
use crate::extract::Signal;
use crate::progress::ProgressCounter;
use crate::sampler::{SamplerError, TelemetrySampler};
use crate::telemetry::Sample;

/// Default allowed deviation, in the signal's unit.
pub const DEFAULT_TOLERANCE: f64 = 0.3;
/// Default session length in simulated seconds.
pub const DEFAULT_TIMEOUT: f64 = 5.0;

/// How a session obtains its reference and interprets the deadline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Policy {
    /// Stay within tolerance of the first observed value.
    Hold,
    /// Stay within tolerance of a fixed target.
    Track {
        /// Reference value.
        target: f64,
    },
    /// Stay within tolerance of a target until the progress counter reaches `target_progress`.
    ProgressGated {
        /// Reference value.
        target: f64,
        /// Progress value that ends the session successfully.
        target_progress: u32,
    },
}

/// Parameters of one monitor session.
#[derive(Clone, Debug)]
pub struct Watch {
    /// Scalar being watched.
    pub signal: Signal,
    /// Reference and deadline policy.
    pub policy: Policy,
    /// Maximum allowed deviation from the reference.
    pub tolerance: f64,
    /// Session length in simulated seconds.
    pub timeout: f64,
}

impl Watch {
    /// Hold the first observed value of `signal`.
    #[must_use]
    pub fn hold(signal: Signal) -> Self {
        Self::with_policy(signal, Policy::Hold)
    }

    /// Track a fixed `target`.
    #[must_use]
    pub fn track(signal: Signal, target: f64) -> Self {
        Self::with_policy(signal, Policy::Track { target })
    }

    /// Track `target` until the progress counter reaches `target_progress`.
    #[must_use]
    pub fn progress_gated(signal: Signal, target: f64, target_progress: u32) -> Self {
        Self::with_policy(
            signal,
            Policy::ProgressGated {
                target,
                target_progress,
            },
        )
    }

    fn with_policy(signal: Signal, policy: Policy) -> Self {
        Self {
            signal,
            policy,
            tolerance: DEFAULT_TOLERANCE,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the tolerance.
    #[must_use]
    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Override the timeout.
    #[must_use]
    pub fn timeout(mut self, secs: f64) -> Self {
        self.timeout = secs;
        self
    }

    fn validate(&self) -> Result<(), MonitorError> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(MonitorError::InvalidWatch(format!(
                "tolerance {} must be finite and non-negative",
                self.tolerance
            )));
        }
        if !self.timeout.is_finite() || self.timeout < 0.0 {
            return Err(MonitorError::InvalidWatch(format!(
                "timeout {} must be finite and non-negative",
                self.timeout
            )));
        }
        match self.policy {
            Policy::Track { target } | Policy::ProgressGated { target, .. } if !target.is_finite() => {
                Err(MonitorError::InvalidWatch(format!("target {target} must be finite")))
            }
            _ => Ok(()),
        }
    }
}

/// Why a session ended successfully.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionExit {
    /// The invariant held until the deadline passed.
    DeadlineElapsed,
    /// The progress counter reached its target.
    ProgressReached {
        /// Counter value observed at exit.
        progress: u32,
    },
}

/// Diagnostics of a successful session.
#[derive(Clone, Debug, PartialEq)]
pub struct MonitorReport {
    /// Watched signal label.
    pub signal: &'static str,
    /// Baseline or target the samples were compared against.
    pub reference: f64,
    /// Tolerance applied.
    pub tolerance: f64,
    /// Largest deviation observed.
    pub max_observed_deviation: f64,
    /// Simulated seconds from session start to exit.
    pub elapsed: f64,
    /// Samples compared against the reference.
    pub checked: u64,
    /// Samples skipped because no metric could be extracted.
    pub skipped: u64,
    /// Exit reason.
    pub exit: SessionExit,
}

impl fmt::Display for MonitorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} held at {:.2} (+/- {:.2}) for {:.2}s, max delta {:.2}",
            self.signal, self.reference, self.tolerance, self.elapsed, self.max_observed_deviation
        )?;
        if let SessionExit::ProgressReached { progress } = self.exit {
            write!(f, ", reached waypoint {progress}")?;
        }
        Ok(())
    }
}

/// Failures ending a monitor session.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// A sample left the tolerance band around the reference.
    #[error(
        "{signal} not maintained: want {reference:.2} (+/- {tolerance:.2}) got={observed:.2} ({deviation:.2}) after {elapsed:.2}s"
    )]
    InvariantViolation {
        /// Watched signal label.
        signal: &'static str,
        /// Baseline or target.
        reference: f64,
        /// Tolerance applied.
        tolerance: f64,
        /// Offending value.
        observed: f64,
        /// Absolute deviation of the offending value.
        deviation: f64,
        /// Simulated seconds since session start.
        elapsed: f64,
    },
    /// The deadline passed before the progress counter reached its target.
    #[error(
        "mission not complete: want waypoint {target_progress}, only made it to waypoint {last_progress} after {elapsed:.2}s (max delta {max_observed_deviation:.2})"
    )]
    MissionStalled {
        /// Required progress value.
        target_progress: u32,
        /// Last progress value observed.
        last_progress: u32,
        /// Simulated seconds since session start.
        elapsed: f64,
        /// Largest deviation observed before stalling.
        max_observed_deviation: f64,
    },
    /// No extractable sample arrived before the deadline of a hold session.
    #[error("no {signal} baseline within {timeout:.2}s ({skipped} samples unreadable)")]
    NoBaseline {
        /// Watched signal label.
        signal: &'static str,
        /// Session timeout.
        timeout: f64,
        /// Samples skipped while waiting.
        skipped: u64,
    },
    /// A progress-gated session requiring progress had no counter attached.
    #[error("progress-gated watch requires a progress counter")]
    MissingProgressCounter,
    /// Watch parameters were rejected before sampling.
    #[error("invalid watch: {0}")]
    InvalidWatch(String),
    /// The sampler failed; `StreamClosed` lands here.
    #[error(transparent)]
    Sampler(#[from] SamplerError),
}

impl MonitorError {
    /// Returns `true` when the telemetry stream terminated mid-session.
    #[must_use]
    pub fn is_stream_closed(&self) -> bool {
        matches!(self, Self::Sampler(SamplerError::StreamClosed))
    }
}

/// Runs monitor sessions against a borrowed sampler.
pub struct InvariantMonitor<'a, S: ?Sized> {
    sampler: &'a mut S,
    progress: Option<&'a dyn ProgressCounter>,
}

impl<'a, S: TelemetrySampler + ?Sized> InvariantMonitor<'a, S> {
    /// Borrow `sampler` for the monitor's sessions.
    pub fn new(sampler: &'a mut S) -> Self {
        Self {
            sampler,
            progress: None,
        }
    }

    /// Attach the counter read by progress-gated sessions.
    #[must_use]
    pub fn with_progress(mut self, counter: &'a dyn ProgressCounter) -> Self {
        self.progress = Some(counter);
        self
    }

    /// Hold the first observed value of `signal`.
    pub fn hold(
        &mut self,
        signal: Signal,
        tolerance: f64,
        timeout: f64,
    ) -> Result<MonitorReport, MonitorError> {
        self.watch(&Watch::hold(signal).tolerance(tolerance).timeout(timeout))
    }

    /// Track a fixed `target`.
    pub fn track(
        &mut self,
        signal: Signal,
        target: f64,
        tolerance: f64,
        timeout: f64,
    ) -> Result<MonitorReport, MonitorError> {
        self.watch(&Watch::track(signal, target).tolerance(tolerance).timeout(timeout))
    }

    /// Track `target` until the progress counter reaches `target_progress`.
    pub fn progress_gated(
        &mut self,
        signal: Signal,
        target: f64,
        tolerance: f64,
        timeout: f64,
        target_progress: u32,
    ) -> Result<MonitorReport, MonitorError> {
        self.watch(
            &Watch::progress_gated(signal, target, target_progress)
                .tolerance(tolerance)
                .timeout(timeout),
        )
    }

    /// Run one session to completion.
    pub fn watch(&mut self, watch: &Watch) -> Result<MonitorReport, MonitorError> {
        watch.validate()?;
        let gate = match watch.policy {
            Policy::ProgressGated {
                target_progress, ..
            } if target_progress > 0 => {
                let counter = self.progress.ok_or(MonitorError::MissingProgressCounter)?;
                Some((target_progress, counter))
            }
            _ => None,
        };

        let start = self.sampler.anchor()?;
        let mut session = Session::new(watch, start);
        let reference = match watch.policy {
            Policy::Hold => self.capture_baseline(watch, &mut session)?,
            Policy::Track { target } | Policy::ProgressGated { target, .. } => target,
        };
        info!(
            "{} to be watched: {:.2} (+/- {:.2}) for {:.2}s",
            watch.signal.label(),
            reference,
            watch.tolerance,
            watch.timeout
        );

        loop {
            let elapsed = session.elapsed(self.sampler.now_cached());
            if elapsed > watch.timeout {
                if let Some((target_progress, counter)) = gate {
                    return Err(MonitorError::MissionStalled {
                        target_progress,
                        last_progress: counter.current(),
                        elapsed,
                        max_observed_deviation: session.max_deviation,
                    });
                }
                let report = session.finish(reference, elapsed, SessionExit::DeadlineElapsed);
                info!("{} hold done. Max delta:{:.2}", report.signal, report.max_observed_deviation);
                return Ok(report);
            }
            if let Some((target_progress, counter)) = gate {
                let progress = counter.current();
                if progress >= target_progress {
                    let report =
                        session.finish(reference, elapsed, SessionExit::ProgressReached { progress });
                    info!(
                        "{} hold during mission done at waypoint {progress}. Max delta:{:.2}",
                        report.signal, report.max_observed_deviation
                    );
                    return Ok(report);
                }
            }

            let sample = self.sampler.next(watch.signal.kind())?;
            let Some(value) = read_finite(&watch.signal, &sample) else {
                session.skipped += 1;
                debug!("skipping unreadable {} sample @ {}", sample.kind(), sample.time);
                continue;
            };
            session.checked += 1;
            let deviation = (value - reference).abs();
            session.max_deviation = session.max_deviation.max(deviation);
            trace!("{} {value:.3} delta {deviation:.3} @ {}", watch.signal.label(), sample.time);
            if deviation > watch.tolerance {
                return Err(MonitorError::InvariantViolation {
                    signal: watch.signal.label(),
                    reference,
                    tolerance: watch.tolerance,
                    observed: value,
                    deviation,
                    elapsed: session.elapsed(self.sampler.now_cached()),
                });
            }
        }
    }

    fn capture_baseline(&mut self, watch: &Watch, session: &mut Session) -> Result<f64, MonitorError> {
        loop {
            let sample = self.sampler.next(watch.signal.kind())?;
            if let Some(value) = read_finite(&watch.signal, &sample) {
                return Ok(value);
            }
            session.skipped += 1;
            if session.elapsed(self.sampler.now_cached()) > watch.timeout {
                return Err(MonitorError::NoBaseline {
                    signal: watch.signal.label(),
                    timeout: watch.timeout,
                    skipped: session.skipped,
                });
            }
        }
    }
}

fn read_finite(signal: &Signal, sample: &Sample) -> Option<f64> {
    signal.read(sample).filter(|value| value.is_finite())
}

/// Transient state of one session; dropped when the watch call returns.
struct Session {
    signal: &'static str,
    tolerance: f64,
    start: SimTime,
    max_deviation: f64,
    checked: u64,
    skipped: u64,
}

impl Session {
    fn new(watch: &Watch, start: SimTime) -> Self {
        Self {
            signal: watch.signal.label(),
            tolerance: watch.tolerance,
            start,
            max_deviation: 0.0,
            checked: 0,
            skipped: 0,
        }
    }

    fn elapsed(&self, now: SimTime) -> f64 {
        now.since(self.start)
    }

    fn finish(&self, reference: f64, elapsed: f64, exit: SessionExit) -> MonitorReport {
        MonitorReport {
            signal: self.signal,
            reference,
            tolerance: self.tolerance,
            max_observed_deviation: self.max_deviation,
            elapsed,
            checked: self.checked,
            skipped: self.skipped,
            exit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::{Sampler, ScriptedSource};

    fn altitudes(points: &[(f64, f64)]) -> Sampler<ScriptedSource> {
        Sampler::new(
            points
                .iter()
                .map(|&(t, alt)| Sample::altitude(t, alt))
                .collect::<ScriptedSource>(),
        )
    }

    #[test]
    fn hold_survives_to_first_sample_past_deadline() {
        let mut sampler = altitudes(&[(0.0, 5.0), (1.0, 5.2), (4.9, 5.25), (5.1, 5.1), (6.0, 9.0)]);
        let report = InvariantMonitor::new(&mut sampler)
            .hold(Signal::Altitude, 0.3, 5.0)
            .unwrap();
        assert_eq!(report.reference, 5.0);
        assert!((report.max_observed_deviation - 0.25).abs() < 1e-9);
        assert!((report.elapsed - 5.1).abs() < 1e-9);
        assert_eq!(report.exit, SessionExit::DeadlineElapsed);
        assert_eq!(report.checked, 3);
        assert_eq!(sampler.source_mut().remaining(), 1);
    }

    #[test]
    fn hold_violation_stops_consuming() {
        let mut sampler = altitudes(&[(0.0, 5.0), (2.0, 5.35), (3.0, 5.0)]);
        let err = InvariantMonitor::new(&mut sampler)
            .hold(Signal::Altitude, 0.3, 5.0)
            .unwrap_err();
        match err {
            MonitorError::InvariantViolation {
                reference,
                tolerance,
                observed,
                deviation,
                elapsed,
                ..
            } => {
                assert_eq!(reference, 5.0);
                assert_eq!(tolerance, 0.3);
                assert_eq!(observed, 5.35);
                assert!((deviation - 0.35).abs() < 1e-9);
                assert_eq!(elapsed, 2.0);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(sampler.source_mut().remaining(), 1);
    }

    #[test]
    fn rejects_negative_tolerance_before_sampling() {
        let mut sampler = altitudes(&[(0.0, 5.0)]);
        let err = InvariantMonitor::new(&mut sampler)
            .hold(Signal::Altitude, -0.1, 5.0)
            .unwrap_err();
        assert!(matches!(err, MonitorError::InvalidWatch(_)));
        assert_eq!(sampler.delivered(), 0);
    }

    #[test]
    fn gated_watch_without_counter_is_rejected() {
        let mut sampler = altitudes(&[(0.0, 5.0)]);
        let err = InvariantMonitor::new(&mut sampler)
            .progress_gated(Signal::Altitude, 5.0, 0.3, 5.0, 2)
            .unwrap_err();
        assert!(matches!(err, MonitorError::MissingProgressCounter));
    }

    #[test]
    fn stream_closed_propagates() {
        let mut sampler = altitudes(&[(0.0, 5.0), (1.0, 5.1)]);
        let err = InvariantMonitor::new(&mut sampler)
            .hold(Signal::Altitude, 0.3, 5.0)
            .unwrap_err();
        assert!(err.is_stream_closed());
    }

    #[test]
    fn non_finite_values_are_skipped() {
        let mut sampler = altitudes(&[(0.0, f64::NAN), (0.5, 5.0), (1.0, f64::NAN), (6.0, 5.1)]);
        let report = InvariantMonitor::new(&mut sampler)
            .hold(Signal::Altitude, 0.3, 5.0)
            .unwrap();
        assert_eq!(report.reference, 5.0);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.checked, 1);
    }
}
