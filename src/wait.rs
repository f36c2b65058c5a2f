// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Reach-style waits (value band, heading, status text, waypoint, delay) on simulated time.
// Author: Lukas Bower

//! Reach waits.
//!
//! Where the [`monitor`](crate::monitor) checks that a value *stays* put,
//! these helpers wait for a value to *get* somewhere before a deadline. A
//! scenario typically drives the vehicle into a band with a wait and then
//! holds it there with a monitor session.

use log::{debug, info};
use thiserror::Error;

use crate::clock::SimTime;
use crate::extract::Signal;
use crate::sampler::{SamplerError, TelemetrySampler};
use crate::telemetry::{MessageKind, Telemetry};

/// Failures ending a wait.
#[derive(Debug, Error)]
pub enum WaitError {
    /// The value did not settle inside the band before the deadline.
    #[error("{what} not achieved: want {min:.2}..{max:.2} got={} after {elapsed:.2}s", describe(.last))]
    NotAchieved {
        /// Signal label.
        what: &'static str,
        /// Lower band edge.
        min: f64,
        /// Upper band edge.
        max: f64,
        /// Last value observed, if any.
        last: Option<f64>,
        /// Simulated seconds waited.
        elapsed: f64,
    },
    /// No matching status text arrived in time.
    #[error("status text containing {needle:?} not seen within {timeout:.2}s")]
    StatusTextMissing {
        /// Substring searched for.
        needle: String,
        /// Deadline in simulated seconds.
        timeout: f64,
    },
    /// The mission did not reach the waypoint in time.
    #[error("waypoint {target} not reached within {timeout:.2}s, last waypoint {last}")]
    WaypointMissed {
        /// Required waypoint.
        target: u32,
        /// Last reported waypoint.
        last: u32,
        /// Deadline in simulated seconds.
        timeout: f64,
    },
    /// Wait parameters were rejected before sampling.
    #[error("invalid wait: {0}")]
    InvalidWait(String),
    /// The sampler failed.
    #[error(transparent)]
    Sampler(#[from] SamplerError),
}

fn describe(last: &Option<f64>) -> String {
    match last {
        Some(value) => format!("{value:.2}"),
        None => "nothing".to_owned(),
    }
}

/// Outcome of a successful band wait.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WaitReport {
    /// Value that completed the wait.
    pub value: f64,
    /// Simulated seconds from start to success.
    pub elapsed: f64,
}

/// Wait until `signal` stays within `[min, max]` for `minimum_duration` seconds.
///
/// Leaving the band resets the dwell timer.
pub fn wait_range<S: TelemetrySampler + ?Sized>(
    sampler: &mut S,
    signal: &Signal,
    min: f64,
    max: f64,
    timeout: f64,
    minimum_duration: f64,
) -> Result<WaitReport, WaitError> {
    if !(min <= max) {
        return Err(WaitError::InvalidWait(format!("empty band {min}..{max}")));
    }
    info!("waiting for {} in {min:.2}..{max:.2}", signal.label());
    settle(sampler, signal, (min, max), timeout, minimum_duration, |value| {
        (min..=max).contains(&value)
    })
}

/// Wait until the `VFR_HUD` heading is within `accuracy` degrees of `heading`.
pub fn wait_heading<S: TelemetrySampler + ?Sized>(
    sampler: &mut S,
    heading: f64,
    accuracy: f64,
    timeout: f64,
    minimum_duration: f64,
) -> Result<WaitReport, WaitError> {
    if !accuracy.is_finite() || accuracy < 0.0 {
        return Err(WaitError::InvalidWait(format!("heading accuracy {accuracy}")));
    }
    info!("waiting for heading {heading:.0} (+/- {accuracy:.0})");
    let band = (heading - accuracy, heading + accuracy);
    settle(sampler, &Signal::Heading, band, timeout, minimum_duration, |value| {
        heading_error(value, heading) <= accuracy
    })
}

/// Smallest angle in degrees between two headings.
#[must_use]
pub fn heading_error(a: f64, b: f64) -> f64 {
    let diff = (a - b).rem_euclid(360.0);
    diff.min(360.0 - diff)
}

fn settle<S, F>(
    sampler: &mut S,
    signal: &Signal,
    band: (f64, f64),
    timeout: f64,
    minimum_duration: f64,
    in_band: F,
) -> Result<WaitReport, WaitError>
where
    S: TelemetrySampler + ?Sized,
    F: Fn(f64) -> bool,
{
    let start = sampler.anchor()?;
    let mut achieved_since: Option<SimTime> = None;
    let mut last = None;
    loop {
        let elapsed = sampler.now_cached().since(start);
        if elapsed > timeout {
            return Err(WaitError::NotAchieved {
                what: signal.label(),
                min: band.0,
                max: band.1,
                last,
                elapsed,
            });
        }
        let sample = sampler.next(signal.kind())?;
        let Some(value) = signal.read(&sample).filter(|v| v.is_finite()) else {
            continue;
        };
        last = Some(value);
        let now = sampler.now_cached();
        if !in_band(value) {
            if achieved_since.take().is_some() {
                debug!("{} left band at {value:.2}", signal.label());
            }
            continue;
        }
        let since = *achieved_since.get_or_insert(now);
        if now.since(since) >= minimum_duration {
            let elapsed = now.since(start);
            info!("{} reached {value:.2} after {elapsed:.2}s", signal.label());
            return Ok(WaitReport { value, elapsed });
        }
    }
}

/// Wait for a `STATUSTEXT` containing `needle`; returns the full text.
pub fn wait_statustext<S: TelemetrySampler + ?Sized>(
    sampler: &mut S,
    needle: &str,
    timeout: f64,
) -> Result<String, WaitError> {
    let start = sampler.anchor()?;
    loop {
        if sampler.now_cached().since(start) > timeout {
            return Err(WaitError::StatusTextMissing {
                needle: needle.to_owned(),
                timeout,
            });
        }
        let sample = sampler.next(MessageKind::StatusText)?;
        if let Telemetry::StatusText { text } = sample.message {
            if text.contains(needle) {
                info!("saw status text {text:?}");
                return Ok(text);
            }
        }
    }
}

/// Wait for `MISSION_CURRENT` to report waypoint `target` or later.
pub fn wait_waypoint<S: TelemetrySampler + ?Sized>(
    sampler: &mut S,
    target: u32,
    timeout: f64,
) -> Result<u32, WaitError> {
    let start = sampler.anchor()?;
    let mut last = 0;
    loop {
        if sampler.now_cached().since(start) > timeout {
            return Err(WaitError::WaypointMissed {
                target,
                last,
                timeout,
            });
        }
        let sample = sampler.next(MessageKind::MissionCurrent)?;
        if let Telemetry::MissionCurrent { seq } = sample.message {
            last = last.max(seq);
            if seq >= target {
                info!("reached waypoint {seq}");
                return Ok(seq);
            }
        }
    }
}

/// Let `seconds` of simulated time pass, consuming telemetry of any type.
pub fn delay_sim_time<S: TelemetrySampler + ?Sized>(
    sampler: &mut S,
    seconds: f64,
) -> Result<SimTime, WaitError> {
    let start = sampler.anchor()?;
    while sampler.now_cached().since(start) < seconds {
        sampler.next_any()?;
    }
    Ok(sampler.now_cached())
}
