// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Simulated-time value type and the monotonic clock cell used by samplers.
// Author: Lukas Bower

//! Simulation time driven by telemetry arrival.
//!
//! Nothing in this crate reads the wall clock. Every elapsed-time comparison
//! goes through [`SimTime`] values cached by a [`SimClock`], which only moves
//! when a sampler observes a newer message timestamp.

use std::fmt;
use std::ops::Sub;

use serde::{Deserialize, Serialize};

/// Simulated time in seconds since the simulation started.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimTime(f64);

impl SimTime {
    /// Simulation start.
    pub const ZERO: Self = Self(0.0);

    /// Build a time stamp from simulated seconds.
    #[must_use]
    pub const fn from_secs(secs: f64) -> Self {
        Self(secs)
    }

    /// Return the time stamp in simulated seconds.
    #[must_use]
    pub const fn as_secs(self) -> f64 {
        self.0
    }

    /// Seconds elapsed since `earlier`, saturating at zero.
    #[must_use]
    pub fn since(self, earlier: SimTime) -> f64 {
        (self.0 - earlier.0).max(0.0)
    }
}

impl Sub for SimTime {
    type Output = f64;

    fn sub(self, rhs: Self) -> f64 {
        self.0 - rhs.0
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.0)
    }
}

/// Monotonic cache of the latest simulated time observed on a stream.
///
/// The clock is unset until the first finite timestamp arrives, so a stream
/// that starts well after zero does not look like it already ran for that long.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimClock {
    latest: Option<SimTime>,
}

impl SimClock {
    /// Create a clock positioned at `start`.
    #[must_use]
    pub const fn starting_at(start: SimTime) -> Self {
        Self {
            latest: Some(start),
        }
    }

    /// Fold an observed timestamp into the clock and return the cached value.
    ///
    /// Older or non-finite timestamps leave the clock where it is.
    pub fn observe(&mut self, stamp: SimTime) -> SimTime {
        if stamp.as_secs().is_finite() && self.latest.map_or(true, |latest| stamp > latest) {
            self.latest = Some(stamp);
        }
        self.now()
    }

    /// Latest cached time, or [`SimTime::ZERO`] before anything was observed.
    #[must_use]
    pub fn now(&self) -> SimTime {
        self.latest.unwrap_or(SimTime::ZERO)
    }

    /// Latest cached time, if any timestamp has been observed.
    #[must_use]
    pub const fn latest(&self) -> Option<SimTime> {
        self.latest
    }
}
