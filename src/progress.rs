// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Mission progress counter read by progress-gated monitor sessions.
// Author: Lukas Bower

//! External progress counters.
//!
//! The mission executor owns the counter; the monitor only ever reads it.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Read side of a monotonically non-decreasing progress counter.
pub trait ProgressCounter {
    /// Return a consistent snapshot of the current progress value.
    fn current(&self) -> u32;
}

impl<F> ProgressCounter for F
where
    F: Fn() -> u32,
{
    fn current(&self) -> u32 {
        self()
    }
}

/// Shared waypoint index published from `MISSION_CURRENT` telemetry.
///
/// Clones share the same counter, so a sampler can publish into one handle
/// while a monitor session reads another.
#[derive(Clone, Debug, Default)]
pub struct MissionProgress {
    seq: Arc<AtomicU32>,
}

impl MissionProgress {
    /// Create a counter positioned at waypoint zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly reported waypoint index. Regressions are ignored.
    pub fn publish(&self, seq: u32) {
        self.seq.fetch_max(seq, Ordering::AcqRel);
    }
}

impl ProgressCounter for MissionProgress {
    fn current(&self) -> u32 {
        self.seq.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_is_monotonic_across_clones() {
        let progress = MissionProgress::new();
        let reader = progress.clone();
        progress.publish(2);
        progress.publish(1);
        assert_eq!(reader.current(), 2);
        progress.publish(4);
        assert_eq!(reader.current(), 4);
    }

    #[test]
    fn closures_are_counters() {
        let fixed = || 7u32;
        assert_eq!(fixed.current(), 7);
    }
}
