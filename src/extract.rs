// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Select scalar signals from telemetry samples and parse marker-embedded metrics.
// Author: Lukas Bower

//! Signal extraction.
//!
//! A [`Signal`] names which scalar a monitor session reads and from which
//! message channel. Most signals are plain message fields; the "true
//! distance" signal is parsed out of free-text `STATUSTEXT` diagnostics by a
//! [`MetricExtractor`], so the text protocol can change without touching the
//! monitor.

use std::fmt;
use std::sync::Arc;

use crate::telemetry::{MessageKind, Sample, Telemetry};

/// Marker emitted by the synthetic sea-floor script ahead of the true distance.
pub const TRUE_DISTANCE_MARKER: &str = "#TR#";
/// Width of the numeric field following [`TRUE_DISTANCE_MARKER`].
pub const TRUE_DISTANCE_WIDTH: usize = 8;

/// Pull a numeric metric out of diagnostic text.
pub trait MetricExtractor: fmt::Debug + Send + Sync {
    /// Return the embedded value, or `None` when the text does not carry one.
    fn extract(&self, text: &str) -> Option<f64>;
}

/// Marker followed by a fixed-width numeric field, e.g. `"... #TR#  15.0312 ..."`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MarkerExtractor {
    marker: String,
    width: usize,
}

impl MarkerExtractor {
    /// Build an extractor for `marker` followed by `width` characters.
    #[must_use]
    pub fn new(marker: impl Into<String>, width: usize) -> Self {
        Self {
            marker: marker.into(),
            width,
        }
    }

    /// Extractor for the `#TR#` true-distance diagnostics.
    #[must_use]
    pub fn true_distance() -> Self {
        Self::new(TRUE_DISTANCE_MARKER, TRUE_DISTANCE_WIDTH)
    }

    /// Marker searched for.
    #[must_use]
    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Width of the numeric field.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }
}

impl Default for MarkerExtractor {
    fn default() -> Self {
        Self::true_distance()
    }
}

impl MetricExtractor for MarkerExtractor {
    fn extract(&self, text: &str) -> Option<f64> {
        if self.marker.is_empty() {
            return None;
        }
        let start = text.find(&self.marker)? + self.marker.len();
        let field: String = text[start..].chars().take(self.width).collect();
        let value: f64 = field.trim().parse().ok()?;
        value.is_finite().then_some(value)
    }
}

/// Scalar read by a monitor session.
#[derive(Clone, Debug)]
pub enum Signal {
    /// `VFR_HUD.alt` in metres.
    Altitude,
    /// `GLOBAL_POSITION_INT.relative_alt` converted to metres.
    RelativeAltitude,
    /// `RANGEFINDER.distance` in metres.
    Rangefinder,
    /// `VFR_HUD.heading` in degrees.
    Heading,
    /// `VFR_HUD.groundspeed` in metres per second.
    Groundspeed,
    /// Metric embedded in `STATUSTEXT` diagnostics.
    Embedded(Arc<dyn MetricExtractor>),
}

impl Signal {
    /// True distance to the sea floor reported by the simulator script.
    #[must_use]
    pub fn true_distance() -> Self {
        Self::Embedded(Arc::new(MarkerExtractor::true_distance()))
    }

    /// Channel carrying this signal.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Altitude | Self::Heading | Self::Groundspeed => MessageKind::VfrHud,
            Self::RelativeAltitude => MessageKind::GlobalPositionInt,
            Self::Rangefinder => MessageKind::Rangefinder,
            Self::Embedded(_) => MessageKind::StatusText,
        }
    }

    /// Short name used in log lines and failures.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Altitude => "altitude",
            Self::RelativeAltitude => "relative altitude",
            Self::Rangefinder => "distance",
            Self::Heading => "heading",
            Self::Groundspeed => "groundspeed",
            Self::Embedded(_) => "true distance",
        }
    }

    /// Read the signal from `sample`.
    ///
    /// `None` means the sample is on another channel or its text carried no
    /// parsable metric; callers skip such samples.
    #[must_use]
    pub fn read(&self, sample: &Sample) -> Option<f64> {
        match (self, &sample.message) {
            (Self::Altitude, Telemetry::VfrHud { alt, .. }) => Some(*alt),
            (Self::Heading, Telemetry::VfrHud { heading, .. }) => Some(*heading),
            (Self::Groundspeed, Telemetry::VfrHud { groundspeed, .. }) => Some(*groundspeed),
            (Self::RelativeAltitude, Telemetry::GlobalPositionInt { relative_alt, .. }) => {
                Some(*relative_alt as f64 / 1000.0)
            }
            (Self::Rangefinder, Telemetry::Rangefinder { distance }) => Some(*distance),
            (Self::Embedded(extractor), Telemetry::StatusText { text }) => extractor.extract(text),
            _ => None,
        }
    }
}
