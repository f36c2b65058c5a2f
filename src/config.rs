// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: TOML scenario files describing ordered watch and wait steps.
// Author: Lukas Bower

//! Scenario configuration.
//!
//! ```toml
//! name = "terrain_mission"
//!
//! [extraction]
//! marker = "#TR#"
//! width = 8
//!
//! [[step]]
//! kind = "wait_range"
//! signal = "altitude"
//! min = -36.0
//! max = -35.0
//! timeout = 120.0
//!
//! [[step]]
//! kind = "progress_gated"
//! signal = "true_distance"
//! target = 15.0
//! tolerance = 1.5
//! timeout = 500.0
//! target_progress = 4
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::extract::{MarkerExtractor, Signal, TRUE_DISTANCE_MARKER, TRUE_DISTANCE_WIDTH};
use crate::monitor::{Watch, DEFAULT_TIMEOUT, DEFAULT_TOLERANCE};
use crate::scenario::Step;

const DEFAULT_WAIT_TIMEOUT: f64 = 30.0;
const DEFAULT_STATUSTEXT_TIMEOUT: f64 = 20.0;
const DEFAULT_HEADING_ACCURACY: f64 = 5.0;

/// Errors produced while loading scenario files.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The scenario file could not be read.
    #[error("failed to read scenario {path}: {source}")]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// The scenario file is not valid TOML for this schema.
    #[error("failed to parse scenario: {0}")]
    Parse(#[from] toml::de::Error),
    /// A step failed validation.
    #[error("step {index} ({kind}): {reason}")]
    InvalidStep {
        /// One-based step index.
        index: usize,
        /// Step kind.
        kind: &'static str,
        /// Why it was rejected.
        reason: String,
    },
    /// Scenario-level validation failure.
    #[error("invalid scenario: {0}")]
    Invalid(String),
}

/// Root of a scenario file.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioConfig {
    /// Scenario name used in logs and reports.
    pub name: String,
    /// Text-embedded metric protocol.
    #[serde(default)]
    pub extraction: ExtractionConfig,
    /// Ordered steps.
    #[serde(default, rename = "step")]
    pub steps: Vec<StepConfig>,
}

/// Marker protocol for `true_distance` signals.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Marker preceding the numeric field.
    pub marker: String,
    /// Width of the numeric field.
    pub width: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            marker: TRUE_DISTANCE_MARKER.to_owned(),
            width: TRUE_DISTANCE_WIDTH,
        }
    }
}

/// Signal names accepted in scenario files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalName {
    /// `VFR_HUD.alt`.
    Altitude,
    /// `GLOBAL_POSITION_INT.relative_alt`.
    RelativeAltitude,
    /// `RANGEFINDER.distance`.
    Rangefinder,
    /// `VFR_HUD.heading`.
    Heading,
    /// `VFR_HUD.groundspeed`.
    Groundspeed,
    /// Marker-embedded distance in `STATUSTEXT`.
    TrueDistance,
}

impl SignalName {
    fn to_signal(self, extractor: &Arc<MarkerExtractor>) -> Signal {
        match self {
            Self::Altitude => Signal::Altitude,
            Self::RelativeAltitude => Signal::RelativeAltitude,
            Self::Rangefinder => Signal::Rangefinder,
            Self::Heading => Signal::Heading,
            Self::Groundspeed => Signal::Groundspeed,
            Self::TrueDistance => Signal::Embedded(extractor.clone()),
        }
    }
}

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

fn default_timeout() -> f64 {
    DEFAULT_TIMEOUT
}

fn default_wait_timeout() -> f64 {
    DEFAULT_WAIT_TIMEOUT
}

fn default_statustext_timeout() -> f64 {
    DEFAULT_STATUSTEXT_TIMEOUT
}

fn default_heading_accuracy() -> f64 {
    DEFAULT_HEADING_ACCURACY
}

/// One `[[step]]` entry, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepConfig {
    /// Hold the first observed value.
    Hold {
        /// Watched signal.
        signal: SignalName,
        /// Allowed deviation.
        #[serde(default = "default_tolerance")]
        tolerance: f64,
        /// Session length.
        #[serde(default = "default_timeout")]
        timeout: f64,
    },
    /// Track a fixed target.
    Track {
        /// Watched signal.
        signal: SignalName,
        /// Reference value.
        target: f64,
        /// Allowed deviation.
        #[serde(default = "default_tolerance")]
        tolerance: f64,
        /// Session length.
        #[serde(default = "default_timeout")]
        timeout: f64,
    },
    /// Track a target until the mission reaches a waypoint.
    ProgressGated {
        /// Watched signal.
        signal: SignalName,
        /// Reference value.
        target: f64,
        /// Allowed deviation.
        #[serde(default = "default_tolerance")]
        tolerance: f64,
        /// Session length.
        #[serde(default = "default_timeout")]
        timeout: f64,
        /// Waypoint ending the session.
        #[serde(default)]
        target_progress: u32,
    },
    /// Wait for a value band.
    WaitRange {
        /// Watched signal.
        signal: SignalName,
        /// Lower edge.
        min: f64,
        /// Upper edge.
        max: f64,
        /// Deadline.
        #[serde(default = "default_wait_timeout")]
        timeout: f64,
        /// Dwell required inside the band.
        #[serde(default)]
        minimum_duration: f64,
    },
    /// Wait for a heading.
    WaitHeading {
        /// Target heading in degrees.
        heading: f64,
        /// Allowed angular error.
        #[serde(default = "default_heading_accuracy")]
        accuracy: f64,
        /// Deadline.
        #[serde(default = "default_wait_timeout")]
        timeout: f64,
        /// Dwell required on heading.
        #[serde(default)]
        minimum_duration: f64,
    },
    /// Wait for a status text substring.
    WaitStatustext {
        /// Substring to look for.
        text: String,
        /// Deadline.
        #[serde(default = "default_statustext_timeout")]
        timeout: f64,
    },
    /// Wait for a mission waypoint.
    WaitWaypoint {
        /// Waypoint index.
        waypoint: u32,
        /// Deadline.
        #[serde(default = "default_wait_timeout")]
        timeout: f64,
    },
    /// Let simulated time pass.
    Delay {
        /// Simulated seconds.
        seconds: f64,
    },
}

impl StepConfig {
    /// Kind name as written in the file.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Hold { .. } => "hold",
            Self::Track { .. } => "track",
            Self::ProgressGated { .. } => "progress_gated",
            Self::WaitRange { .. } => "wait_range",
            Self::WaitHeading { .. } => "wait_heading",
            Self::WaitStatustext { .. } => "wait_statustext",
            Self::WaitWaypoint { .. } => "wait_waypoint",
            Self::Delay { .. } => "delay",
        }
    }

    fn check(&self) -> Result<(), String> {
        let durations: Vec<(&str, f64)> = match self {
            Self::Hold {
                tolerance, timeout, ..
            }
            | Self::Track {
                tolerance, timeout, ..
            }
            | Self::ProgressGated {
                tolerance, timeout, ..
            } => vec![("tolerance", *tolerance), ("timeout", *timeout)],
            Self::WaitRange {
                timeout,
                minimum_duration,
                ..
            }
            | Self::WaitHeading {
                timeout,
                minimum_duration,
                ..
            } => vec![("timeout", *timeout), ("minimum_duration", *minimum_duration)],
            Self::WaitStatustext { timeout, .. } | Self::WaitWaypoint { timeout, .. } => {
                vec![("timeout", *timeout)]
            }
            Self::Delay { seconds } => vec![("seconds", *seconds)],
        };
        for (field, value) in durations {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{field} must be finite and non-negative, got {value}"));
            }
        }
        match self {
            Self::WaitRange { min, max, .. } if !(min <= max) => {
                Err(format!("min {min} exceeds max {max}"))
            }
            Self::WaitStatustext { text, .. } if text.is_empty() => {
                Err("text must not be empty".to_owned())
            }
            _ => Ok(()),
        }
    }

    fn to_step(&self, extractor: &Arc<MarkerExtractor>) -> Step {
        match self {
            Self::Hold {
                signal,
                tolerance,
                timeout,
            } => Step::Watch(
                Watch::hold(signal.to_signal(extractor))
                    .tolerance(*tolerance)
                    .timeout(*timeout),
            ),
            Self::Track {
                signal,
                target,
                tolerance,
                timeout,
            } => Step::Watch(
                Watch::track(signal.to_signal(extractor), *target)
                    .tolerance(*tolerance)
                    .timeout(*timeout),
            ),
            Self::ProgressGated {
                signal,
                target,
                tolerance,
                timeout,
                target_progress,
            } => Step::Watch(
                Watch::progress_gated(signal.to_signal(extractor), *target, *target_progress)
                    .tolerance(*tolerance)
                    .timeout(*timeout),
            ),
            Self::WaitRange {
                signal,
                min,
                max,
                timeout,
                minimum_duration,
            } => Step::WaitRange {
                signal: signal.to_signal(extractor),
                min: *min,
                max: *max,
                timeout: *timeout,
                minimum_duration: *minimum_duration,
            },
            Self::WaitHeading {
                heading,
                accuracy,
                timeout,
                minimum_duration,
            } => Step::WaitHeading {
                heading: *heading,
                accuracy: *accuracy,
                timeout: *timeout,
                minimum_duration: *minimum_duration,
            },
            Self::WaitStatustext { text, timeout } => Step::WaitStatusText {
                needle: text.clone(),
                timeout: *timeout,
            },
            Self::WaitWaypoint { waypoint, timeout } => Step::WaitWaypoint {
                waypoint: *waypoint,
                timeout: *timeout,
            },
            Self::Delay { seconds } => Step::Delay { seconds: *seconds },
        }
    }
}

impl ScenarioConfig {
    /// Read and validate a scenario file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parse and validate scenario text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check scenario-level and per-step constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("name must not be empty".to_owned()));
        }
        if self.steps.is_empty() {
            return Err(ConfigError::Invalid(format!("scenario {} has no steps", self.name)));
        }
        if self.extraction.marker.is_empty() || self.extraction.width == 0 {
            return Err(ConfigError::Invalid(
                "extraction marker and width must be non-empty".to_owned(),
            ));
        }
        for (index, step) in self.steps.iter().enumerate() {
            step.check().map_err(|reason| ConfigError::InvalidStep {
                index: index + 1,
                kind: step.kind(),
                reason,
            })?;
        }
        Ok(())
    }

    /// Extractor described by the `[extraction]` table.
    #[must_use]
    pub fn extractor(&self) -> MarkerExtractor {
        MarkerExtractor::new(self.extraction.marker.clone(), self.extraction.width)
    }

    /// Build the runtime steps.
    #[must_use]
    pub fn build_steps(&self) -> Vec<Step> {
        let extractor = Arc::new(self.extractor());
        self.steps.iter().map(|step| step.to_step(&extractor)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MISSION: &str = r#"
name = "terrain_mission"

[[step]]
kind = "wait_range"
signal = "altitude"
min = -36.0
max = -35.0
timeout = 120.0

[[step]]
kind = "hold"
signal = "rangefinder"

[[step]]
kind = "progress_gated"
signal = "true_distance"
target = 15.0
tolerance = 1.5
timeout = 500.0
target_progress = 4
"#;

    #[test]
    fn parses_steps_with_defaults() {
        let config = ScenarioConfig::parse(MISSION).unwrap();
        assert_eq!(config.name, "terrain_mission");
        assert_eq!(config.extraction, ExtractionConfig::default());
        assert_eq!(
            config.steps[1],
            StepConfig::Hold {
                signal: SignalName::Rangefinder,
                tolerance: 0.3,
                timeout: 5.0,
            }
        );
        assert_eq!(
            config.steps[0],
            StepConfig::WaitRange {
                signal: SignalName::Altitude,
                min: -36.0,
                max: -35.0,
                timeout: 120.0,
                minimum_duration: 0.0,
            }
        );
        let steps = config.build_steps();
        assert_eq!(steps.len(), 3);
        match &steps[2] {
            Step::Watch(watch) => {
                assert_eq!(watch.tolerance, 1.5);
                assert_eq!(watch.signal.label(), "true distance");
            }
            other => panic!("unexpected step {other:?}"),
        }
    }

    #[test]
    fn rejects_inverted_band_with_step_index() {
        let text = r#"
name = "bad"
[[step]]
kind = "wait_range"
signal = "altitude"
min = -5.0
max = -6.0
"#;
        match ScenarioConfig::parse(text) {
            Err(ConfigError::InvalidStep { index, kind, .. }) => {
                assert_eq!(index, 1);
                assert_eq!(kind, "wait_range");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_kind() {
        let text = "name = \"x\"\n[[step]]\nkind = \"arm\"\n";
        assert!(matches!(ScenarioConfig::parse(text), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn rejects_empty_scenario() {
        assert!(matches!(
            ScenarioConfig::parse("name = \"idle\"\n"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn custom_marker_flows_into_signal() {
        let text = r#"
name = "custom"
[extraction]
marker = "DIST="
width = 6
[[step]]
kind = "track"
signal = "true_distance"
target = 10.0
"#;
        let config = ScenarioConfig::parse(text).unwrap();
        assert_eq!(config.extractor(), MarkerExtractor::new("DIST=", 6));
    }
}
