// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Typed telemetry messages and time-stamped samples consumed by the monitor.
// Author: Lukas Bower

//! Telemetry messages observed from the simulated vehicle.
//!
//! Only the message types the acceptance scenarios watch are modelled. The
//! serialised form mirrors the JSON-lines logs recorded from the simulator:
//! `{"time": 12.5, "type": "VFR_HUD", "alt": -5.2, "heading": 180, "groundspeed": 0.1}`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::clock::SimTime;

/// Message channels multiplexed over one telemetry connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// HUD summary carrying altitude, heading and ground speed.
    VfrHud,
    /// Downward rangefinder reading.
    Rangefinder,
    /// Free-text status message.
    StatusText,
    /// Fused global position.
    GlobalPositionInt,
    /// Active mission item index.
    MissionCurrent,
    /// Time synchronisation heartbeat.
    SystemTime,
}

impl MessageKind {
    /// Return the wire name used in telemetry logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::VfrHud => "VFR_HUD",
            Self::Rangefinder => "RANGEFINDER",
            Self::StatusText => "STATUSTEXT",
            Self::GlobalPositionInt => "GLOBAL_POSITION_INT",
            Self::MissionCurrent => "MISSION_CURRENT",
            Self::SystemTime => "SYSTEM_TIME",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message payloads keyed by their wire name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Telemetry {
    /// `VFR_HUD`: altitude in metres (negative below the surface), heading in degrees.
    #[serde(rename = "VFR_HUD")]
    VfrHud {
        /// Altitude in metres.
        alt: f64,
        /// Heading in degrees, 0..360.
        #[serde(default)]
        heading: f64,
        /// Ground speed in metres per second.
        #[serde(default)]
        groundspeed: f64,
    },
    /// `RANGEFINDER`: measured distance to the sea floor in metres.
    #[serde(rename = "RANGEFINDER")]
    Rangefinder {
        /// Distance in metres.
        distance: f64,
    },
    /// `STATUSTEXT`: diagnostic text emitted by the firmware or its scripts.
    #[serde(rename = "STATUSTEXT")]
    StatusText {
        /// Message body.
        text: String,
    },
    /// `GLOBAL_POSITION_INT`: integer-scaled position.
    #[serde(rename = "GLOBAL_POSITION_INT")]
    GlobalPositionInt {
        /// Latitude in degrees * 1e7.
        lat: i64,
        /// Longitude in degrees * 1e7.
        lon: i64,
        /// Altitude above home in millimetres.
        relative_alt: i64,
        /// Heading in centidegrees.
        #[serde(default)]
        hdg: u32,
    },
    /// `MISSION_CURRENT`: index of the active mission item.
    #[serde(rename = "MISSION_CURRENT")]
    MissionCurrent {
        /// Current waypoint sequence number.
        seq: u32,
    },
    /// `SYSTEM_TIME`: carries only the simulated time stamp.
    #[serde(rename = "SYSTEM_TIME")]
    SystemTime,
}

impl Telemetry {
    /// Channel this payload travels on.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::VfrHud { .. } => MessageKind::VfrHud,
            Self::Rangefinder { .. } => MessageKind::Rangefinder,
            Self::StatusText { .. } => MessageKind::StatusText,
            Self::GlobalPositionInt { .. } => MessageKind::GlobalPositionInt,
            Self::MissionCurrent { .. } => MessageKind::MissionCurrent,
            Self::SystemTime => MessageKind::SystemTime,
        }
    }
}

/// One time-stamped telemetry reading. Immutable once delivered.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Simulated time at which the message was produced.
    pub time: SimTime,
    /// Decoded payload.
    #[serde(flatten)]
    pub message: Telemetry,
}

impl Sample {
    /// Pair a payload with its simulated time stamp.
    #[must_use]
    pub fn new(secs: f64, message: Telemetry) -> Self {
        Self {
            time: SimTime::from_secs(secs),
            message,
        }
    }

    /// `VFR_HUD` sample carrying only an altitude.
    #[must_use]
    pub fn altitude(secs: f64, alt: f64) -> Self {
        Self::new(
            secs,
            Telemetry::VfrHud {
                alt,
                heading: 0.0,
                groundspeed: 0.0,
            },
        )
    }

    /// `RANGEFINDER` sample.
    #[must_use]
    pub fn rangefinder(secs: f64, distance: f64) -> Self {
        Self::new(secs, Telemetry::Rangefinder { distance })
    }

    /// `STATUSTEXT` sample.
    #[must_use]
    pub fn status_text(secs: f64, text: impl Into<String>) -> Self {
        Self::new(secs, Telemetry::StatusText { text: text.into() })
    }

    /// `MISSION_CURRENT` sample.
    #[must_use]
    pub fn mission_current(secs: f64, seq: u32) -> Self {
        Self::new(secs, Telemetry::MissionCurrent { seq })
    }

    /// Channel of this sample.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        self.message.kind()
    }
}
