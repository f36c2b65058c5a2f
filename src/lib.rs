// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Crate root for the divewatch telemetry invariant monitor.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Telemetry invariant monitor for simulated underwater-vehicle acceptance tests.
//!
//! Scenarios command the vehicle elsewhere; this crate watches what comes
//! back. A [`Sampler`] delivers typed telemetry and keeps a simulated clock,
//! the [`InvariantMonitor`] decides whether a value held, tracked a target or
//! kept within tolerance until a mission made progress, and the
//! [`wait`] helpers cover the "reach value V" checks in between.
//!
//! | Module | What it does |
//! |--------|--------------|
//! | [`clock`] | Simulated time driven by telemetry arrival |
//! | [`telemetry`] | Typed messages and samples |
//! | [`sampler`] | Blocking sampler over scripted, replayed or channel sources |
//! | [`extract`] | Signal selection and marker-embedded metrics |
//! | [`progress`] | Mission waypoint counter |
//! | [`monitor`] | Hold, track and progress-gated sessions |
//! | [`wait`] | Band, heading, status text, waypoint and delay waits |
//! | [`config`] | TOML scenario files |
//! | [`scenario`] | Ordered step runner |

pub mod clock;
pub mod config;
pub mod extract;
pub mod monitor;
pub mod progress;
pub mod sampler;
pub mod scenario;
pub mod telemetry;
pub mod wait;

pub use clock::{SimClock, SimTime};
pub use config::{ConfigError, ScenarioConfig};
pub use extract::{MarkerExtractor, MetricExtractor, Signal};
pub use monitor::{InvariantMonitor, MonitorError, MonitorReport, Policy, SessionExit, Watch};
pub use progress::{MissionProgress, ProgressCounter};
pub use sampler::{
    telemetry_channel, ChannelSource, JsonLinesSource, MessageSource, Sampler, SamplerError,
    ScriptedSource, TelemetryFeed, TelemetrySampler,
};
pub use scenario::{ScenarioError, ScenarioReport, ScenarioRunner, Step};
pub use telemetry::{MessageKind, Sample, Telemetry};
pub use wait::WaitError;
