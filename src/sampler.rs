// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Blocking telemetry sampler over pluggable message sources with a simulated clock.
// Author: Lukas Bower

//! Telemetry sampler.
//!
//! A [`MessageSource`] is the transport seam: it yields decoded samples in
//! delivery order and reports termination. [`Sampler`] wraps a source with
//! the simulated clock and hands the monitor "the next sample of type T".
//! Three sources ship with the crate:
//!
//! - [`ScriptedSource`] for synthetic, deterministic sequences;
//! - [`JsonLinesSource`] for replaying a recorded telemetry log;
//! - [`ChannelSource`] for samples pushed from a transport thread.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};

use log::{trace, warn};
use thiserror::Error;

use crate::clock::{SimClock, SimTime};
use crate::progress::MissionProgress;
use crate::telemetry::{MessageKind, Sample, Telemetry};

/// Errors surfaced while receiving telemetry.
#[derive(Debug, Error)]
pub enum SamplerError {
    /// The telemetry source terminated; fatal to the current session.
    #[error("telemetry stream closed")]
    StreamClosed,
    /// Reading the underlying log failed.
    #[error("telemetry read failed: {0}")]
    Io(#[from] io::Error),
    /// A log line could not be decoded into a sample.
    #[error("telemetry line {line} malformed: {source}")]
    Decode {
        /// One-based line number within the log.
        line: usize,
        /// Decoder error.
        #[source]
        source: serde_json::Error,
    },
}

/// Transport delivering decoded telemetry in order.
pub trait MessageSource {
    /// Block until the next sample arrives. `Ok(None)` signals the source terminated.
    fn recv(&mut self) -> Result<Option<Sample>, SamplerError>;
}

/// Blocking access to typed telemetry under a simulated clock.
pub trait TelemetrySampler {
    /// Block until the next sample of any type arrives, advancing the clock.
    fn next_any(&mut self) -> Result<Sample, SamplerError>;

    /// Last observed simulated time, without blocking.
    fn now_cached(&self) -> SimTime;

    /// Time a new session starts from.
    ///
    /// Returns the cached time once any message has arrived. Before that it
    /// blocks for the stream's first message, takes the clock from its stamp
    /// and keeps the message for the next receive.
    fn anchor(&mut self) -> Result<SimTime, SamplerError>;

    /// Block until a sample of `kind` arrives.
    ///
    /// Samples of other types delivered in between are consumed and still
    /// advance the clock.
    fn next(&mut self, kind: MessageKind) -> Result<Sample, SamplerError> {
        loop {
            let sample = self.next_any()?;
            if sample.kind() == kind {
                return Ok(sample);
            }
        }
    }

    /// Refresh the clock from the next delivered message and return it.
    fn now(&mut self) -> Result<SimTime, SamplerError> {
        self.next_any()?;
        Ok(self.now_cached())
    }
}

/// Sampler over a [`MessageSource`].
#[derive(Debug)]
pub struct Sampler<S> {
    source: S,
    clock: SimClock,
    pending: Option<Sample>,
    progress: Option<MissionProgress>,
    delivered: u64,
}

impl<S: MessageSource> Sampler<S> {
    /// Wrap `source` with a clock positioned at simulation start.
    pub fn new(source: S) -> Self {
        Self {
            source,
            clock: SimClock::default(),
            pending: None,
            progress: None,
            delivered: 0,
        }
    }

    /// Publish `MISSION_CURRENT` sequence numbers into `progress` as they pass.
    #[must_use]
    pub fn with_progress(mut self, progress: MissionProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Position the clock at `start` before any sample arrives.
    #[must_use]
    pub fn starting_at(mut self, start: SimTime) -> Self {
        self.clock = SimClock::starting_at(start);
        self
    }

    /// Number of samples delivered so far.
    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Borrow the underlying source.
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    fn receive(&mut self) -> Result<Sample, SamplerError> {
        let sample = self.source.recv()?.ok_or(SamplerError::StreamClosed)?;
        if let Some(latest) = self.clock.latest() {
            if sample.time < latest {
                warn!(
                    "{} stamped {} behind clock {}; clock held",
                    sample.kind(),
                    sample.time,
                    latest
                );
            }
        }
        self.clock.observe(sample.time);
        Ok(sample)
    }
}

impl<S: MessageSource> TelemetrySampler for Sampler<S> {
    fn next_any(&mut self) -> Result<Sample, SamplerError> {
        let sample = match self.pending.take() {
            Some(sample) => sample,
            None => self.receive()?,
        };
        self.delivered += 1;
        if let (Some(progress), Telemetry::MissionCurrent { seq }) = (&self.progress, &sample.message) {
            progress.publish(*seq);
        }
        trace!("sample {} {} @ {}", self.delivered, sample.kind(), self.clock.now());
        Ok(sample)
    }

    fn now_cached(&self) -> SimTime {
        self.clock.now()
    }

    fn anchor(&mut self) -> Result<SimTime, SamplerError> {
        if self.pending.is_none() && self.clock.latest().is_none() {
            let first = self.receive()?;
            self.pending = Some(first);
        }
        Ok(self.clock.now())
    }
}

/// In-memory sequence of samples, delivered front to back.
#[derive(Clone, Debug, Default)]
pub struct ScriptedSource {
    pending: VecDeque<Sample>,
}

impl ScriptedSource {
    /// Build a source delivering `samples` in order.
    pub fn new(samples: impl IntoIterator<Item = Sample>) -> Self {
        Self {
            pending: samples.into_iter().collect(),
        }
    }

    /// Append a sample to the end of the script.
    pub fn push(&mut self, sample: Sample) {
        self.pending.push_back(sample);
    }

    /// Samples not yet delivered.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl FromIterator<Sample> for ScriptedSource {
    fn from_iter<I: IntoIterator<Item = Sample>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl MessageSource for ScriptedSource {
    fn recv(&mut self) -> Result<Option<Sample>, SamplerError> {
        Ok(self.pending.pop_front())
    }
}

/// Replays a JSON-lines telemetry log. Blank lines and `#` comments are skipped.
#[derive(Debug)]
pub struct JsonLinesSource<R> {
    reader: R,
    line: usize,
    buf: String,
}

impl<R: BufRead> JsonLinesSource<R> {
    /// Replay lines read from `reader`.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            buf: String::new(),
        }
    }
}

impl JsonLinesSource<BufReader<File>> {
    /// Open a log file for replay.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SamplerError> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> MessageSource for JsonLinesSource<R> {
    fn recv(&mut self) -> Result<Option<Sample>, SamplerError> {
        loop {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                return Ok(None);
            }
            self.line += 1;
            let text = self.buf.trim();
            if text.is_empty() || text.starts_with('#') {
                continue;
            }
            return serde_json::from_str(text)
                .map(Some)
                .map_err(|source| SamplerError::Decode {
                    line: self.line,
                    source,
                });
        }
    }
}

/// Create a connected feed/source pair for samples produced on another thread.
#[must_use]
pub fn telemetry_channel() -> (TelemetryFeed, ChannelSource) {
    let (tx, rx) = mpsc::channel();
    (TelemetryFeed { tx }, ChannelSource { rx })
}

/// Producer half of [`telemetry_channel`]. Dropping every feed closes the stream.
#[derive(Clone, Debug)]
pub struct TelemetryFeed {
    tx: Sender<Sample>,
}

impl TelemetryFeed {
    /// Deliver a sample to the consuming sampler.
    pub fn send(&self, sample: Sample) -> Result<(), SamplerError> {
        self.tx.send(sample).map_err(|_| SamplerError::StreamClosed)
    }
}

/// Consumer half of [`telemetry_channel`].
#[derive(Debug)]
pub struct ChannelSource {
    rx: Receiver<Sample>,
}

impl MessageSource for ChannelSource {
    fn recv(&mut self) -> Result<Option<Sample>, SamplerError> {
        Ok(self.rx.recv().ok())
    }
}
