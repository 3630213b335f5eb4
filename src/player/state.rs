//! Session state and statistics tracking
//!
//! The consumer records what happened on every tick here; the session turns
//! it into a [`PlaybackStats`] snapshot on request.

use std::time::{Duration, Instant};

use log::{debug, info};
use serde::Serialize;

/// Where the session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlaybackState {
    /// Ticks are presenting media
    Playing,

    /// A seek is in flight
    Seeking,

    /// Decoding stopped and buffers ran dry; host shutdown was requested
    Ended,
}

/// Counters accumulated over the life of a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PlaybackStats {
    /// Host ticks run
    pub ticks: u64,

    /// Audio frames accepted by the host
    pub audio_frames_delivered: u64,

    /// Video frames read from the queue into a slot
    pub video_frames_uploaded: u64,

    /// Queue clears performed by the decode thread to unblock the consumer
    pub congestion_drops: u64,

    /// Ticks where fewer audio frames were buffered than requested
    pub underruns: u64,

    /// Presentation clock discontinuities
    pub discontinuities: u64,

    /// Completed seeks
    pub seeks: u64,

    /// Seconds of wall time spent inside `run`
    pub busy_secs: f64,
}

/// Mutable statistics owned by the consumer
#[derive(Debug)]
pub(crate) struct StatsTracker {
    state: PlaybackState,
    stats: PlaybackStats,
    busy: Duration,
}

impl StatsTracker {
    pub(crate) fn new() -> Self {
        Self {
            state: PlaybackState::Playing,
            stats: PlaybackStats::default(),
            busy: Duration::ZERO,
        }
    }

    pub(crate) fn state(&self) -> PlaybackState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: PlaybackState) {
        if self.state != state {
            debug!("Session {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    /// Record a finished tick that started at `started`
    pub(crate) fn tick(&mut self, started: Instant) {
        self.stats.ticks += 1;
        self.busy += started.elapsed();
    }

    pub(crate) fn audio_delivered(&mut self, frames: u64) {
        self.stats.audio_frames_delivered += frames;
    }

    pub(crate) fn video_uploaded(&mut self) {
        self.stats.video_frames_uploaded += 1;
    }

    pub(crate) fn underrun(&mut self) {
        self.stats.underruns += 1;
    }

    pub(crate) fn discontinuity(&mut self) {
        self.stats.discontinuities += 1;
    }

    pub(crate) fn seek_completed(&mut self) {
        self.stats.seeks += 1;
    }

    pub(crate) fn ended(&mut self) {
        if self.state != PlaybackState::Ended {
            info!(
                "Playback ended after {} ticks ({} audio frames, {} video frames)",
                self.stats.ticks, self.stats.audio_frames_delivered, self.stats.video_frames_uploaded
            );
        }
        self.set_state(PlaybackState::Ended);
    }

    /// Snapshot, with the decode thread's drop counter folded in
    pub(crate) fn snapshot(&self, congestion_drops: u64) -> PlaybackStats {
        PlaybackStats {
            congestion_drops,
            busy_secs: self.busy.as_secs_f64(),
            ..self.stats
        }
    }
}
