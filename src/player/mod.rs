//! Playback session for tickplay
//!
//! A [`PlayerSession`] owns one opened media: the decode thread, the
//! consumer side of the pipeline, input handling and stream selection. The
//! host calls [`PlayerSession::run`] once per output frame.

mod controller;
mod session;
mod state;

pub use controller::{InputAction, InputController};
pub use session::{AvInfo, PlayerSession, SessionBuilder};
pub use state::{PlaybackState, PlaybackStats};

pub(crate) use state::StatsTracker;

use serde::Serialize;

use crate::pipeline::QueueKind;

/// Notable things that happened during playback
///
/// Delivered on the channel returned by [`PlayerSession::events`]. The
/// channel is bounded; events are dropped when nobody drains it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SessionEvent {
    /// A seek finished and playback resumes at `position` seconds
    SeekCompleted { position: f64 },

    /// The active audio track changed
    AudioTrackChanged { track: usize },

    /// The active subtitle track changed
    SubtitleTrackChanged { track: usize },

    /// The presentation bias jumped backwards
    Discontinuity { previous_bias: f64, current_bias: f64 },

    /// Fewer audio frames were buffered than the tick needed
    Underrun { requested: u64, available: u64 },

    /// The decode thread cleared a queue to unblock presentation
    CongestionDrop { queue: QueueKind, bytes: usize },

    /// The demuxer ran out of packets
    EndOfStream,
}
