//! Presentation clock reconciliation
//!
//! The host drives presentation at a fixed tick rate while the media runs on
//! its own timestamps. Audio consumption is the reference: every tick the
//! clock compares how much audio the host has been handed against the
//! timestamp of the audio that was decoded last, and the difference becomes
//! the bias added to the tick clock when choosing video frames.

use log::{debug, warn};

use crate::audio::BYTES_PER_FRAME;

/// Result of recomputing the bias for a tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BiasUpdate {
    /// Bias moved by less than the discontinuity threshold
    Steady,

    /// Bias regressed by more than the threshold; frame slot timestamps
    /// must be reset before the next mix factor is computed
    Discontinuity {
        previous: f64,
        current: f64,
    },
}

/// Tick counter, audio counter and bias for one session
#[derive(Debug, Clone)]
pub struct PresentationClock {
    /// Presentation ticks per second
    fps: f64,

    /// Output sample rate, 0 when the media has no audio
    sample_rate: u32,

    /// Ticks presented so far
    frame_cnt: u64,

    /// Audio frames handed to the host so far
    audio_frames: u64,

    /// Seconds added to the tick clock to land on media time
    pts_bias: f64,

    /// Backward bias jump treated as a discontinuity
    discontinuity_threshold: f64,
}

impl PresentationClock {
    pub fn new(fps: f64, sample_rate: u32, discontinuity_threshold: f64) -> Self {
        Self {
            fps,
            sample_rate,
            frame_cnt: 0,
            audio_frames: 0,
            pts_bias: 0.0,
            discontinuity_threshold,
        }
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frame_cnt(&self) -> u64 {
        self.frame_cnt
    }

    pub fn audio_frames(&self) -> u64 {
        self.audio_frames
    }

    pub fn pts_bias(&self) -> f64 {
        self.pts_bias
    }

    /// Seconds of tick time elapsed, without bias
    pub fn position(&self) -> f64 {
        self.frame_cnt as f64 / self.fps
    }

    /// Audio frames that should have been delivered by the start of this tick
    pub fn expected_audio_frames(&self) -> u64 {
        frames_at(self.frame_cnt, self.sample_rate, self.fps)
    }

    /// Frames to hand to the host this tick
    pub fn frames_to_read(&self) -> u64 {
        self.expected_audio_frames().saturating_sub(self.audio_frames)
    }

    /// Recompute the bias from the last decoded audio timestamp
    ///
    /// `queued_bytes` is what still sits in the audio queue; the audio the
    /// host is about to read therefore starts that many seconds before
    /// `last_audio_time`.
    pub fn update_bias(&mut self, last_audio_time: f64, queued_bytes: usize) -> BiasUpdate {
        if self.sample_rate == 0 {
            return BiasUpdate::Steady;
        }

        let bytes_per_second = self.sample_rate as f64 * BYTES_PER_FRAME as f64;
        let reading_pts = last_audio_time - queued_bytes as f64 / bytes_per_second;
        let expected_pts = self.audio_frames as f64 / self.sample_rate as f64;

        let previous = self.pts_bias;
        self.pts_bias = reading_pts - expected_pts;

        if self.pts_bias < previous - self.discontinuity_threshold {
            warn!(
                "Presentation clock discontinuity: bias {:.3}s -> {:.3}s",
                previous, self.pts_bias
            );
            BiasUpdate::Discontinuity { previous, current: self.pts_bias }
        } else {
            BiasUpdate::Steady
        }
    }

    /// Record frames handed to the host
    pub fn consume_audio(&mut self, frames: u64) {
        self.audio_frames += frames;
    }

    /// Media time the video should show this tick
    pub fn min_pts(&self) -> f64 {
        self.position() + self.pts_bias
    }

    /// Move to the next tick
    pub fn advance(&mut self) {
        self.frame_cnt += 1;
    }

    /// Jump the clock by `offset` ticks, clamping at the start
    ///
    /// Returns the seek target in seconds. The audio counter is realigned
    /// to the new tick so no catch-up burst is requested afterwards, and the
    /// bias restarts at zero.
    pub fn seek_by(&mut self, offset: i64) -> f64 {
        let target = (self.frame_cnt as i64).saturating_add(offset).max(0) as u64;
        self.frame_cnt = target;
        self.audio_frames = self.expected_audio_frames();
        self.pts_bias = 0.0;

        debug!(
            "Clock moved to tick {} ({:.3}s, {} audio frames)",
            self.frame_cnt,
            self.position(),
            self.audio_frames
        );
        self.position()
    }
}

/// Audio frames corresponding to `ticks` at `fps`
fn frames_at(ticks: u64, sample_rate: u32, fps: f64) -> u64 {
    if fps <= 0.0 {
        return 0;
    }
    (ticks as f64 * sample_rate as f64 / fps).floor() as u64
}

/// Cross-fade weight of `next` against `previous` at `min_pts`
///
/// Clamped to `[0, 1]`. A degenerate bracket (`next` not after `previous`)
/// presents `next` outright.
pub fn mix_factor(previous_pts: f64, next_pts: f64, min_pts: f64) -> f64 {
    let span = next_pts - previous_pts;
    if !(span > 0.0) {
        return 1.0;
    }
    ((min_pts - previous_pts) / span).clamp(0.0, 1.0)
}
