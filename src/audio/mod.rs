//! Audio side of the pipeline
//!
//! Audio travels as interleaved stereo signed 16-bit frames at the session
//! sample rate. This module holds the sample layout constants, the growable
//! resample scratch buffer and the presentation clock driven by audio
//! consumption.

mod sync;

pub use sync::{mix_factor, BiasUpdate, PresentationClock};

/// Channels in every queued audio frame
pub const CHANNELS: usize = 2;

/// Bytes per interleaved stereo S16 frame
pub const BYTES_PER_FRAME: usize = CHANNELS * std::mem::size_of::<i16>();

/// Sample rate reported to the host when the media has no audio
pub const FALLBACK_SAMPLE_RATE: u32 = 32_000;

/// Convert a frame count to queue bytes
pub const fn frames_to_bytes(frames: usize) -> usize {
    frames * BYTES_PER_FRAME
}

/// Convert queue bytes to whole frames
pub const fn bytes_to_frames(bytes: usize) -> usize {
    bytes / BYTES_PER_FRAME
}

/// Resample target reused across decoded audio frames
///
/// Grows by doubling when a frame needs more room than it has, and is
/// never shrunk while the session lives.
#[derive(Debug, Default)]
pub struct SampleScratch {
    samples: Vec<i16>,
}

impl SampleScratch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capacity in stereo frames
    pub fn capacity_frames(&self) -> usize {
        self.samples.len() / CHANNELS
    }

    /// Ensure room for `frames` stereo frames and return the writable region
    pub fn reserve_frames(&mut self, frames: usize) -> &mut [i16] {
        let needed = frames * CHANNELS;
        if needed > self.samples.len() {
            let mut len = self.samples.len().max(CHANNELS);
            while len < needed {
                len *= 2;
            }
            log::debug!("Growing resample buffer to {} frames", len / CHANNELS);
            self.samples.resize(len, 0);
        }
        &mut self.samples[..needed]
    }

    /// The first `frames` stereo frames
    pub fn frames(&self, frames: usize) -> &[i16] {
        let end = (frames * CHANNELS).min(self.samples.len());
        &self.samples[..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_byte_conversion() {
        assert_eq!(BYTES_PER_FRAME, 4);
        assert_eq!(frames_to_bytes(48_000), 192_000);
        assert_eq!(bytes_to_frames(7), 1);
    }

    #[test]
    fn test_scratch_grows_by_doubling() {
        let mut scratch = SampleScratch::new();
        assert_eq!(scratch.reserve_frames(3).len(), 6);
        assert_eq!(scratch.capacity_frames(), 4);

        scratch.reserve_frames(5);
        assert_eq!(scratch.capacity_frames(), 8);
    }

    #[test]
    fn test_scratch_never_shrinks() {
        let mut scratch = SampleScratch::new();
        scratch.reserve_frames(1024);
        let capacity = scratch.capacity_frames();

        let region = scratch.reserve_frames(10);
        assert_eq!(region.len(), 20);
        region[0] = 7;
        assert_eq!(scratch.capacity_frames(), capacity);
        assert_eq!(scratch.frames(1), &[7, 0]);
    }
}
