//! Decoder module for tickplay
//!
//! Container demuxing, codec decoding, pixel conversion and resampling are
//! external collaborators. This module defines the narrow contracts the
//! decode thread drives them through, the type-erased stages built from
//! them, and (behind the `ffmpeg` feature) an FFmpeg implementation.

#[cfg(feature = "ffmpeg")]
mod ffmpeg_decoder;
mod sources;
mod stage;
mod stream_info;

#[cfg(feature = "ffmpeg")]
pub use ffmpeg_decoder::{open_media, FfmpegAudioDecoder, FfmpegDemuxer, FfmpegSubtitleDecoder, FfmpegVideoDecoder, SwrResampler, SwsConverter};
pub use sources::{AudioSource, MediaSources, SubtitleSource, VideoGeometry, VideoSource};
pub use stage::{AudioStage, VideoStage};
pub use stream_info::{StreamSelection, TrackCursor};

use crate::utils::config::ColorSpace;
use crate::utils::error::Result;

/// Kind of elementary stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
    Subtitle,
    /// Data, attachments and anything else the pipeline ignores
    Other,
}

/// Fraction converting raw container timestamps to seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBase {
    pub num: i32,
    pub den: i32,
}

impl TimeBase {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// Seconds represented by `ts` ticks of this time base
    pub fn to_seconds(&self, ts: i64) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        ts as f64 * self.num as f64 / self.den as f64
    }

    /// Ticks of this time base nearest to `seconds`
    pub fn from_seconds(&self, seconds: f64) -> i64 {
        if self.num == 0 {
            return 0;
        }
        (seconds * self.den as f64 / self.num as f64).round() as i64
    }
}

/// Stream description reported by the demuxer when the media is opened
#[derive(Debug, Clone)]
pub struct StreamDescriptor {
    /// Container stream index
    pub index: usize,

    /// Stream kind
    pub kind: MediaKind,

    /// Codec name
    pub codec: String,

    /// Time base for timestamp conversion
    pub time_base: TimeBase,

    /// Language tag
    pub language: Option<String>,
}

/// Compressed packet read from the container
#[derive(Debug, Clone, Default)]
pub struct Packet {
    /// Container stream index this packet belongs to
    pub stream_index: usize,

    /// Compressed payload
    pub data: Vec<u8>,

    /// Presentation timestamp in stream time base, if known
    pub pts: Option<i64>,

    /// Decode timestamp in stream time base, if known
    pub dts: Option<i64>,

    /// Whether this packet starts a keyframe
    pub keyframe: bool,
}

/// Direction hint for demuxer seeks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekDirection {
    Forward,
    Backward,
}

/// Container reader
pub trait Demuxer: Send {
    /// Streams found when the container was opened
    fn streams(&self) -> &[StreamDescriptor];

    /// Read the next packet; `None` means there is no more data
    fn read_packet(&mut self) -> Option<Packet>;

    /// Reposition to `seconds`
    ///
    /// `stream_hint` names a stream whose time base should be used for the
    /// target, `None` lets the demuxer pick.
    fn seek(&mut self, stream_hint: Option<usize>, seconds: f64, direction: SeekDirection) -> Result<()>;
}

/// A decoded frame carrying the decoder's best-effort timestamp
pub trait DecodedFrame {
    /// Timestamp in stream time base, `None` if the decoder could not guess one
    fn best_effort_timestamp(&self) -> Option<i64>;
}

/// Video codec instance
pub trait VideoDecoder: Send {
    type Frame: DecodedFrame + Send;

    /// Decode one packet into zero or more frames
    fn decode(&mut self, packet: &Packet) -> Result<Vec<Self::Frame>>;

    /// Drop internal reference frames (used on seek)
    fn flush(&mut self);
}

/// Audio codec instance
pub trait AudioDecoder: Send {
    type Frame: DecodedFrame + Send;

    /// Decode one packet into zero or more frames
    fn decode(&mut self, packet: &Packet) -> Result<Vec<Self::Frame>>;

    /// Drop internal state (used on seek and track switch)
    fn flush(&mut self);
}

/// Converts decoded video into width*height XRGB8888 pixels
pub trait PixelConverter<F>: Send {
    /// Write the converted frame into `dst`, which holds exactly width*height pixels
    fn convert(&mut self, frame: &F, dst: &mut [u32]) -> Result<()>;

    /// Apply a colorspace override to subsequent conversions
    fn set_color_space(&mut self, _color_space: ColorSpace) {}
}

/// Converts decoded audio into interleaved stereo S16 at the session rate
pub trait Resampler<F>: Send {
    /// Upper bound on the stereo frames `convert` will produce for `frame`
    fn output_frames(&self, frame: &F) -> usize;

    /// Write interleaved samples into `dst`, returning the stereo frames written
    fn convert(&mut self, frame: &F, dst: &mut [i16]) -> Result<usize>;
}

/// Timed subtitle text produced by a subtitle decoder
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleEvent {
    /// Dialogue or markup text
    pub text: String,

    /// Start time in milliseconds
    pub start_ms: i64,

    /// Display duration in milliseconds
    pub duration_ms: i64,
}

/// Subtitle codec instance
pub trait SubtitleDecoder: Send {
    /// Decode one packet into zero or more timed events
    fn decode(&mut self, packet: &Packet) -> Result<Vec<SubtitleEvent>>;

    /// Drop buffered state (used on seek)
    fn flush(&mut self);
}
