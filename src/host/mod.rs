//! Host application interface
//!
//! The host owns the render loop, the audio sink and input. It calls
//! [`PlayerSession::run`](crate::PlayerSession::run) once per output frame
//! and receives video, audio and shutdown requests through this trait.

use crate::renderer::FrameRef;

/// Buttons the session reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    /// Seek back by the short step
    Left,

    /// Seek forward by the short step
    Right,

    /// Seek forward by the long step
    Up,

    /// Seek back by the long step
    Down,

    /// Cycle the audio track
    L,

    /// Cycle the subtitle track
    R,
}

impl Button {
    pub const COUNT: usize = 6;

    pub const ALL: [Button; Button::COUNT] = [Button::Left, Button::Right, Button::Up, Button::Down, Button::L, Button::R];
}

/// A host-visible option and its allowed values, the first being the default
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreOption {
    pub key: &'static str,
    pub description: &'static str,
    pub values: &'static [&'static str],
}

/// Toggle for cross-fading between decoded frames
pub const OPTION_TEMPORAL_INTERP: &str = "tickplay_temporal_interp";

/// Colorspace override for pixel conversion
pub const OPTION_COLOR_SPACE: &str = "tickplay_color_space";

/// Options published to the host
pub static CORE_OPTIONS: &[CoreOption] = &[
    CoreOption {
        key: OPTION_TEMPORAL_INTERP,
        description: "Temporal Interpolation",
        values: &["enabled", "disabled"],
    },
    CoreOption {
        key: OPTION_COLOR_SPACE,
        description: "Colorspace",
        values: &["auto", "BT.709", "BT.601", "FCC", "SMPTE240M"],
    },
];

/// Callbacks into the embedding application
pub trait Host {
    /// Present one frame; called exactly once per tick
    fn video_refresh(&mut self, frame: FrameRef<'_>, width: u32, height: u32, stride: usize);

    /// Queue interleaved stereo samples, returning how many frames were accepted
    fn audio_batch(&mut self, samples: &[i16]) -> usize;

    /// Latch input state for this tick
    fn input_poll(&mut self);

    /// Whether `button` is held
    fn input_state(&mut self, button: Button) -> bool;

    /// Whether any option changed since the last call
    fn variables_updated(&mut self) -> bool;

    /// Current value of option `key`
    fn variable(&mut self, key: &str) -> Option<String>;

    /// Show a short on-screen message for `frames` ticks
    fn message(&mut self, _text: &str, _frames: u32) {}

    /// Ask the host to stop calling `run`
    fn request_shutdown(&mut self);
}
