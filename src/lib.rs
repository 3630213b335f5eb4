//! tickplay: a tick-driven audio/video playback engine
//!
//! Media is decoded on a background thread at its own pace and presented
//! to an embedding host at the host's fixed frame rate. The host implements
//! [`Host`], builds [`MediaSources`] for a file and calls
//! [`PlayerSession::run`] once per output frame.

pub mod audio;
pub mod decoder;
pub mod host;
pub mod pipeline;
pub mod player;
pub mod renderer;
pub mod utils;

pub use decoder::MediaSources;
pub use host::{Button, Host};
pub use player::{AvInfo, PlaybackState, PlaybackStats, PlayerSession, SessionBuilder, SessionEvent};
pub use renderer::FrameRef;
pub use utils::{Config, PlayerError, Result};
