//! Error types for tickplay
//!
//! Library code returns [`PlayerError`] through the [`Result`] alias; the
//! headless host binary wraps everything in `anyhow`.

use thiserror::Error;

/// Main error type for tickplay
#[derive(Error, Debug)]
pub enum PlayerError {
    /// Container / demuxer errors
    #[error("Demuxer error: {0}")]
    Demuxer(String),

    /// Decoder errors
    #[error("Decoder error: {0}")]
    Decoder(String),

    /// Renderer errors
    #[error("Renderer error: {0}")]
    Renderer(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File error: {0}")]
    FileIO(#[from] std::io::Error),

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Generic error for unexpected situations
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(feature = "ffmpeg")]
impl From<ffmpeg_next::Error> for PlayerError {
    fn from(err: ffmpeg_next::Error) -> Self {
        PlayerError::Decoder(format!("FFmpeg error: {}", err))
    }
}

impl PlayerError {
    /// Create a decoder error from string
    pub fn decoder_error<S: Into<String>>(msg: S) -> Self {
        PlayerError::Decoder(msg.into())
    }

    /// Create a demuxer error from string
    pub fn demuxer_error<S: Into<String>>(msg: S) -> Self {
        PlayerError::Demuxer(msg.into())
    }
}

/// Convenience type alias for Results in tickplay
pub type Result<T> = std::result::Result<T, PlayerError>;

/// Extension trait for converting other errors to PlayerError
pub trait IntoPlayerError<T> {
    /// Convert this error into a PlayerError with the given context
    fn demuxer_err(self, context: &str) -> Result<T>;
    fn decoder_err(self, context: &str) -> Result<T>;
    fn config_err(self, context: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> IntoPlayerError<T> for std::result::Result<T, E> {
    fn demuxer_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlayerError::Demuxer(format!("{}: {}", context, e)))
    }

    fn decoder_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlayerError::Decoder(format!("{}: {}", context, e)))
    }

    fn config_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlayerError::Config(format!("{}: {}", context, e)))
    }
}

/// Helper macro for creating internal errors with file and line information
#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::utils::error::PlayerError::Internal(
            format!("{} at {}:{}", $msg, file!(), line!())
        )
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::utils::error::PlayerError::Internal(
            format!("{} at {}:{}", format!($fmt, $($arg)*), file!(), line!())
        )
    };
}
