//! Utility module for tickplay
//!
//! This module provides common utilities used throughout the engine:
//! - Error handling with custom error types
//! - Configuration management
//! - Small timestamp helpers

pub mod config;
pub mod error;

// Re-export commonly used items
pub use config::{ColorSpace, Config, GeneralConfig, InputConfig, PipelineConfig, RenderPath, VideoConfig};
pub use error::{IntoPlayerError, PlayerError, Result};

/// Load the engine configuration from defaults, files and environment
pub fn load_config() -> Result<Config> {
    Config::load()
}

/// Format a position in seconds for display
///
/// Returns "HH:MM:SS" or "MM:SS" for positions under an hour. Negative
/// positions are shown as zero.
pub fn format_position(seconds: f64) -> String {
    let total_secs = if seconds.is_finite() && seconds > 0.0 { seconds as u64 } else { 0 };
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_position() {
        assert_eq!(format_position(0.0), "00:00");
        assert_eq!(format_position(-3.0), "00:00");
        assert_eq!(format_position(59.9), "00:59");
        assert_eq!(format_position(60.0), "01:00");
        assert_eq!(format_position(3600.0), "01:00:00");
        assert_eq!(format_position(7325.4), "02:02:05");
    }
}
