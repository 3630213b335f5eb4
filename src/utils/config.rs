//! Configuration management for tickplay
//!
//! This module handles loading and validating the engine configuration
//! from TOML files and environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::utils::error::{IntoPlayerError, PlayerError, Result};

/// Main engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Decode/present pipeline sizing and tuning
    pub pipeline: PipelineConfig,

    /// Video output configuration
    pub video: VideoConfig,

    /// Seek input configuration
    pub input: InputConfig,

    /// General settings
    pub general: GeneralConfig,
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Presentation rate of the host, one tick per output frame
    pub interpolate_fps: f64,

    /// Audio queue size in seconds of stereo S16 audio
    pub audio_buffer_seconds: f64,

    /// Video queue size in frames
    pub video_buffer_frames: usize,

    /// Decode attempts per packet before it is dropped
    pub max_decode_attempts: u32,

    /// Backward bias jump (seconds) treated as a timestamp discontinuity
    pub discontinuity_threshold: f64,
}

/// Video configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Cross-fade between bracketing frames
    pub temporal_interpolation: bool,

    /// Colorspace override for pixel conversion
    pub color_space: ColorSpace,

    /// Presentation path for decoded frames
    pub render_path: RenderPath,
}

/// Seek input configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Seek step for left/right in seconds
    pub seek_step_secs: u32,

    /// Seek step for up/down in seconds
    pub fast_seek_step_secs: u32,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

/// Colorspace override applied by the pixel converter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorSpace {
    /// Use whatever the stream declares
    #[default]
    Auto,

    /// ITU-R BT.709
    Bt709,

    /// ITU-R BT.601
    Bt601,

    /// FCC
    Fcc,

    /// SMPTE 240M
    Smpte240m,
}

impl ColorSpace {
    /// Parse a host option value
    pub fn from_option_value(value: &str) -> Option<Self> {
        match value {
            "auto" => Some(ColorSpace::Auto),
            "BT.709" => Some(ColorSpace::Bt709),
            "BT.601" => Some(ColorSpace::Bt601),
            "FCC" => Some(ColorSpace::Fcc),
            "SMPTE240M" => Some(ColorSpace::Smpte240m),
            _ => None,
        }
    }
}

/// Where converted frames are presented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RenderPath {
    /// Blend on the CPU and hand a pixel buffer to the host
    #[default]
    Cpu,

    /// Upload to an external GPU renderer which blends
    Gpu,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            interpolate_fps: 60.0,
            audio_buffer_seconds: 20.0,
            video_buffer_frames: 32,
            max_decode_attempts: 4,
            discontinuity_threshold: 1.0,
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            temporal_interpolation: true,
            color_space: ColorSpace::Auto,
            render_path: RenderPath::Cpu,
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            seek_step_secs: 10,
            fast_seek_step_secs: 60,
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from various sources
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. System config file (/etc/tickplay/config.toml on Linux)
    /// 3. User config file (~/.config/tickplay/config.toml on Linux)
    /// 4. Environment variables (TICKPLAY_* prefix)
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(system_path) = Self::system_config_path() {
            if system_path.exists() {
                config = Self::from_file(&system_path)?;
            }
        }

        if let Some(user_path) = Self::user_config_path() {
            if user_path.exists() {
                config = Self::from_file(&user_path)?;
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Read a TOML file; missing keys fall back to defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).config_err("Failed to read config file")?;
        toml::from_str(&contents).config_err("Failed to parse config file")
    }

    /// Save configuration to a TOML file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PlayerError::Config(format!("Failed to create config directory: {}", e)))?;
        }

        let toml = toml::to_string_pretty(self)
            .map_err(|e| PlayerError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, toml)
            .map_err(|e| PlayerError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(fps) = std::env::var("TICKPLAY_INTERPOLATE_FPS") {
            self.pipeline.interpolate_fps = fps.parse()
                .map_err(|_| PlayerError::Config("Invalid TICKPLAY_INTERPOLATE_FPS".to_string()))?;
        }

        if let Ok(frames) = std::env::var("TICKPLAY_VIDEO_BUFFER_FRAMES") {
            self.pipeline.video_buffer_frames = frames.parse()
                .map_err(|_| PlayerError::Config("Invalid TICKPLAY_VIDEO_BUFFER_FRAMES".to_string()))?;
        }

        if let Ok(interp) = std::env::var("TICKPLAY_TEMPORAL_INTERPOLATION") {
            self.video.temporal_interpolation = interp.parse()
                .map_err(|_| PlayerError::Config("Invalid TICKPLAY_TEMPORAL_INTERPOLATION".to_string()))?;
        }

        if let Ok(log_level) = std::env::var("TICKPLAY_LOG_LEVEL") {
            self.general.log_level = log_level;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !(self.pipeline.interpolate_fps > 0.0) {
            return Err(PlayerError::Config("interpolate_fps must be positive".to_string()));
        }

        if !(self.pipeline.audio_buffer_seconds > 0.0) {
            return Err(PlayerError::Config("audio_buffer_seconds must be positive".to_string()));
        }

        if self.pipeline.video_buffer_frames == 0 {
            return Err(PlayerError::Config("video_buffer_frames must be non-zero".to_string()));
        }

        if self.pipeline.max_decode_attempts == 0 {
            return Err(PlayerError::Config("max_decode_attempts must be non-zero".to_string()));
        }

        if !(self.pipeline.discontinuity_threshold > 0.0) {
            return Err(PlayerError::Config("discontinuity_threshold must be positive".to_string()));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.general.log_level.as_str()) {
            return Err(PlayerError::Config(format!(
                "Invalid log level '{}', must be one of: {:?}",
                self.general.log_level,
                valid_log_levels
            )));
        }

        Ok(())
    }

    /// Get system config file path
    fn system_config_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        return Some(PathBuf::from("/etc/tickplay/config.toml"));

        #[cfg(target_os = "windows")]
        return std::env::var("PROGRAMDATA").ok()
            .map(|p| PathBuf::from(p).join("tickplay").join("config.toml"));

        #[cfg(target_os = "macos")]
        return Some(PathBuf::from("/Library/Application Support/tickplay/config.toml"));

        #[allow(unreachable_code)]
        None
    }

    /// Get user config file path
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("tickplay").join("config.toml"))
    }
}
