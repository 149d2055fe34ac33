use serde::{Deserialize, Serialize};
use std::path::Path;
use crate::error::{Result, ClipError};

fn default_ffprobe_path() -> String {
    "ffprobe".to_string()
}

fn default_extra_options() -> Vec<String> {
    Vec::new()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub media: MediaConfig,
    pub encode: EncodeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Path to ffmpeg binary
    pub binary_path: String,
    /// Path to ffprobe binary
    #[serde(default = "default_ffprobe_path")]
    pub probe_path: String,
    /// Video encoder passed to `-c:v`
    pub video_codec: String,
    /// Audio encoder passed to `-c:a` (ignored when muting)
    pub audio_codec: String,
    /// Encoder preset tier (ultrafast, fast, medium, slow, veryslow)
    pub preset: String,
    /// Worker threads requested from the encoder
    pub threads: u32,
    /// Additional encoding options appended before the output path
    /// Common options: ["-pix_fmt", "yuv420p"]
    #[serde(default = "default_extra_options")]
    pub extra_options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodeConfig {
    /// Target size used when the request does not give one (MB)
    pub default_target_mb: f64,
    /// Maximum number of encode attempts before giving up
    pub max_attempts: u32,
    /// Megabytes reserved for container overhead
    pub margin_mb: f64,
    /// Multiplier applied to the target after the margin
    pub safety_factor: f64,
    /// Extra damping applied to every corrected bitrate
    pub retry_damping: f64,
    /// Suffix appended to the source stem for the output file
    pub output_suffix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            media: MediaConfig::default(),
            encode: EncodeConfig::default(),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            binary_path: "ffmpeg".to_string(),
            probe_path: default_ffprobe_path(),
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            preset: "fast".to_string(),
            threads: 4,
            extra_options: default_extra_options(),
        }
    }
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            default_target_mb: 25.0,
            max_attempts: 5,
            margin_mb: 1.0,
            safety_factor: 0.95,
            retry_damping: 0.95,
            output_suffix: "_cut".to_string(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ClipError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ClipError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ClipError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ClipError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.encode.max_attempts == 0 {
            return Err(ClipError::Config("encode.max_attempts must be at least 1".to_string()));
        }
        if !(self.encode.safety_factor > 0.0 && self.encode.safety_factor <= 1.0) {
            return Err(ClipError::Config("encode.safety_factor must be in (0, 1]".to_string()));
        }
        if !(self.encode.retry_damping > 0.0 && self.encode.retry_damping <= 1.0) {
            return Err(ClipError::Config("encode.retry_damping must be in (0, 1]".to_string()));
        }
        if self.encode.margin_mb < 0.0 {
            return Err(ClipError::Config("encode.margin_mb must not be negative".to_string()));
        }
        if self.encode.output_suffix.is_empty() {
            return Err(ClipError::Config("encode.output_suffix must not be empty".to_string()));
        }
        if self.media.threads == 0 {
            return Err(ClipError::Config("media.threads must be at least 1".to_string()));
        }
        Ok(())
    }
}
