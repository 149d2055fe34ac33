// Media processing layer
//
// - Processor: ffmpeg/ffprobe-backed implementation of the trait below
// - Commands: command builders and abstractions

pub mod commands;
pub mod processor;

use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub use commands::*;
pub use processor::*;

use crate::config::MediaConfig;
use crate::error::Result;

/// A probed, decodable source
#[derive(Debug, Clone, PartialEq)]
pub struct MediaSource {
    pub path: PathBuf,
    /// Duration in seconds
    pub duration: f64,
    pub has_audio: bool,
    pub container: String,
    pub size: u64,
}

/// A single encode attempt handed to the processor
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeJob {
    pub source: PathBuf,
    pub output: PathBuf,
    /// Sub-range start in seconds
    pub start: f64,
    /// Sub-range end in seconds
    pub end: f64,
    /// Video bitrate in bits per second
    pub bitrate: u64,
    pub mute: bool,
}

/// Main trait for media processing operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaProcessorTrait: Send + Sync {
    /// Check that the encoder and probe tools can be executed
    async fn check_availability(&self) -> Result<()>;

    /// Get encoder version information
    async fn version_info(&self) -> Result<String>;

    /// Read duration and stream layout of a source
    async fn probe(&self, source: &Path) -> Result<MediaSource>;

    /// Encode one attempt, overwriting `job.output`
    async fn encode(&self, job: &EncodeJob) -> Result<()>;
}

/// Factory for creating media processor instances
pub struct MediaProcessorFactory;

impl MediaProcessorFactory {
    /// Create the default media processor implementation (FFmpeg-based)
    pub fn create_processor(config: MediaConfig) -> Box<dyn MediaProcessorTrait> {
        Box::new(processor::FfmpegProcessor::new(config))
    }
}
