//! Clipfit - trim an MP4 and re-encode it to fit a target file size
//!
//! The encoder picks a bitrate from the clip duration and the target size,
//! encodes with ffmpeg, measures the result and retries with a corrected
//! bitrate until the clip fits or the attempt budget is spent.

pub mod app;
pub mod cli;
pub mod config;
pub mod encoder;
pub mod error;
pub mod media;
pub mod timecode;
