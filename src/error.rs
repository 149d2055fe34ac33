use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClipError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid time format: {0:?} (expected SS, MM:SS or HH:MM:SS)")]
    InvalidTimeFormat(String),

    #[error("Invalid time range: start {start}s, end {end}s, source duration {duration}s")]
    InvalidRange { start: f64, end: f64, duration: f64 },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error(
        "Target size unreachable after {attempts} attempts: last output {last_size} bytes exceeds {target_bytes} bytes ({})",
        .output.display()
    )]
    SizeTargetUnreachable {
        attempts: u32,
        last_size: u64,
        target_bytes: u64,
        output: PathBuf,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Encode worker stopped unexpectedly: {0}")]
    Worker(String),
}

impl ClipError {
    /// Exhausting the retry budget is an expected outcome; everything else is a hard failure.
    pub fn is_hard_failure(&self) -> bool {
        !matches!(self, ClipError::SizeTargetUnreachable { .. })
    }
}

pub type Result<T> = std::result::Result<T, ClipError>;
