use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Trim an MP4 and re-encode it to fit a target size
    Cut {
        /// Input MP4 file
        input: PathBuf,

        /// Start time (HH:MM:SS, MM:SS or SS); defaults to the beginning
        #[arg(short, long)]
        start: Option<String>,

        /// End time (HH:MM:SS, MM:SS or SS); defaults to the full duration
        #[arg(short, long)]
        end: Option<String>,

        /// Target size in MB (defaults to encode.default_target_mb, 25)
        #[arg(long)]
        size: Option<f64>,

        /// Strip the audio track
        #[arg(short, long)]
        mute: bool,

        /// Delete the original video once the clip fits
        #[arg(long)]
        delete_original: bool,
    },

    /// Show duration and stream layout of a media file
    Probe {
        /// Input media file
        input: PathBuf,
    },

    /// Check that ffmpeg and ffprobe are available
    Check,

    /// Write the default configuration to a file
    InitConfig {
        /// Output path
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,
    },
}
