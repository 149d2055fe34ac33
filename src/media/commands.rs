use std::path::Path;
use tokio::process::Command;
use tracing::debug;

use crate::config::MediaConfig;
use crate::error::{Result, ClipError};
use super::EncodeJob;

/// Abstract media processing command representation
#[derive(Debug, Clone)]
pub struct MediaCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
}

impl MediaCommand {
    /// Create a new media processing command
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Add output file
    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    /// Seek to a position in the input (seconds)
    pub fn seek(self, seconds: f64) -> Self {
        self.arg("-ss").arg(format!("{:.3}", seconds))
    }

    /// Limit output duration (seconds)
    pub fn duration(self, seconds: f64) -> Self {
        self.arg("-t").arg(format!("{:.3}", seconds))
    }

    /// Set video codec
    pub fn video_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:v").arg(codec)
    }

    /// Set audio codec
    pub fn audio_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:a").arg(codec)
    }

    /// Set target video bitrate in bits per second
    pub fn video_bitrate(self, bits_per_second: u64) -> Self {
        self.arg("-b:v").arg(bits_per_second.to_string())
    }

    /// Set encoder preset
    pub fn preset<S: Into<String>>(self, preset: S) -> Self {
        self.arg("-preset").arg(preset)
    }

    /// Request encoder worker threads
    pub fn threads(self, threads: u32) -> Self {
        self.arg("-threads").arg(threads.to_string())
    }

    /// Disable audio
    pub fn no_audio(self) -> Self {
        self.arg("-an")
    }

    /// Move the moov atom to the front of the file
    pub fn faststart(self) -> Self {
        self.arg("-movflags").arg("+faststart")
    }

    fn spawn_command(&self) -> Command {
        debug!("Executing media processing command: {} {:?}", self.binary_path, self.args);
        debug!("Description: {}", self.description);

        let mut cmd = Command::new(&self.binary_path);
        cmd.args(&self.args).kill_on_drop(true);
        cmd
    }

    async fn run(&self) -> Result<std::process::Output> {
        let output = self.spawn_command().output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ClipError::ToolNotFound(self.binary_path.clone())
            } else {
                ClipError::Io(e)
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ClipError::Encode(format!(
                "{} failed: {}",
                self.description,
                stderr.trim()
            )));
        }

        Ok(output)
    }

    /// Execute the command
    pub async fn execute(&self) -> Result<()> {
        self.run().await.map(|_| ())
    }

    /// Execute the command and return its standard output
    pub async fn execute_capture(&self) -> Result<String> {
        let output = self.run().await?;
        String::from_utf8(output.stdout).map_err(|e| {
            ClipError::Decode(format!("{} produced invalid UTF-8: {}", self.description, e))
        })
    }
}

/// Builder for the commands the encoder needs
pub struct MediaCommandBuilder {
    config: MediaConfig,
}

impl MediaCommandBuilder {
    pub fn new(config: MediaConfig) -> Self {
        Self { config }
    }

    /// Build a JSON probe of format and streams
    pub fn probe<P: AsRef<Path>>(&self, source: P) -> MediaCommand {
        MediaCommand::new(&self.config.probe_path, "Media probe")
            .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
            .output(source)
    }

    /// Build one encode attempt of a sub-range at a fixed bitrate
    pub fn encode(&self, job: &EncodeJob) -> MediaCommand {
        let mut cmd = MediaCommand::new(
            &self.config.binary_path,
            format!("Encode at {} bps", job.bitrate),
        )
        .overwrite();

        // Input seeking keeps the full-range case a plain transcode.
        if job.start > 0.0 {
            cmd = cmd.seek(job.start);
        }
        cmd = cmd
            .input(&job.source)
            .duration(job.end - job.start)
            .video_codec(&self.config.video_codec)
            .video_bitrate(job.bitrate)
            .preset(&self.config.preset)
            .threads(self.config.threads);

        cmd = if job.mute {
            cmd.no_audio()
        } else {
            cmd.audio_codec(&self.config.audio_codec)
        };

        cmd.faststart()
            .args(self.config.extra_options.iter().cloned())
            .output(&job.output)
    }

    /// Build version check command
    pub fn version_check(&self) -> MediaCommand {
        MediaCommand::new(&self.config.binary_path, "Version check")
            .arg("-version")
    }

    /// Build probe tool version check command
    pub fn probe_version_check(&self) -> MediaCommand {
        MediaCommand::new(&self.config.probe_path, "Probe version check")
            .arg("-version")
    }
}
