use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use tracing::{info, debug};

use crate::config::MediaConfig;
use crate::error::{Result, ClipError};
use super::{EncodeJob, MediaCommandBuilder, MediaProcessorTrait, MediaSource};

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: ProbeFormat,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    format_name: String,
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: String,
}

/// FFmpeg-based media processor
pub struct FfmpegProcessor {
    command_builder: MediaCommandBuilder,
}

impl FfmpegProcessor {
    pub fn new(config: MediaConfig) -> Self {
        Self {
            command_builder: MediaCommandBuilder::new(config),
        }
    }
}

#[async_trait]
impl MediaProcessorTrait for FfmpegProcessor {
    async fn check_availability(&self) -> Result<()> {
        self.command_builder.version_check().execute().await?;
        self.command_builder.probe_version_check().execute().await?;
        info!("Media processor is available");
        Ok(())
    }

    async fn version_info(&self) -> Result<String> {
        debug!("Getting media processor version information");

        let stdout = self.command_builder.version_check().execute_capture().await?;
        // The first line carries the version
        Ok(stdout.lines().next().unwrap_or("Unknown version").to_string())
    }

    async fn probe(&self, source: &Path) -> Result<MediaSource> {
        debug!("Probing {}", source.display());

        let json = self
            .command_builder
            .probe(source)
            .execute_capture()
            .await
            .map_err(|e| match e {
                ClipError::Encode(msg) => ClipError::Decode(msg),
                other => other,
            })?;

        parse_probe_output(source, &json)
    }

    async fn encode(&self, job: &EncodeJob) -> Result<()> {
        info!(
            "Encoding {} [{:.3}s..{:.3}s] at {} bps -> {}",
            job.source.display(),
            job.start,
            job.end,
            job.bitrate,
            job.output.display()
        );

        self.command_builder
            .encode(job)
            .execute()
            .await
            .map_err(|e| match e {
                ClipError::Io(io) => ClipError::Encode(io.to_string()),
                other => other,
            })
    }
}

fn parse_probe_output(source: &Path, json: &str) -> Result<MediaSource> {
    let output: ProbeOutput = serde_json::from_str(json)
        .map_err(|e| ClipError::Decode(format!("Unreadable probe output: {}", e)))?;

    let duration = output
        .format
        .duration
        .as_deref()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| ClipError::Decode(format!("No usable duration in {}", source.display())))?;

    if !output.streams.iter().any(|s| s.codec_type == "video") {
        return Err(ClipError::Decode(format!("No video stream in {}", source.display())));
    }

    Ok(MediaSource {
        path: source.to_path_buf(),
        duration,
        has_audio: output.streams.iter().any(|s| s.codec_type == "audio"),
        container: output.format.format_name,
        size: output.format.size.and_then(|s| s.parse().ok()).unwrap_or(0),
    })
}
