use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, debug};

use crate::config::Config;
use crate::encoder::{BitrateConvergingEncoder, EncodeReport, EncodeRequest};
use crate::error::{ClipError, Result};
use crate::media::{MediaProcessorFactory, MediaProcessorTrait};

/// Application context built once at startup and passed to whatever drives it.
pub struct AppContext {
    config: Config,
    media: Arc<dyn MediaProcessorTrait>,
    encoder: Arc<BitrateConvergingEncoder>,
}

impl AppContext {
    pub fn new(config: Config) -> Self {
        let media: Arc<dyn MediaProcessorTrait> =
            Arc::from(MediaProcessorFactory::create_processor(config.media.clone()));
        Self::with_processor(config, media)
    }

    pub fn with_processor(config: Config, media: Arc<dyn MediaProcessorTrait>) -> Self {
        let encoder = Arc::new(BitrateConvergingEncoder::new(media.clone(), config.encode.clone()));
        Self { config, media, encoder }
    }

    pub fn media(&self) -> &dyn MediaProcessorTrait {
        self.media.as_ref()
    }

    /// Only `.mp4` files are accepted, case-insensitively.
    pub fn accepts(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("mp4"))
    }

    /// Build a request from user input, filling in the configured default target size.
    pub fn request(
        &self,
        input: PathBuf,
        start: Option<String>,
        end: Option<String>,
        target_mb: Option<f64>,
        mute: bool,
        delete_source: bool,
    ) -> Result<EncodeRequest> {
        if !Self::accepts(&input) {
            return Err(ClipError::InvalidRequest(format!(
                "Please provide an MP4 file: {}",
                input.display()
            )));
        }
        if !input.is_file() {
            return Err(ClipError::FileNotFound(input.display().to_string()));
        }

        Ok(EncodeRequest {
            source: input,
            start: start.filter(|s| !s.trim().is_empty()),
            end: end.filter(|s| !s.trim().is_empty()),
            target_mb: target_mb.unwrap_or(self.config.encode.default_target_mb),
            mute,
            delete_source,
        })
    }

    /// Build a request and make sure the encoder tools can run before any work starts.
    pub async fn prepare(
        &self,
        input: PathBuf,
        start: Option<String>,
        end: Option<String>,
        target_mb: Option<f64>,
        mute: bool,
        delete_source: bool,
    ) -> Result<EncodeRequest> {
        let request = self.request(input, start, end, target_mb, mute, delete_source)?;
        self.media.check_availability().await?;
        Ok(request)
    }

    /// Hand a request to a worker task. The returned handle resolves when the loop finishes.
    pub fn submit(&self, request: EncodeRequest) -> JoinHandle<Result<EncodeReport>> {
        let encoder = Arc::clone(&self.encoder);
        info!("Submitting {}", request.source.display());
        tokio::spawn(async move { encoder.run(&request).await })
    }

    /// Submit and wait for the completion value.
    pub async fn process(&self, request: EncodeRequest) -> Result<EncodeReport> {
        let handle = self.submit(request);
        let result = handle
            .await
            .map_err(|e| ClipError::Worker(e.to_string()))?;
        debug!("Encode worker finished");
        result
    }
}
