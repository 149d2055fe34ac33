//! Bitrate-converging encoder.
//!
//! Encodes a sub-range of a source at a bitrate derived from the target size,
//! measures the result and retries with a corrected bitrate until the output
//! fits or the attempt budget runs out.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{info, warn};

use crate::config::EncodeConfig;
use crate::error::{ClipError, Result};
use crate::media::{EncodeJob, MediaProcessorTrait};
use crate::timecode::{format_time, parse_time};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// What the caller asked for. Time strings are parsed by the encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeRequest {
    pub source: PathBuf,
    pub start: Option<String>,
    pub end: Option<String>,
    pub target_mb: f64,
    pub mute: bool,
    pub delete_source: bool,
}

/// Resolved sub-range in seconds. `0 <= start < end <= duration`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    /// Apply defaults (0 and full duration) and clamp the end to the source duration.
    pub fn resolve(start: Option<u64>, end: Option<u64>, duration: f64) -> Result<Self> {
        let start = start.map(|s| s as f64).unwrap_or(0.0);
        let end = end.map(|e| (e as f64).min(duration)).unwrap_or(duration);

        if start >= duration || start >= end {
            return Err(ClipError::InvalidRange { start, end, duration });
        }

        Ok(Self { start, end })
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodeAttempt {
    /// 1-based
    pub attempt: u32,
    pub bitrate: u64,
    pub size: u64,
}

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeReport {
    pub output: PathBuf,
    pub range: TimeRange,
    pub target_bytes: u64,
    pub initial_bitrate: u64,
    pub attempts: Vec<EncodeAttempt>,
    pub source_deleted: bool,
}

impl EncodeReport {
    pub fn final_size(&self) -> u64 {
        self.attempts.last().map(|a| a.size).unwrap_or(0)
    }
}

/// Byte ceiling for a target in MB after the overhead margin and safety factor.
pub fn target_bytes(target_mb: f64, settings: &EncodeConfig) -> Result<u64> {
    let bytes = (target_mb - settings.margin_mb) * BYTES_PER_MB * settings.safety_factor;
    if !bytes.is_finite() || bytes < 1.0 {
        return Err(ClipError::InvalidRequest(format!(
            "target size {} MB leaves no room after the {} MB margin",
            target_mb, settings.margin_mb
        )));
    }
    Ok(bytes as u64)
}

/// Bitrate (bits/sec) that spends `target_bytes` over `duration` seconds.
pub fn initial_bitrate(target_bytes: u64, duration: f64) -> u64 {
    (target_bytes as f64 * 8.0 / duration) as u64
}

/// Rescale the initial bitrate by how far the last output overshot, then damp.
///
/// The correction is always relative to the initial bitrate, never the previous attempt's.
pub fn corrected_bitrate(initial_bitrate: u64, measured: u64, target_bytes: u64, damping: f64) -> u64 {
    let size_ratio = measured as f64 / target_bytes as f64;
    ((initial_bitrate as f64 / size_ratio * damping) as u64).max(1)
}

/// `<dir>/<stem><suffix>.mp4`
pub fn output_path_for(source: &Path, suffix: &str) -> Result<PathBuf> {
    let stem = source
        .file_stem()
        .ok_or_else(|| ClipError::InvalidRequest(format!("No file name in {}", source.display())))?
        .to_string_lossy();
    Ok(source.with_file_name(format!("{}{}.mp4", stem, suffix)))
}

pub struct BitrateConvergingEncoder {
    media: Arc<dyn MediaProcessorTrait>,
    settings: EncodeConfig,
}

impl BitrateConvergingEncoder {
    pub fn new(media: Arc<dyn MediaProcessorTrait>, settings: EncodeConfig) -> Self {
        Self { media, settings }
    }

    /// Run the convergence loop for one request.
    ///
    /// Request validation (time strings, target size, range) happens before any
    /// encode. The output file is overwritten in place by every attempt and is
    /// left on disk on failure. The source is removed only on success and only
    /// when `delete_source` is set.
    pub async fn run(&self, request: &EncodeRequest) -> Result<EncodeReport> {
        let start = parse_time(request.start.as_deref())?;
        let end = parse_time(request.end.as_deref())?;
        let target_bytes = target_bytes(request.target_mb, &self.settings)?;
        let output = output_path_for(&request.source, &self.settings.output_suffix)?;

        let source = self.media.probe(&request.source).await?;
        let range = TimeRange::resolve(start, end, source.duration)?;

        info!(
            "Cutting {} from {} to {} (source {}), target {} bytes",
            request.source.display(),
            format_time(range.start),
            format_time(range.end),
            format_time(source.duration),
            target_bytes
        );

        let initial = initial_bitrate(target_bytes, range.duration());
        let max_attempts = self.settings.max_attempts;
        let mut attempts = Vec::with_capacity(max_attempts as usize);
        let mut bitrate = initial;

        for attempt in 1..=max_attempts {
            let job = EncodeJob {
                source: request.source.clone(),
                output: output.clone(),
                start: range.start,
                end: range.end,
                bitrate,
                mute: request.mute,
            };
            self.media.encode(&job).await?;

            let size = fs::metadata(&output)
                .await
                .map_err(|e| {
                    ClipError::Encode(format!("Cannot measure {}: {}", output.display(), e))
                })?
                .len();
            info!(
                "Attempt {}: output file size is {:.2} MB",
                attempt,
                size as f64 / BYTES_PER_MB
            );
            attempts.push(EncodeAttempt { attempt, bitrate, size });

            if size <= target_bytes {
                let source_deleted = if request.delete_source {
                    fs::remove_file(&request.source).await?;
                    info!("Deleted original video: {}", request.source.display());
                    true
                } else {
                    false
                };

                return Ok(EncodeReport {
                    output,
                    range,
                    target_bytes,
                    initial_bitrate: initial,
                    attempts,
                    source_deleted,
                });
            }

            if attempt < max_attempts {
                bitrate = corrected_bitrate(initial, size, target_bytes, self.settings.retry_damping);
                warn!("File too large, retrying at {} bps", bitrate);
            }
        }

        warn!("Failed to compress to the desired size after {} attempts", max_attempts);
        Err(ClipError::SizeTargetUnreachable {
            attempts: max_attempts,
            last_size: attempts.last().map(|a| a.size).unwrap_or(0),
            target_bytes,
            output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaSource, MockMediaProcessorTrait};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Encoder whose output size is a deterministic function of the requested bitrate.
    struct SyntheticEncoder<F> {
        duration: f64,
        size_for: F,
        jobs: Mutex<Vec<EncodeJob>>,
    }

    impl<F> SyntheticEncoder<F>
    where
        F: Fn(u64) -> u64 + Send + Sync,
    {
        fn new(duration: f64, size_for: F) -> Self {
            Self { duration, size_for, jobs: Mutex::new(Vec::new()) }
        }

        fn jobs(&self) -> Vec<EncodeJob> {
            self.jobs.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl<F> MediaProcessorTrait for SyntheticEncoder<F>
    where
        F: Fn(u64) -> u64 + Send + Sync,
    {
        async fn check_availability(&self) -> Result<()> {
            Ok(())
        }

        async fn version_info(&self) -> Result<String> {
            Ok("synthetic".to_string())
        }

        async fn probe(&self, source: &Path) -> Result<MediaSource> {
            Ok(MediaSource {
                path: source.to_path_buf(),
                duration: self.duration,
                has_audio: true,
                container: "mp4".to_string(),
                size: 0,
            })
        }

        async fn encode(&self, job: &EncodeJob) -> Result<()> {
            self.jobs.lock().unwrap().push(job.clone());
            let file = std::fs::File::create(&job.output)?;
            file.set_len((self.size_for)(job.bitrate))?;
            Ok(())
        }
    }

    fn source_in(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("holiday.MP4");
        std::fs::write(&path, b"source").unwrap();
        path
    }

    fn request(source: PathBuf, target_mb: f64) -> EncodeRequest {
        EncodeRequest {
            source,
            start: None,
            end: None,
            target_mb,
            mute: false,
            delete_source: false,
        }
    }

    fn encoder<M: MediaProcessorTrait + 'static>(media: Arc<M>) -> BitrateConvergingEncoder {
        BitrateConvergingEncoder::new(media, EncodeConfig::default())
    }

    #[test]
    fn test_initial_bitrate_formula() {
        let settings = EncodeConfig::default();
        let target = target_bytes(25.0, &settings).unwrap();
        let expected = ((25.0 - 1.0) * 1024.0 * 1024.0 * 0.95) * 8.0 / 100.0;
        let bitrate = initial_bitrate(target, 100.0);
        assert!((bitrate as f64 - expected).abs() < 1.0, "{bitrate} vs {expected}");
    }

    #[test]
    fn test_target_bytes_rejects_sizes_within_margin() {
        let settings = EncodeConfig::default();
        assert!(matches!(target_bytes(1.0, &settings), Err(ClipError::InvalidRequest(_))));
        assert!(matches!(target_bytes(0.5, &settings), Err(ClipError::InvalidRequest(_))));
        assert!(matches!(target_bytes(f64::NAN, &settings), Err(ClipError::InvalidRequest(_))));
        assert_eq!(target_bytes(2.0, &settings).unwrap(), (1024.0 * 1024.0 * 0.95) as u64);
    }

    #[test]
    fn test_corrected_bitrate_damps_from_initial() {
        assert_eq!(corrected_bitrate(1_000_000, 2_000, 1_000, 0.95), 475_000);
        assert_eq!(corrected_bitrate(1_000_000, 1_250, 1_000, 1.0), 800_000);
    }

    #[test]
    fn test_output_path_for() {
        let out = output_path_for(Path::new("/videos/holiday.MP4"), "_cut").unwrap();
        assert_eq!(out, PathBuf::from("/videos/holiday_cut.mp4"));
        let out = output_path_for(Path::new("clip.v2.mp4"), "_cut").unwrap();
        assert_eq!(out, PathBuf::from("clip.v2_cut.mp4"));
    }

    #[test]
    fn test_time_range_resolution() {
        assert_eq!(
            TimeRange::resolve(None, None, 100.0).unwrap(),
            TimeRange { start: 0.0, end: 100.0 }
        );
        assert_eq!(
            TimeRange::resolve(Some(10), Some(500), 100.0).unwrap(),
            TimeRange { start: 10.0, end: 100.0 }
        );
        assert!(matches!(
            TimeRange::resolve(Some(30), Some(30), 100.0),
            Err(ClipError::InvalidRange { .. })
        ));
        assert!(matches!(
            TimeRange::resolve(Some(120), None, 100.0),
            Err(ClipError::InvalidRange { .. })
        ));
    }

    #[tokio::test]
    async fn test_first_attempt_success_deletes_source_once() {
        let dir = TempDir::new().unwrap();
        let source = source_in(&dir);
        let media = Arc::new(SyntheticEncoder::new(100.0, |_| 1_000));

        let mut req = request(source.clone(), 25.0);
        req.delete_source = true;
        let report = encoder(media.clone()).run(&req).await.unwrap();

        assert_eq!(report.output, dir.path().join("holiday_cut.mp4"));
        assert!(report.output.exists());
        assert!(report.source_deleted);
        assert!(!source.exists());
        assert_eq!(report.attempts.len(), 1);
        assert_eq!(report.attempts[0].bitrate, report.initial_bitrate);
        assert_eq!(media.jobs().len(), 1);
    }

    #[tokio::test]
    async fn test_full_range_encodes_entire_source() {
        let dir = TempDir::new().unwrap();
        let media = Arc::new(SyntheticEncoder::new(100.0, |_| 1));

        let mut req = request(source_in(&dir), 25.0);
        req.start = Some("0".to_string());
        let report = encoder(media.clone()).run(&req).await.unwrap();

        let jobs = media.jobs();
        assert_eq!(jobs[0].start, 0.0);
        assert_eq!(jobs[0].end, 100.0);
        assert_eq!(report.range.duration(), 100.0);
    }

    #[tokio::test]
    async fn test_always_oversized_exhausts_after_five_attempts() {
        let dir = TempDir::new().unwrap();
        let source = source_in(&dir);
        let media = Arc::new(SyntheticEncoder::new(60.0, |_| 5 * 1024 * 1024));

        let mut req = request(source.clone(), 2.0);
        req.delete_source = true;
        let err = encoder(media.clone()).run(&req).await.unwrap_err();

        match err {
            ClipError::SizeTargetUnreachable { attempts, last_size, output, .. } => {
                assert_eq!(attempts, 5);
                assert_eq!(last_size, 5 * 1024 * 1024);
                assert!(output.exists());
            }
            other => panic!("expected SizeTargetUnreachable, got {other:?}"),
        }
        assert_eq!(media.jobs().len(), 5);
        assert!(source.exists());
    }

    #[tokio::test]
    async fn test_retries_rescale_from_initial_bitrate() {
        let dir = TempDir::new().unwrap();
        let settings = EncodeConfig::default();
        let target = target_bytes(25.0, &settings).unwrap();
        let initial = initial_bitrate(target, 100.0);

        // 2x over on the first attempt, 1.5x over on the second, then fits.
        let media = Arc::new(SyntheticEncoder::new(100.0, move |bitrate| {
            if bitrate == initial {
                target * 2
            } else if bitrate == corrected_bitrate(initial, target * 2, target, 0.95) {
                target * 3 / 2
            } else {
                target
            }
        }));

        let report = encoder(media.clone()).run(&request(source_in(&dir), 25.0)).await.unwrap();

        let bitrates: Vec<u64> = media.jobs().iter().map(|j| j.bitrate).collect();
        assert_eq!(bitrates.len(), 3);
        assert_eq!(bitrates[0], initial);
        assert_eq!(bitrates[1], (initial as f64 / 2.0 * 0.95) as u64);
        assert_eq!(bitrates[2], corrected_bitrate(initial, target * 3 / 2, target, 0.95));
        assert_eq!(report.final_size(), target);
        assert!(!report.source_deleted);
    }

    #[tokio::test]
    async fn test_synthetic_encoders_always_terminate() {
        let models: Vec<Box<dyn Fn(u64) -> u64 + Send + Sync>> = vec![
            Box::new(|b| b * 100 / 8),
            Box::new(|b| b * 300 / 8),
            Box::new(|b| ((b as f64).sqrt() * 40_000.0) as u64),
            Box::new(|_| 200 * 1024 * 1024),
            Box::new(|_| 0),
            Box::new(|b| if b % 2 == 0 { 1 } else { 50 * 1024 * 1024 }),
        ];

        for model in models {
            let dir = TempDir::new().unwrap();
            let media = Arc::new(SyntheticEncoder::new(100.0, model));
            let result = encoder(media.clone()).run(&request(source_in(&dir), 10.0)).await;

            let count = media.jobs().len();
            assert!((1..=5).contains(&count));
            match result {
                Ok(report) => assert_eq!(report.attempts.len(), count),
                Err(ClipError::SizeTargetUnreachable { attempts, .. }) => {
                    assert_eq!(attempts, 5);
                    assert_eq!(count, 5);
                }
                Err(other) => panic!("unexpected error {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_invalid_time_fails_before_probe() {
        let mut media = MockMediaProcessorTrait::new();
        media.expect_probe().times(0);
        media.expect_encode().times(0);

        let mut req = request(PathBuf::from("/videos/a.mp4"), 25.0);
        req.end = Some("1:xx".to_string());
        let err = encoder(Arc::new(media)).run(&req).await.unwrap_err();
        assert!(matches!(err, ClipError::InvalidTimeFormat(_)));
    }

    #[tokio::test]
    async fn test_invalid_range_fails_before_encode() {
        let mut media = MockMediaProcessorTrait::new();
        media.expect_probe().times(1).returning(|p| {
            Ok(MediaSource {
                path: p.to_path_buf(),
                duration: 30.0,
                has_audio: true,
                container: "mp4".to_string(),
                size: 0,
            })
        });
        media.expect_encode().times(0);

        let mut req = request(PathBuf::from("/videos/a.mp4"), 25.0);
        req.start = Some("0:45".to_string());
        let err = encoder(Arc::new(media)).run(&req).await.unwrap_err();
        assert!(matches!(err, ClipError::InvalidRange { .. }));
    }

    #[tokio::test]
    async fn test_decode_error_aborts_without_encoding() {
        let mut media = MockMediaProcessorTrait::new();
        media
            .expect_probe()
            .returning(|_| Err(ClipError::Decode("moov atom not found".to_string())));
        media.expect_encode().times(0);

        let err = encoder(Arc::new(media))
            .run(&request(PathBuf::from("/videos/a.mp4"), 25.0))
            .await
            .unwrap_err();
        assert!(matches!(err, ClipError::Decode(_)));
    }

    #[tokio::test]
    async fn test_encode_error_leaves_partial_output_and_source() {
        let dir = TempDir::new().unwrap();
        let source = source_in(&dir);

        let mut media = MockMediaProcessorTrait::new();
        media.expect_probe().returning(|p| {
            Ok(MediaSource {
                path: p.to_path_buf(),
                duration: 10.0,
                has_audio: false,
                container: "mp4".to_string(),
                size: 6,
            })
        });
        media.expect_encode().times(1).returning(|job| {
            std::fs::write(&job.output, b"partial").unwrap();
            Err(ClipError::Encode("disk full".to_string()))
        });

        let mut req = request(source.clone(), 25.0);
        req.delete_source = true;
        req.mute = true;
        let err = encoder(Arc::new(media)).run(&req).await.unwrap_err();

        assert!(matches!(err, ClipError::Encode(_)));
        assert!(dir.path().join("holiday_cut.mp4").exists());
        assert!(source.exists());
    }
}
