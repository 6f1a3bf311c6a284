//! Pipeline configuration.
//!
//! Built once at startup and handed to every component; nothing reads the
//! environment after that.

use std::path::PathBuf;

use clipsync_media::Toolchain;
use clipsync_models::EncodingConfig;
use clipsync_youtube::YoutubeConfig;

use crate::error::{WorkerError, WorkerResult};

/// Default stale-target floor (1 MiB).
pub const DEFAULT_STALE_FLOOR_BYTES: u64 = 1024 * 1024;

/// External encoder settings.
#[derive(Debug, Clone, Default)]
pub struct EncoderConfig {
    pub toolchain: Toolchain,
    pub encoding: EncodingConfig,
}

impl EncoderConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = EncodingConfig::default();

        Self {
            toolchain: Toolchain {
                ffmpeg: std::env::var("CLIPSYNC_FFMPEG")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("ffmpeg")),
                ffprobe: std::env::var("CLIPSYNC_FFPROBE")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("ffprobe")),
            },
            encoding: EncodingConfig {
                codec: std::env::var("CLIPSYNC_VIDEO_CODEC").unwrap_or(defaults.codec),
                preset: std::env::var("CLIPSYNC_PRESET").unwrap_or(defaults.preset),
                crf: std::env::var("CLIPSYNC_CRF")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.crf),
                audio_codec: std::env::var("CLIPSYNC_AUDIO_CODEC")
                    .unwrap_or(defaults.audio_codec),
                container: defaults.container,
                extra_args: defaults.extra_args,
            },
        }
    }
}

/// Library layout conventions.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Name of directories holding source clips
    pub collection_dir: String,
    /// Output folder created next to each collection
    pub output_folder: String,
    /// Filename token that tags a clip for upload
    pub upload_marker: String,
    /// Accepted source containers
    pub containers: Vec<String>,
    /// Existing targets at or below this size are stale
    pub stale_floor_bytes: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            collection_dir: "lossless".to_string(),
            output_folder: "AV1".to_string(),
            upload_marker: "ytupload".to_string(),
            containers: vec!["mkv".to_string(), "mp4".to_string()],
            stale_floor_bytes: DEFAULT_STALE_FLOOR_BYTES,
        }
    }
}

impl ScanConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            collection_dir: std::env::var("CLIPSYNC_COLLECTION_DIR")
                .unwrap_or(defaults.collection_dir),
            output_folder: std::env::var("CLIPSYNC_OUTPUT_FOLDER")
                .unwrap_or(defaults.output_folder),
            upload_marker: std::env::var("CLIPSYNC_UPLOAD_MARKER")
                .unwrap_or(defaults.upload_marker),
            containers: std::env::var("CLIPSYNC_CONTAINERS")
                .ok()
                .map(|s| {
                    s.split(',')
                        .map(|c| c.trim().trim_start_matches('.').to_string())
                        .filter(|c| !c.is_empty())
                        .collect::<Vec<_>>()
                })
                .filter(|c| !c.is_empty())
                .unwrap_or(defaults.containers),
            stale_floor_bytes: std::env::var("CLIPSYNC_STALE_FLOOR_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.stale_floor_bytes),
        }
    }
}

/// Consolidated run log settings.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub path: PathBuf,
    /// Bounded channel size; producers wait when it is full
    pub channel_capacity: usize,
    /// Append to an existing log instead of truncating it
    pub append: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("convert-and-upload.log"),
            channel_capacity: 1024,
            append: true,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            path: std::env::var("CLIPSYNC_LOG_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.path),
            channel_capacity: std::env::var("CLIPSYNC_LOG_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|c: &usize| *c > 0)
                .unwrap_or(defaults.channel_capacity),
            append: std::env::var("CLIPSYNC_LOG_APPEND")
                .map(|v| !matches!(v.to_lowercase().as_str(), "0" | "false" | "no"))
                .unwrap_or(defaults.append),
        }
    }
}

/// Everything one pipeline run needs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory tree to scan
    pub library_root: PathBuf,
    pub encoder: EncoderConfig,
    pub youtube: YoutubeConfig,
    pub scan: ScanConfig,
    pub log: LogConfig,
}

impl PipelineConfig {
    /// Configuration with defaults for everything but the library root.
    pub fn new(library_root: impl Into<PathBuf>) -> Self {
        Self {
            library_root: library_root.into(),
            encoder: EncoderConfig::default(),
            youtube: YoutubeConfig::default(),
            scan: ScanConfig::default(),
            log: LogConfig::default(),
        }
    }

    /// Create config from environment variables.
    ///
    /// `cli_root` (the first command-line argument) wins over
    /// `CLIPSYNC_LIBRARY_ROOT`.
    pub fn from_env(cli_root: Option<PathBuf>) -> WorkerResult<Self> {
        let library_root = cli_root
            .or_else(|| std::env::var("CLIPSYNC_LIBRARY_ROOT").ok().map(PathBuf::from))
            .ok_or_else(|| {
                WorkerError::config_error(
                    "library root missing: pass it as the first argument or set CLIPSYNC_LIBRARY_ROOT",
                )
            })?;

        let config = Self {
            library_root,
            encoder: EncoderConfig::from_env(),
            youtube: YoutubeConfig::from_env()?,
            scan: ScanConfig::from_env(),
            log: LogConfig::from_env(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> WorkerResult<()> {
        if !self.library_root.is_dir() {
            return Err(WorkerError::config_error(format!(
                "library root {} is not a directory",
                self.library_root.display()
            )));
        }
        if self.scan.collection_dir.trim().is_empty() {
            return Err(WorkerError::config_error("collection directory name is empty"));
        }
        if self.scan.output_folder.trim().is_empty() {
            return Err(WorkerError::config_error("output folder name is empty"));
        }
        if self.scan.upload_marker.trim().is_empty() {
            return Err(WorkerError::config_error("upload marker is empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_defaults() {
        let scan = ScanConfig::default();
        assert_eq!(scan.collection_dir, "lossless");
        assert_eq!(scan.output_folder, "AV1");
        assert_eq!(scan.upload_marker, "ytupload");
        assert_eq!(scan.containers, vec!["mkv", "mp4"]);
        assert_eq!(scan.stale_floor_bytes, 1024 * 1024);
    }

    #[test]
    fn test_encoder_defaults() {
        let encoder = EncoderConfig::default();
        assert_eq!(encoder.encoding.codec, "libsvtav1");
        assert_eq!(encoder.encoding.crf, 30);
        assert_eq!(encoder.toolchain.ffmpeg, PathBuf::from("ffmpeg"));
    }

    #[test]
    fn test_validate_root() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PipelineConfig::new(dir.path()).validate().is_ok());

        let missing = PipelineConfig::new(dir.path().join("missing"));
        assert!(matches!(missing.validate(), Err(WorkerError::ConfigError(_))));
    }

    #[test]
    fn test_validate_marker() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::new(dir.path());
        config.scan.upload_marker = "  ".to_string();
        assert!(config.validate().is_err());
    }
}
