//! FFprobe frame counting.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::decision::FrameProbe;
use crate::error::{MediaError, MediaResult};

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    nb_frames: Option<String>,
}

/// Frame counter backed by the FFprobe binary.
#[derive(Debug, Clone)]
pub struct Prober {
    ffprobe: PathBuf,
}

impl Prober {
    pub fn new(ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
        }
    }

    /// Number of frames in the first video stream of `path`.
    pub async fn frame_count(&self, path: &Path) -> MediaResult<u64> {
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }

        let ffprobe = which::which(&self.ffprobe)
            .map_err(|_| MediaError::FfprobeNotFound(self.ffprobe.clone()))?;

        let output = Command::new(&ffprobe)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=nb_frames",
                "-of",
                "json",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => MediaError::FfprobeNotFound(ffprobe.clone()),
                _ => MediaError::Io(e),
            })?;

        if !output.status.success() {
            return Err(MediaError::ffprobe_failed(
                format!("FFprobe failed for {}", path.display()),
                Some(String::from_utf8_lossy(&output.stderr).to_string()),
            ));
        }

        let frames = parse_frame_count(&output.stdout)?
            .ok_or_else(|| MediaError::MissingFrameCount(path.to_path_buf()))?;
        debug!("{} has {} frames", path.display(), frames);
        Ok(frames)
    }
}

#[async_trait]
impl FrameProbe for Prober {
    async fn frame_count(&self, path: &Path) -> MediaResult<u64> {
        Prober::frame_count(self, path).await
    }
}

/// Extract `streams[0].nb_frames` from FFprobe's JSON document.
fn parse_frame_count(stdout: &[u8]) -> MediaResult<Option<u64>> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;
    Ok(probe
        .streams
        .first()
        .and_then(|s| s.nb_frames.as_deref())
        .and_then(|n| n.trim().parse::<u64>().ok()))
}
