//! FFmpeg command builder and encoder runner.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use clipsync_models::EncodingConfig;
use metrics::counter;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};
use crate::progress::{EncoderSignal, ProgressEvent, ProgressParser};

/// Locations of the external binaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

impl Toolchain {
    /// Resolve the FFmpeg binary on PATH (or as given).
    pub fn check_ffmpeg(&self) -> MediaResult<PathBuf> {
        which::which(&self.ffmpeg).map_err(|_| MediaError::FfmpegNotFound(self.ffmpeg.clone()))
    }

    /// Resolve the FFprobe binary on PATH (or as given).
    pub fn check_ffprobe(&self) -> MediaResult<PathBuf> {
        which::which(&self.ffprobe).map_err(|_| MediaError::FfprobeNotFound(self.ffprobe.clone()))
    }
}

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path
    input: PathBuf,
    /// Output file path
    output: PathBuf,
    /// Output arguments (after -i)
    output_args: Vec<String>,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    ///
    /// Commands always refuse to overwrite an existing output.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
        }
    }

    /// Transcode with the fixed quality preset.
    pub fn transcode(input: impl AsRef<Path>, output: impl AsRef<Path>, encoding: &EncodingConfig) -> Self {
        Self::new(input, output)
            .video_codec(&encoding.codec)
            .crf(encoding.crf)
            .preset(&encoding.preset)
            .audio_codec(&encoding.audio_codec)
            .output_args(encoding.extra_args.iter().cloned())
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Set CRF (quality).
    pub fn crf(self, crf: u8) -> Self {
        self.output_arg("-crf").output_arg(crf.to_string())
    }

    /// Set preset.
    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        // Never replace an existing output
        args.push("-n".to_string());

        args.push("-v".to_string());
        args.push("error".to_string());
        args.push("-nostdin".to_string());

        // Progress output to stderr, next to the diagnostics
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.clone());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Terminal outcome of a conversion that did not error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeOutcome {
    /// Encoder finished and the target was written
    Completed,
    /// Target appeared before the encoder could write it
    AlreadyExists,
}

impl EncodeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncodeOutcome::Completed => "completed",
            EncodeOutcome::AlreadyExists => "already_exists",
        }
    }
}

/// Runs conversions with progress tracking and cancellation.
#[derive(Debug, Clone)]
pub struct Encoder {
    toolchain: Toolchain,
    encoding: EncodingConfig,
    /// Cancellation signal receiver
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl Encoder {
    pub fn new(toolchain: Toolchain, encoding: EncodingConfig) -> Self {
        Self {
            toolchain,
            encoding,
            cancel_rx: None,
        }
    }

    /// Set cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    pub fn encoding(&self) -> &EncodingConfig {
        &self.encoding
    }

    /// Convert `source` into `target`, reporting frame progress.
    ///
    /// On cancellation or encoder failure, a target file created by this call
    /// is removed before returning. A target that existed beforehand is never
    /// touched.
    pub async fn convert<F>(
        &self,
        source: &Path,
        target: &Path,
        total_frames: Option<u64>,
        progress_callback: F,
    ) -> MediaResult<EncodeOutcome>
    where
        F: Fn(ProgressEvent) + Send + 'static,
    {
        let ffmpeg = self.toolchain.check_ffmpeg()?;

        if self.is_cancelled() {
            return Err(MediaError::Cancelled);
        }

        let cmd = FfmpegCommand::transcode(source, target, &self.encoding);
        let args = cmd.build_args();
        debug!("Running FFmpeg: {} {}", ffmpeg.display(), args.join(" "));

        let existed_before = target.exists();

        let mut child = Command::new(&ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => MediaError::FfmpegNotFound(ffmpeg.clone()),
                _ => MediaError::Io(e),
            })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stderr not captured"))?;
        let mut reader = BufReader::new(stderr);

        // Parse progress on a separate task so the wait below can observe cancellation.
        // The pipe must be drained to EOF even when a line is not valid UTF-8.
        let progress_handle = tokio::spawn(async move {
            let mut parser = ProgressParser::new();
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Failed to read FFmpeg output: {}", e);
                        break;
                    }
                }
                let line = String::from_utf8_lossy(&buf);
                if let Some(EncoderSignal::Frames(frames_done)) = parser.feed(&line) {
                    progress_callback(ProgressEvent {
                        frames_done,
                        total_frames,
                    });
                }
            }
            parser
        });

        let status = match self.wait_for_completion(&mut child).await {
            Ok(status) => status,
            Err(e) => {
                progress_handle.abort();
                if !existed_before {
                    remove_partial(target).await;
                }
                counter!("clipsync_conversions_total", "outcome" => "interrupted").increment(1);
                return Err(e);
            }
        };

        let parser = progress_handle
            .await
            .map_err(|e| MediaError::internal(format!("progress task failed: {}", e)))?;

        if parser.is_already_exists() {
            info!("Target {} already exists, encoder refused to overwrite", target.display());
            counter!("clipsync_conversions_total", "outcome" => "already_exists").increment(1);
            return Ok(EncodeOutcome::AlreadyExists);
        }

        if status.success() {
            if !parser.is_completed() {
                warn!(
                    "FFmpeg exited cleanly without a completion marker for {}",
                    target.display()
                );
            }
            counter!("clipsync_conversions_total", "outcome" => "completed").increment(1);
            return Ok(EncodeOutcome::Completed);
        }

        if !existed_before {
            remove_partial(target).await;
        }
        counter!("clipsync_conversions_total", "outcome" => "failed").increment(1);
        Err(MediaError::ffmpeg_failed(
            "FFmpeg exited with non-zero status",
            parser.diagnostics(),
            status.code(),
        ))
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_rx
            .as_ref()
            .map(|rx| *rx.borrow())
            .unwrap_or(false)
    }

    /// Wait for the child, killing it if cancellation is signalled first.
    async fn wait_for_completion(&self, child: &mut Child) -> MediaResult<ExitStatus> {
        let mut cancel_rx = self.cancel_rx.clone();

        tokio::select! {
            status = child.wait() => return Ok(status?),
            _ = wait_cancelled(cancel_rx.as_mut()) => {}
        }

        info!("FFmpeg cancelled, killing process");
        let _ = child.kill().await;
        Err(MediaError::Cancelled)
    }
}

/// Resolves once the signal flips to `true`; never resolves without a signal.
pub async fn wait_cancelled(rx: Option<&mut watch::Receiver<bool>>) {
    match rx {
        Some(rx) => {
            let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
            if closed {
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending::<()>().await,
    }
}

/// Delete a partially written output, logging instead of failing.
async fn remove_partial(target: &Path) {
    match tokio::fs::remove_file(target).await {
        Ok(()) => info!("Removed partial output {}", target.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial output {}: {}", target.display(), e),
    }
}
