//! Upload worker.
//!
//! Runs as its own task. It opens its own YouTube session on entry, so no
//! connection state ever crosses from the orchestrator into the worker.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use clipsync_media::command::wait_cancelled;
use clipsync_models::{UploadMetadata, VideoId};
use clipsync_youtube::{UploadObserver, YoutubeConnector, YoutubeError};
use tokio::sync::watch;
use tracing::Instrument;

use crate::error::{WorkerError, WorkerResult};
use crate::logging::WorkerLogger;

/// What to upload.
#[derive(Debug, Clone)]
pub struct UploadJob {
    pub source: PathBuf,
    pub metadata: UploadMetadata,
}

impl UploadJob {
    fn file_name(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.source.display().to_string())
    }
}

/// Forwards upload progress to the run log in 10% steps.
struct RunLogObserver {
    logger: WorkerLogger,
    file_name: String,
    last_decile: AtomicU64,
}

#[async_trait]
impl UploadObserver for RunLogObserver {
    async fn on_progress(&self, acked: u64, total: u64) {
        if total == 0 {
            return;
        }
        let decile = acked.saturating_mul(10) / total;
        if decile > self.last_decile.fetch_max(decile, Ordering::SeqCst) {
            // A closed channel surfaces on the worker's next regular log call.
            let _ = self
                .logger
                .info(format!(
                    "Uploading {}: {}% ({}/{} bytes)",
                    self.file_name,
                    decile * 10,
                    acked,
                    total
                ))
                .await;
        }
    }

    async fn on_retry(&self, retry: u32, bound: Duration, delay: Duration, error: &YoutubeError) {
        let _ = self
            .logger
            .warn(format!(
                "Upload of {} failed ({}); retry {} in {:.2}s (bound {:.0}s)",
                self.file_name,
                error,
                retry,
                delay.as_secs_f64(),
                bound.as_secs_f64()
            ))
            .await;
    }
}

/// Upload one file and report the outcome through `logger`.
///
/// Cancellation abandons the in-flight request; whatever the server already
/// holds stays there.
pub async fn run_upload_worker(
    connector: YoutubeConnector,
    job: UploadJob,
    logger: WorkerLogger,
    cancel_rx: Option<watch::Receiver<bool>>,
) -> WorkerResult<VideoId> {
    let span = logger.create_span();
    upload(connector, job, logger, cancel_rx)
        .instrument(span)
        .await
}

async fn upload(
    connector: YoutubeConnector,
    job: UploadJob,
    logger: WorkerLogger,
    mut cancel_rx: Option<watch::Receiver<bool>>,
) -> WorkerResult<VideoId> {
    let file_name = job.file_name();
    logger
        .info(format!(
            "Uploading {} as \"{}\"",
            file_name, job.metadata.title
        ))
        .await?;

    let session = match connector.connect().await {
        Ok(session) => session,
        Err(e) => {
            logger
                .error(format!("Cannot open YouTube session for {}: {}", file_name, e))
                .await?;
            return Err(e.into());
        }
    };

    let observer = RunLogObserver {
        logger: logger.clone(),
        file_name: file_name.clone(),
        last_decile: AtomicU64::new(0),
    };

    let result = tokio::select! {
        result = session.upload(&job.source, &job.metadata, &observer) => result,
        _ = wait_cancelled(cancel_rx.as_mut()) => Err(YoutubeError::Cancelled),
    };

    match result {
        Ok(id) => {
            logger
                .info(format!("Uploaded {} as video {}", file_name, id))
                .await?;
            Ok(id)
        }
        Err(YoutubeError::Cancelled) => {
            logger
                .warn(format!("Upload of {} abandoned by cancellation", file_name))
                .await?;
            Err(WorkerError::Cancelled)
        }
        Err(e) => {
            logger
                .error(format!("Upload of {} failed: {}", file_name, e))
                .await?;
            Err(e.into())
        }
    }
}
