//! Pipeline orchestration.
//!
//! One pass over the library. For each candidate the upload decision runs
//! first and, when it says so, the upload starts on its own task. The
//! conversion then runs in the orchestrator's own flow, overlapping the
//! upload. The orchestrator waits for that upload before it moves on, so at
//! most one upload and one encode are in flight.

use std::fmt;

use async_trait::async_trait;
use clipsync_media::{ConversionPlanner, EncodeOutcome, Encoder, ProgressEvent, Prober};
use clipsync_models::{Candidate, ConversionDecision, UploadDecision, VideoId};
use clipsync_youtube::{plan_upload, VideoSearch, YoutubeConnector, YoutubeResult, YoutubeSession};
use serde::Serialize;
use tokio::sync::{watch, OnceCell};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::config::PipelineConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::WorkerLogger;
use crate::scanner::scan_library;
use crate::upload_worker::{run_upload_worker, UploadJob};

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub candidates: u64,
    pub converted: u64,
    pub reconverted: u64,
    pub already_converted: u64,
    pub skipped: u64,
    pub uploaded: u64,
    pub already_on_remote: u64,
    /// Failed conversions, uploads and remote searches
    pub failed: u64,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} candidates: {} converted, {} reconverted, {} already converted, {} skipped, \
             {} uploaded, {} already on YouTube, {} failed",
            self.candidates,
            self.converted,
            self.reconverted,
            self.already_converted,
            self.skipped,
            self.uploaded,
            self.already_on_remote,
            self.failed
        )
    }
}

/// Title search through a session opened on first use.
///
/// Runs with no tagged candidates never touch the credentials.
struct LazySearch {
    connector: YoutubeConnector,
    session: OnceCell<YoutubeSession>,
}

#[async_trait]
impl VideoSearch for LazySearch {
    async fn count_by_title(&self, title: &str) -> YoutubeResult<u64> {
        let session = self
            .session
            .get_or_try_init(|| self.connector.connect())
            .await?;
        session.count_by_title(title).await
    }
}

/// Drives one pass over the library.
pub struct Orchestrator {
    config: PipelineConfig,
    planner: ConversionPlanner<Prober>,
    encoder: Encoder,
    connector: YoutubeConnector,
    search: LazySearch,
    logger: WorkerLogger,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl Orchestrator {
    pub fn new(config: PipelineConfig, logger: WorkerLogger) -> Self {
        let planner = ConversionPlanner::new(
            Prober::new(config.encoder.toolchain.ffprobe.clone()),
            config.scan.containers.clone(),
            config.scan.stale_floor_bytes,
        );
        let encoder = Encoder::new(
            config.encoder.toolchain.clone(),
            config.encoder.encoding.clone(),
        );
        let connector = YoutubeConnector::new(config.youtube.clone());

        Self {
            search: LazySearch {
                connector: connector.clone(),
                session: OnceCell::new(),
            },
            config,
            planner,
            encoder,
            connector,
            logger,
            cancel_rx: None,
        }
    }

    /// Set cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.encoder = self.encoder.with_cancel(cancel_rx.clone());
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Scan the library and process every candidate.
    ///
    /// Per-candidate failures are logged and counted; missing binaries,
    /// missing credentials, a dead log channel and cancellation end the run.
    pub async fn run(&self) -> WorkerResult<RunSummary> {
        let span = self.logger.create_span();
        self.run_logged().instrument(span).await
    }

    async fn run_logged(&self) -> WorkerResult<RunSummary> {
        let result = self.run_inner().await;
        if let Err(e) = &result {
            if e.is_cancelled() {
                // The aggregator may already have closed the channel.
                let _ = self.logger.warn("Run cancelled").await;
                return Err(WorkerError::Cancelled);
            }
            self.logger.error(format!("Run aborted: {}", e)).await?;
        }
        result
    }

    async fn run_inner(&self) -> WorkerResult<RunSummary> {
        self.logger
            .info(format!(
                "clipsync {} starting: library {}, output folder {}, marker {:?}",
                env!("CARGO_PKG_VERSION"),
                self.config.library_root.display(),
                self.config.scan.output_folder,
                self.config.scan.upload_marker
            ))
            .await?;

        self.config.encoder.toolchain.check_ffmpeg()?;
        self.config.encoder.toolchain.check_ffprobe()?;

        let root = self.config.library_root.clone();
        let scan = self.config.scan.clone();
        let collections = tokio::task::spawn_blocking(move || scan_library(&root, &scan))
            .await
            .map_err(|e| WorkerError::task_failed(format!("library scan panicked: {}", e)))??;

        let mut summary = RunSummary::default();

        for collection in collections {
            self.logger
                .info(format!(
                    "Found source collection {} ({} files)",
                    collection.dir.display(),
                    collection.candidates.len()
                ))
                .await?;

            for candidate in &collection.candidates {
                self.check_cancelled()?;
                summary.candidates += 1;

                match self.process_candidate(candidate, &mut summary).await {
                    Ok(()) => {}
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        summary.failed += 1;
                        self.logger
                            .error(format!("Failed to process {}: {}", candidate.file_name(), e))
                            .await?;
                    }
                }
            }
        }

        self.logger.info(format!("Run complete: {}", summary)).await?;
        metrics::counter!("clipsync_runs_total", "outcome" => "completed").increment(1);
        Ok(summary)
    }

    /// Both decisions, the upload task and the conversion for one candidate.
    async fn process_candidate(
        &self,
        candidate: &Candidate,
        summary: &mut RunSummary,
    ) -> WorkerResult<()> {
        let upload = self.start_upload(candidate, summary).await?;
        let conversion = self.convert(candidate, summary).await;

        if let Some(handle) = upload {
            // Nothing useful can come of the upload once the run is aborting.
            if matches!(&conversion, Err(e) if e.is_fatal() && !e.is_cancelled()) {
                handle.abort();
            }
            self.finish_upload(handle, summary).await?;
        }

        conversion
    }

    async fn start_upload(
        &self,
        candidate: &Candidate,
        summary: &mut RunSummary,
    ) -> WorkerResult<Option<JoinHandle<WorkerResult<VideoId>>>> {
        let decision = match plan_upload(candidate, &self.search).await {
            Ok(decision) => decision,
            Err(e) if e.is_config() => return Err(e.into()),
            Err(e) => {
                summary.failed += 1;
                self.logger
                    .warn(format!(
                        "YouTube search for \"{}\" failed, not uploading: {}",
                        candidate.title(),
                        e
                    ))
                    .await?;
                return Ok(None);
            }
        };

        match decision {
            UploadDecision::NotEligible => {
                if candidate.is_upload_tagged() {
                    self.logger
                        .warn(format!(
                            "{} is tagged for upload but has no title left after removing the marker",
                            candidate.file_name()
                        ))
                        .await?;
                }
                Ok(None)
            }
            UploadDecision::AlreadyOnRemote => {
                summary.already_on_remote += 1;
                self.logger
                    .info(format!(
                        "\"{}\" is already on YouTube, not uploading {}",
                        candidate.title(),
                        candidate.file_name()
                    ))
                    .await?;
                Ok(None)
            }
            UploadDecision::Upload => {
                let job = UploadJob {
                    source: candidate.path().to_path_buf(),
                    metadata: self.config.youtube.metadata_for(candidate.title()),
                };
                let handle = tokio::spawn(run_upload_worker(
                    self.connector.clone(),
                    job,
                    self.logger.for_worker("upload"),
                    self.cancel_rx.clone(),
                ));
                Ok(Some(handle))
            }
        }
    }

    async fn finish_upload(
        &self,
        handle: JoinHandle<WorkerResult<VideoId>>,
        summary: &mut RunSummary,
    ) -> WorkerResult<()> {
        match handle.await {
            Ok(Ok(_)) => {
                summary.uploaded += 1;
                Ok(())
            }
            Ok(Err(e)) if e.is_fatal() => Err(e),
            // Already reported by the worker.
            Ok(Err(_)) => {
                summary.failed += 1;
                Ok(())
            }
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(WorkerError::task_failed(format!("upload worker panicked: {}", e))),
        }
    }

    async fn convert(&self, candidate: &Candidate, summary: &mut RunSummary) -> WorkerResult<()> {
        let logger = self.logger.for_worker("convert");
        let name = candidate.file_name();
        let target = candidate.conversion_target(
            &self.config.scan.output_folder,
            &self.config.encoder.encoding.container,
        );

        let decision = self.planner.decide(candidate, &target).await?;
        match decision {
            ConversionDecision::SkipWrongContainer => {
                summary.skipped += 1;
                logger
                    .debug(format!(
                        "Skipping {}: not a {} file",
                        name,
                        self.config.scan.containers.join("/")
                    ))
                    .await?;
                return Ok(());
            }
            ConversionDecision::SkipAlreadyConverted => {
                summary.already_converted += 1;
                logger
                    .info(format!("{} already converted to {}", name, target.path().display()))
                    .await?;
                return Ok(());
            }
            ConversionDecision::ReconvertMismatch(reason) => {
                logger
                    .warn(format!("Reconverting {}: {}", name, reason))
                    .await?;
            }
            ConversionDecision::Convert => {}
        }

        if let Err(e) = tokio::fs::create_dir_all(target.dir()).await {
            summary.skipped += 1;
            logger
                .error(format!(
                    "Cannot create output folder {}, skipping {}: {}",
                    target.dir().display(),
                    name,
                    e
                ))
                .await?;
            return Ok(());
        }

        let total_frames = self.planner.source_frames(candidate).await?;
        self.planner.discard_stale(&decision, &target)?;

        logger
            .info(format!(
                "Converting {} to {} ({} frames)",
                name,
                target.path().display(),
                total_frames
            ))
            .await?;

        let (progress_tx, progress_rx) = watch::channel(ProgressEvent::default());
        let reporter = tokio::spawn(report_progress(progress_rx, logger.clone(), name.clone()));

        let outcome = self
            .encoder
            .convert(candidate.path(), target.path(), Some(total_frames), move |event| {
                let _ = progress_tx.send(event);
            })
            .await;

        let outcome = match outcome {
            Ok(outcome) => {
                reporter
                    .await
                    .map_err(|e| WorkerError::task_failed(format!("progress reporter panicked: {}", e)))??;
                outcome
            }
            Err(e) => {
                reporter.abort();
                if e.is_cancelled() {
                    logger
                        .warn(format!("Conversion of {} interrupted, partial output removed", name))
                        .await?;
                }
                return Err(e.into());
            }
        };

        match (outcome, decision) {
            (EncodeOutcome::AlreadyExists, _) => {
                summary.already_converted += 1;
                logger
                    .warn(format!(
                        "{} appeared while converting {}, left as is",
                        target.path().display(),
                        name
                    ))
                    .await?;
            }
            (EncodeOutcome::Completed, ConversionDecision::ReconvertMismatch(_)) => {
                summary.reconverted += 1;
                logger.info(format!("Reconverted {}", name)).await?;
            }
            (EncodeOutcome::Completed, _) => {
                summary.converted += 1;
                logger.info(format!("Converted {}", name)).await?;
            }
        }

        Ok(())
    }

    fn check_cancelled(&self) -> WorkerResult<()> {
        match &self.cancel_rx {
            Some(rx) if *rx.borrow() => Err(WorkerError::Cancelled),
            _ => Ok(()),
        }
    }
}

/// Log conversion progress in 10% steps until the encoder drops its sender.
async fn report_progress(
    mut rx: watch::Receiver<ProgressEvent>,
    logger: WorkerLogger,
    name: String,
) -> WorkerResult<()> {
    let mut last_decile = 0u64;

    while rx.changed().await.is_ok() {
        let event = *rx.borrow_and_update();
        let Some(pct) = event.percentage() else {
            continue;
        };

        let decile = (pct / 10.0).floor() as u64;
        if decile > last_decile {
            last_decile = decile;
            logger
                .info(format!(
                    "Converting {}: {}% ({}/{} frames)",
                    name,
                    decile * 10,
                    event.frames_done,
                    event.total_frames.unwrap_or_default()
                ))
                .await?;
        }
    }

    Ok(())
}
