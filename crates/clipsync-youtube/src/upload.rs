//! Chunked resumable uploads.
//!
//! The transfer follows the resumable upload protocol: one POST opens an
//! upload session, then the file goes up in fixed-size PUTs. A `308` reply
//! reports how many bytes the server holds so far; a `200`/`201` reply
//! carries the new video resource. After a transient failure the next
//! attempt asks the server for its offset before sending more data.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use clipsync_models::{UploadMetadata, VideoId};
use reqwest::header::{CONTENT_RANGE, CONTENT_TYPE, LOCATION, RANGE};
use reqwest::{Response, StatusCode};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{info, info_span, warn, Instrument};

use crate::client::YoutubeSession;
use crate::error::{YoutubeError, YoutubeResult};
use crate::metrics::{record_request, record_retry, record_upload, record_upload_bytes};
use crate::types::{error_message, VideoInsertRequest, VideoResource};

/// Lifecycle of one upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    Transferring,
    Retrying,
    Completed,
    Failed,
}

impl UploadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadState::Idle => "idle",
            UploadState::Transferring => "transferring",
            UploadState::Retrying => "retrying",
            UploadState::Completed => "completed",
            UploadState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadState::Completed | UploadState::Failed)
    }
}

/// Side channel for upload progress. Never affects the transfer itself.
#[async_trait]
pub trait UploadObserver: Send + Sync {
    /// Called whenever the acknowledged byte count grows.
    async fn on_progress(&self, _acked: u64, _total: u64) {}

    /// Called before sleeping for retry number `retry`.
    async fn on_retry(&self, _retry: u32, _bound: Duration, _delay: Duration, _error: &YoutubeError) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

#[async_trait]
impl UploadObserver for NoopObserver {}

/// Mutable transfer state for one in-flight upload.
#[derive(Debug)]
pub struct UploadSession {
    path: PathBuf,
    file_size: u64,
    bytes_acked: u64,
    retries: u32,
    last_error: Option<String>,
    state: UploadState,
}

impl UploadSession {
    /// Prepare an upload of `path`. Empty files are rejected.
    pub async fn open(path: &Path) -> YoutubeResult<Self> {
        let file_size = tokio::fs::metadata(path).await?.len();
        if file_size == 0 {
            return Err(YoutubeError::EmptyFile(path.to_path_buf()));
        }

        Ok(Self {
            path: path.to_path_buf(),
            file_size,
            bytes_acked: 0,
            retries: 0,
            last_error: None,
            state: UploadState::Idle,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn bytes_acked(&self) -> u64 {
        self.bytes_acked
    }

    /// Retries performed so far. Progress between failures does not reset it.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    fn fail(&mut self, error: &YoutubeError) {
        self.state = UploadState::Failed;
        self.last_error = Some(error.to_string());
        record_upload("failed");
    }

    async fn acknowledge(&mut self, acked: u64, observer: &dyn UploadObserver) {
        if acked > self.bytes_acked {
            record_upload_bytes(acked - self.bytes_acked);
            self.bytes_acked = acked;
            observer.on_progress(acked, self.file_size).await;
        }
    }

    /// Adopt the offset a status query reported, even when it is behind
    /// what earlier replies acknowledged.
    async fn resync(&mut self, acked: u64, observer: &dyn UploadObserver) {
        if acked < self.bytes_acked {
            warn!(
                "Server holds {} bytes, {} were acknowledged before; resending from {}",
                acked, self.bytes_acked, acked
            );
            self.bytes_acked = acked;
        } else {
            self.acknowledge(acked, observer).await;
        }
    }
}

/// Server reply to a chunk PUT or status query.
#[derive(Debug)]
enum ChunkReply {
    Incomplete(u64),
    Complete(VideoId),
}

/// Where the transfer currently stands across attempts.
struct Transfer {
    session_uri: Option<String>,
    needs_status: bool,
}

impl YoutubeSession {
    /// Upload `path` with `metadata`, returning the new video's identifier.
    pub async fn upload(
        &self,
        path: &Path,
        metadata: &UploadMetadata,
        observer: &dyn UploadObserver,
    ) -> YoutubeResult<VideoId> {
        let mut session = UploadSession::open(path).await?;
        let span = info_span!("youtube_upload", path = %path.display(), size = session.file_size);
        self.run_upload(&mut session, metadata, observer)
            .instrument(span)
            .await
    }

    /// Drive `session` to a terminal state.
    pub async fn run_upload(
        &self,
        session: &mut UploadSession,
        metadata: &UploadMetadata,
        observer: &dyn UploadObserver,
    ) -> YoutubeResult<VideoId> {
        let policy = self.config.retry;
        let mut file = tokio::fs::File::open(&session.path).await?;
        let mut transfer = Transfer {
            session_uri: None,
            needs_status: false,
        };
        record_upload("started");
        session.state = UploadState::Transferring;

        loop {
            match self
                .attempt(session, &mut transfer, &mut file, metadata, observer)
                .await
            {
                Ok(id) => {
                    session.state = UploadState::Completed;
                    record_upload("completed");
                    info!("Upload complete: video id {}", id);
                    return Ok(id);
                }
                Err(e) if e.is_retryable() => {
                    let retry = match policy.next_retry(session.retries, &e) {
                        Ok(retry) => retry,
                        Err(exhausted) => {
                            session.fail(&exhausted);
                            return Err(exhausted);
                        }
                    };

                    let bound = policy.delay_bound(retry);
                    let delay = policy.jittered_delay(retry);

                    session.retries = retry;
                    session.last_error = Some(e.to_string());
                    session.state = UploadState::Retrying;
                    transfer.needs_status = transfer.session_uri.is_some();

                    record_retry("upload");
                    observer.on_retry(retry, bound, delay, &e).await;
                    tokio::time::sleep(delay).await;

                    session.state = UploadState::Transferring;
                }
                Err(e) => {
                    session.fail(&e);
                    return Err(e);
                }
            }
        }
    }

    /// One attempt: open the upload session if needed, resync the offset
    /// after a failure, then send chunks until a terminal reply.
    async fn attempt(
        &self,
        session: &mut UploadSession,
        transfer: &mut Transfer,
        file: &mut tokio::fs::File,
        metadata: &UploadMetadata,
        observer: &dyn UploadObserver,
    ) -> YoutubeResult<VideoId> {
        let uri = match &transfer.session_uri {
            Some(uri) => uri.clone(),
            None => {
                let uri = self.initiate(session, metadata).await?;
                transfer.session_uri = Some(uri.clone());
                uri
            }
        };

        if transfer.needs_status {
            match self.query_status(&uri, session.file_size).await? {
                ChunkReply::Complete(id) => {
                    session.acknowledge(session.file_size, observer).await;
                    return Ok(id);
                }
                ChunkReply::Incomplete(acked) => session.resync(acked, observer).await,
            }
            transfer.needs_status = false;
        }

        let chunk_size = self.config.chunk_size as u64;
        loop {
            let start = session.bytes_acked;
            let end = (start + chunk_size).min(session.file_size);

            let mut chunk = vec![0u8; (end - start) as usize];
            file.seek(SeekFrom::Start(start)).await?;
            file.read_exact(&mut chunk).await?;

            let range = format!("bytes {}-{}/{}", start, end - 1, session.file_size);
            match self.put_chunk(&uri, chunk, range).await? {
                ChunkReply::Complete(id) => {
                    session.acknowledge(session.file_size, observer).await;
                    return Ok(id);
                }
                ChunkReply::Incomplete(acked) if acked > start => {
                    session.acknowledge(acked, observer).await;
                }
                ChunkReply::Incomplete(_) => return Err(YoutubeError::Stalled(start)),
            }
        }
    }

    /// Open a resumable upload session and return its URI.
    async fn initiate(&self, session: &UploadSession, metadata: &UploadMetadata) -> YoutubeResult<String> {
        let url = format!("{}/upload/youtube/v3/videos", self.config.upload_base);
        let start = Instant::now();

        let response = self
            .http
            .post(&url)
            .bearer_auth(self.token.as_str())
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .header("X-Upload-Content-Length", session.file_size.to_string())
            .header("X-Upload-Content-Type", content_type_for(&session.path))
            .json(&VideoInsertRequest::from(metadata))
            .send()
            .await?;

        let status = response.status();
        record_request("upload_initiate", status.as_u16(), start.elapsed().as_secs_f64() * 1000.0);

        if !status.is_success() {
            return Err(error_from_response(response).await);
        }

        response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| YoutubeError::invalid_response("upload session response has no Location"))
    }

    async fn put_chunk(&self, uri: &str, chunk: Vec<u8>, range: String) -> YoutubeResult<ChunkReply> {
        let start = Instant::now();
        let response = self
            .http
            .put(uri)
            .bearer_auth(self.token.as_str())
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_RANGE, range)
            .body(chunk)
            .send()
            .await?;

        record_request("upload_chunk", response.status().as_u16(), start.elapsed().as_secs_f64() * 1000.0);
        chunk_reply(response).await
    }

    async fn query_status(&self, uri: &str, total: u64) -> YoutubeResult<ChunkReply> {
        let start = Instant::now();
        let response = self
            .http
            .put(uri)
            .bearer_auth(self.token.as_str())
            .header(CONTENT_RANGE, format!("bytes */{}", total))
            .body(Vec::new())
            .send()
            .await?;

        record_request("upload_status", response.status().as_u16(), start.elapsed().as_secs_f64() * 1000.0);
        chunk_reply(response).await
    }
}

async fn chunk_reply(response: Response) -> YoutubeResult<ChunkReply> {
    match response.status() {
        StatusCode::PERMANENT_REDIRECT => {
            let acked = match response.headers().get(RANGE) {
                Some(value) => {
                    let value = value.to_str().map_err(|_| {
                        YoutubeError::invalid_response("Range header is not valid text")
                    })?;
                    parse_range_header(value).ok_or_else(|| {
                        YoutubeError::invalid_response(format!("malformed Range header {:?}", value))
                    })?
                }
                None => 0,
            };
            Ok(ChunkReply::Incomplete(acked))
        }
        StatusCode::OK | StatusCode::CREATED => {
            let resource: VideoResource = response.json().await.map_err(|e| {
                YoutubeError::invalid_response(format!("unreadable upload response: {}", e))
            })?;
            match resource.id.filter(|id| !id.is_empty()) {
                Some(id) => Ok(ChunkReply::Complete(VideoId(id))),
                None => Err(YoutubeError::invalid_response(
                    "upload finished without a video id",
                )),
            }
        }
        _ => Err(error_from_response(response).await),
    }
}

async fn error_from_response(response: Response) -> YoutubeError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    YoutubeError::from_http_status(status, error_message(&body))
}

/// Bytes acknowledged according to a `Range: bytes=0-<n>` header.
fn parse_range_header(value: &str) -> Option<u64> {
    let (first, last) = value.trim().strip_prefix("bytes=")?.split_once('-')?;
    if first.trim() != "0" {
        return None;
    }
    last.trim().parse::<u64>().ok().map(|n| n + 1)
}

fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("mp4") => "video/mp4",
        Some("mkv") => "video/x-matroska",
        Some("webm") => "video/webm",
        Some("mov") => "video/quicktime",
        _ => "application/octet-stream",
    }
}
