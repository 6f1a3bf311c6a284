//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Log channel closed")]
    LogChannelClosed,

    #[error("Scan failed: {0}")]
    ScanFailed(String),

    #[error("Task failed: {0}")]
    TaskFailed(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Media error: {0}")]
    Media(#[from] clipsync_media::MediaError),

    #[error("YouTube error: {0}")]
    Youtube(#[from] clipsync_youtube::YoutubeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn scan_failed(msg: impl Into<String>) -> Self {
        Self::ScanFailed(msg.into())
    }

    pub fn task_failed(msg: impl Into<String>) -> Self {
        Self::TaskFailed(msg.into())
    }

    /// Check if the run was interrupted.
    pub fn is_cancelled(&self) -> bool {
        match self {
            WorkerError::Cancelled => true,
            WorkerError::Media(e) => e.is_cancelled(),
            WorkerError::Youtube(clipsync_youtube::YoutubeError::Cancelled) => true,
            _ => false,
        }
    }

    /// Check if this error must abort the whole run rather than one candidate.
    ///
    /// Missing binaries, missing credentials, a dead log channel and
    /// cancellation all qualify; everything else is reported per file.
    pub fn is_fatal(&self) -> bool {
        if self.is_cancelled() {
            return true;
        }
        match self {
            WorkerError::ConfigError(_)
            | WorkerError::LogChannelClosed
            | WorkerError::ScanFailed(_)
            | WorkerError::TaskFailed(_) => true,
            WorkerError::Media(e) => e.is_fatal(),
            WorkerError::Youtube(e) => e.is_config(),
            _ => false,
        }
    }

    /// Process exit code for a failed run.
    pub fn exit_code(&self) -> i32 {
        if self.is_cancelled() {
            130
        } else {
            1
        }
    }
}
