//! Single consumer of the shared log channel.
//!
//! The aggregator is the only writer of the run log. It writes records in
//! the order it receives them and stops on [`LogMessage::Shutdown`], when
//! every sender is gone, or when cancellation is signalled. On cancellation
//! it writes whatever is already buffered without waiting for more.

use std::path::Path;

use chrono::Local;
use clipsync_media::command::wait_cancelled;
use clipsync_models::LogRecord;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::error::{WorkerError, WorkerResult};

/// Timestamp layout of the run log, e.g. `06-Feb-23 00:54:28`.
pub const TIMESTAMP_FORMAT: &str = "%d-%b-%y %H:%M:%S";

/// Message on the log channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogMessage {
    Record(LogRecord),
    /// Normal end of the run
    Shutdown,
}

/// Create the bounded log channel.
pub fn channel(capacity: usize) -> (mpsc::Sender<LogMessage>, mpsc::Receiver<LogMessage>) {
    mpsc::channel(capacity.max(1))
}

/// Render one record as a run-log line (without the newline).
pub fn format_record(record: &LogRecord) -> String {
    format!(
        "{} {} [{}] {}",
        record.timestamp.with_timezone(&Local).format(TIMESTAMP_FORMAT),
        record.severity.as_str(),
        record.worker,
        record.message
    )
}

/// Open the run log file.
pub async fn open_log_file(path: &Path, append: bool) -> WorkerResult<tokio::fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)
        .await
        .map_err(|e| {
            WorkerError::config_error(format!("cannot open log file {}: {}", path.display(), e))
        })?;
    Ok(file)
}

/// Drains the log channel into a sink.
pub struct LogAggregator<W> {
    rx: mpsc::Receiver<LogMessage>,
    sink: W,
    cancel_rx: Option<watch::Receiver<bool>>,
    written: u64,
}

impl<W> LogAggregator<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(rx: mpsc::Receiver<LogMessage>, sink: W) -> Self {
        Self {
            rx,
            sink,
            cancel_rx: None,
            written: 0,
        }
    }

    /// Set cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Consume records until shutdown and hand the sink back.
    ///
    /// A failing sink is fatal: the run log is the only audit trail.
    pub async fn run(mut self) -> WorkerResult<W> {
        loop {
            // `None` means cancellation was signalled.
            let next = tokio::select! {
                biased;
                _ = wait_cancelled(self.cancel_rx.as_mut()) => None,
                message = self.rx.recv() => Some(message),
            };

            match next {
                Some(Some(LogMessage::Record(record))) => self.write(&record).await?,
                Some(Some(LogMessage::Shutdown)) | Some(None) => break,
                None => {
                    self.drain_buffered().await?;
                    break;
                }
            }
        }

        self.sink.flush().await?;
        debug!("Log aggregator wrote {} records", self.written);
        Ok(self.sink)
    }

    /// Write everything already queued without waiting for new records.
    async fn drain_buffered(&mut self) -> WorkerResult<()> {
        while let Ok(message) = self.rx.try_recv() {
            match message {
                LogMessage::Record(record) => self.write(&record).await?,
                LogMessage::Shutdown => break,
            }
        }
        self.rx.close();
        Ok(())
    }

    async fn write(&mut self, record: &LogRecord) -> WorkerResult<()> {
        let mut line = format_record(record);
        line.push('\n');
        self.sink.write_all(line.as_bytes()).await?;
        self.written += 1;
        Ok(())
    }
}
