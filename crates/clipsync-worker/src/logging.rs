//! Per-worker logging handles.
//!
//! Every record goes to the console through `tracing` and onto the shared
//! aggregator channel, so the run log sees all workers in receipt order.

use clipsync_models::{LogRecord, Severity, WorkerId};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn, Span};

use crate::aggregator::LogMessage;
use crate::error::{WorkerError, WorkerResult};

/// Logging handle owned by one worker.
///
/// Cheap to clone; all clones share the aggregator channel.
#[derive(Debug, Clone)]
pub struct WorkerLogger {
    worker: WorkerId,
    tx: mpsc::Sender<LogMessage>,
}

impl WorkerLogger {
    /// Create a logger for a new worker with the given role.
    pub fn new(role: &str, tx: mpsc::Sender<LogMessage>) -> Self {
        Self {
            worker: WorkerId::new(role),
            tx,
        }
    }

    /// Handle for another worker sharing the same channel.
    pub fn for_worker(&self, role: &str) -> Self {
        Self::new(role, self.tx.clone())
    }

    pub fn worker(&self) -> &WorkerId {
        &self.worker
    }

    /// Emit a record. Waits while the channel is full.
    pub async fn log(&self, severity: Severity, message: impl Into<String>) -> WorkerResult<()> {
        let message = message.into();

        match severity {
            Severity::Debug => debug!(worker = %self.worker, "{}", message),
            Severity::Info => info!(worker = %self.worker, "{}", message),
            Severity::Warn => warn!(worker = %self.worker, "{}", message),
            Severity::Error => error!(worker = %self.worker, "{}", message),
        }

        let record = LogRecord::new(self.worker.clone(), severity, message);
        self.tx
            .send(LogMessage::Record(record))
            .await
            .map_err(|_| WorkerError::LogChannelClosed)
    }

    pub async fn debug(&self, message: impl Into<String>) -> WorkerResult<()> {
        self.log(Severity::Debug, message).await
    }

    pub async fn info(&self, message: impl Into<String>) -> WorkerResult<()> {
        self.log(Severity::Info, message).await
    }

    pub async fn warn(&self, message: impl Into<String>) -> WorkerResult<()> {
        self.log(Severity::Warn, message).await
    }

    pub async fn error(&self, message: impl Into<String>) -> WorkerResult<()> {
        self.log(Severity::Error, message).await
    }

    /// Ask the aggregator to finish once everything before this is written.
    pub async fn shutdown(&self) -> WorkerResult<()> {
        self.tx
            .send(LogMessage::Shutdown)
            .await
            .map_err(|_| WorkerError::LogChannelClosed)
    }

    /// Create a tracing span for this worker.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("worker", worker = %self.worker)
    }
}
