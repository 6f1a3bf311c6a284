//! Records exchanged between workers and the log aggregator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of the worker that produced a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub String);

impl WorkerId {
    /// Create a worker identity with a short random suffix, e.g. `upload-1a2b3c4d`.
    pub fn new(role: &str) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("{}-{}", role, &suffix[..8]))
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Record severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARNING",
            Severity::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structured log entry.
///
/// Ownership moves to the aggregator once enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub worker: WorkerId,
    pub severity: Severity,
    pub message: String,
}

impl LogRecord {
    /// Create a record stamped with the current time.
    pub fn new(worker: WorkerId, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            worker,
            severity,
            message: message.into(),
        }
    }
}
