//! Per-candidate decisions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why an existing conversion target is considered stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum StaleReason {
    /// Target is at or below the stale size floor
    BelowSizeFloor { bytes: u64 },
    /// Target frame count differs from the source
    FrameMismatch { source: u64, target: u64 },
    /// Target could not be probed (corrupt or partial)
    Unreadable,
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::BelowSizeFloor { bytes } => write!(f, "target is only {} bytes", bytes),
            StaleReason::FrameMismatch { source, target } => {
                write!(f, "target has {} frames, source has {}", target, source)
            }
            StaleReason::Unreadable => write!(f, "target could not be probed"),
        }
    }
}

/// Outcome of the conversion decision for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionDecision {
    /// Extension is not in the container whitelist
    SkipWrongContainer,
    /// Target exists with a matching frame count
    SkipAlreadyConverted,
    /// Target exists but is stale; it must be deleted before re-encoding
    ReconvertMismatch(StaleReason),
    /// Target does not exist
    Convert,
}

impl ConversionDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionDecision::SkipWrongContainer => "skip_wrong_container",
            ConversionDecision::SkipAlreadyConverted => "skip_already_converted",
            ConversionDecision::ReconvertMismatch(_) => "reconvert_mismatch",
            ConversionDecision::Convert => "convert",
        }
    }

    /// Whether the encoder must run for this candidate.
    pub fn needs_encode(&self) -> bool {
        matches!(
            self,
            ConversionDecision::Convert | ConversionDecision::ReconvertMismatch(_)
        )
    }
}

/// Outcome of the upload decision for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadDecision {
    /// Filename lacks the upload marker
    NotEligible,
    /// A remote asset with the derived title already exists
    AlreadyOnRemote,
    /// Upload the candidate
    Upload,
}

impl UploadDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadDecision::NotEligible => "not_eligible",
            UploadDecision::AlreadyOnRemote => "already_on_remote",
            UploadDecision::Upload => "upload",
        }
    }
}
