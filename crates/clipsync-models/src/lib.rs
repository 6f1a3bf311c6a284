//! Shared data models for the ClipSync pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Candidates discovered in a library scan and their conversion targets
//! - Conversion and upload decisions
//! - The fixed encoding preset
//! - Log records exchanged between workers and the log aggregator
//! - Upload metadata sent to the remote video service

pub mod candidate;
pub mod decision;
pub mod encoding;
pub mod log_record;
pub mod video;

// Re-export common types
pub use candidate::{derive_title, Candidate, ConversionTarget};
pub use decision::{ConversionDecision, StaleReason, UploadDecision};
pub use encoding::EncodingConfig;
pub use log_record::{LogRecord, Severity, WorkerId};
pub use video::{PrivacyStatus, UploadMetadata, VideoId};
