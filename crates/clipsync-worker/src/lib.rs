//! Library scan, conversion and upload pipeline.
//!
//! This crate provides:
//! - Pipeline configuration from the environment
//! - The shared run log: per-worker handles and the single aggregator
//! - Library scanning for source collections
//! - The upload worker and the orchestrator that drives a run

pub mod aggregator;
pub mod config;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod scanner;
pub mod upload_worker;

pub use aggregator::{LogAggregator, LogMessage};
pub use config::{EncoderConfig, LogConfig, PipelineConfig, ScanConfig};
pub use error::{WorkerError, WorkerResult};
pub use logging::WorkerLogger;
pub use orchestrator::{Orchestrator, RunSummary};
pub use scanner::{scan_library, Collection};
pub use upload_worker::{run_upload_worker, UploadJob};
