#![deny(unreachable_patterns)]
//! FFmpeg/FFprobe CLI adapters for the conversion side of the pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with a fixed quality preset
//! - A pure parser for FFmpeg's `-progress` stream
//! - An encoder runner with cancellation and partial-output cleanup
//! - Frame counting via FFprobe
//! - The per-candidate conversion decision

pub mod command;
pub mod decision;
pub mod error;
pub mod probe;
pub mod progress;

pub use command::{Encoder, EncodeOutcome, FfmpegCommand, Toolchain};
pub use decision::{ConversionPlanner, FrameProbe, LocalStore, TargetStore};
pub use error::{MediaError, MediaResult};
pub use probe::Prober;
pub use progress::{EncoderSignal, ProgressEvent, ProgressParser};
