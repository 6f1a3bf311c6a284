//! YouTube Data API client.
//!
//! This crate provides:
//! - Per-worker authenticated sessions built from stored OAuth credentials
//! - Title search scoped to the caller's own videos
//! - Chunked resumable uploads with retry and full-jitter backoff
//! - The per-candidate upload decision

pub mod client;
pub mod credentials;
pub mod decision;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod types;
pub mod upload;


pub use client::{YoutubeConfig, YoutubeConnector, YoutubeSession};
pub use credentials::AccessToken;
pub use decision::{plan_upload, VideoSearch};
pub use error::{YoutubeError, YoutubeResult};
pub use retry::RetryPolicy;
pub use upload::{NoopObserver, UploadObserver, UploadSession, UploadState};
