//! YouTube Data API session.
//!
//! A [`YoutubeConnector`] is cheap configuration that can be cloned into any
//! task. A [`YoutubeSession`] owns the HTTP connection pool and the bearer
//! token; each upload worker builds its own through
//! [`YoutubeConnector::connect`] and never hands it to another task.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clipsync_models::{PrivacyStatus, UploadMetadata};
use reqwest::{redirect, Client, StatusCode};
use tracing::{debug, info_span, Instrument};

use crate::credentials::AccessToken;
use crate::error::{YoutubeError, YoutubeResult};
use crate::metrics::record_request;
use crate::retry::{with_retry, RetryPolicy};
use crate::types::{error_message, SearchListResponse};

/// Default API host, for both search and upload endpoints.
pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";

/// Default upload chunk size (1 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

// =============================================================================
// Configuration
// =============================================================================

/// YouTube client configuration.
#[derive(Debug, Clone)]
pub struct YoutubeConfig {
    /// Base URL for Data API calls (search)
    pub api_base: String,
    /// Base URL for media uploads
    pub upload_base: String,
    /// JSON file holding the OAuth access token
    pub credentials_path: PathBuf,
    /// Per-request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Bytes sent per chunk PUT
    pub chunk_size: usize,
    /// Retry configuration
    pub retry: RetryPolicy,
    /// Description attached to every upload
    pub description: String,
    /// Category attached to every upload ("20" is Gaming)
    pub category_id: String,
    /// Visibility of new uploads
    pub privacy: PrivacyStatus,
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_BASE_URL.to_string(),
            upload_base: DEFAULT_BASE_URL.to_string(),
            credentials_path: PathBuf::from("token.json"),
            timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(10),
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry: RetryPolicy::default(),
            description: String::new(),
            category_id: "20".to_string(),
            privacy: PrivacyStatus::Private,
        }
    }
}

impl YoutubeConfig {
    /// Create config from environment variables.
    pub fn from_env() -> YoutubeResult<Self> {
        let defaults = Self::default();

        let timeout_secs: u64 = std::env::var("CLIPSYNC_YOUTUBE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.timeout.as_secs());

        let connect_timeout_secs: u64 = std::env::var("CLIPSYNC_YOUTUBE_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.connect_timeout.as_secs());

        let chunk_size: usize = std::env::var("CLIPSYNC_UPLOAD_CHUNK_BYTES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.chunk_size);

        if chunk_size == 0 {
            return Err(YoutubeError::config_error(
                "CLIPSYNC_UPLOAD_CHUNK_BYTES must be greater than zero",
            ));
        }

        let privacy = match std::env::var("CLIPSYNC_UPLOAD_PRIVACY") {
            Ok(value) => PrivacyStatus::parse(&value).ok_or_else(|| {
                YoutubeError::config_error(format!(
                    "CLIPSYNC_UPLOAD_PRIVACY must be private, unlisted or public (got {:?})",
                    value
                ))
            })?,
            Err(_) => defaults.privacy,
        };

        Ok(Self {
            api_base: std::env::var("CLIPSYNC_YOUTUBE_API_BASE").unwrap_or(defaults.api_base),
            upload_base: std::env::var("CLIPSYNC_YOUTUBE_UPLOAD_BASE")
                .unwrap_or(defaults.upload_base),
            credentials_path: std::env::var("CLIPSYNC_YOUTUBE_CREDENTIALS")
                .map(PathBuf::from)
                .unwrap_or(defaults.credentials_path),
            timeout: Duration::from_secs(timeout_secs),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            chunk_size,
            retry: RetryPolicy::from_env(),
            description: std::env::var("CLIPSYNC_UPLOAD_DESCRIPTION")
                .unwrap_or(defaults.description),
            category_id: std::env::var("CLIPSYNC_UPLOAD_CATEGORY")
                .unwrap_or(defaults.category_id),
            privacy,
        })
    }

    /// Upload metadata for a video with the given title.
    pub fn metadata_for(&self, title: &str) -> UploadMetadata {
        UploadMetadata {
            title: title.to_string(),
            description: self.description.clone(),
            category_id: self.category_id.clone(),
            privacy: self.privacy,
        }
    }
}

// =============================================================================
// Connector
// =============================================================================

/// Factory for authenticated sessions.
#[derive(Debug, Clone)]
pub struct YoutubeConnector {
    config: YoutubeConfig,
}

impl YoutubeConnector {
    pub fn new(config: YoutubeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &YoutubeConfig {
        &self.config
    }

    /// Open a fresh session from the stored credentials.
    pub async fn connect(&self) -> YoutubeResult<YoutubeSession> {
        let token = AccessToken::load(&self.config.credentials_path).await?;
        self.session_with_token(token)
    }

    /// Open a fresh session with an explicit token.
    pub fn session_with_token(&self, token: AccessToken) -> YoutubeResult<YoutubeSession> {
        let http = Client::builder()
            .timeout(self.config.timeout)
            .connect_timeout(self.config.connect_timeout)
            .redirect(redirect::Policy::none())
            .user_agent(concat!("clipsync-youtube/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(YoutubeError::Network)?;

        Ok(YoutubeSession {
            http,
            config: self.config.clone(),
            token,
        })
    }
}

// =============================================================================
// Session
// =============================================================================

/// Authenticated YouTube session owned by a single worker.
pub struct YoutubeSession {
    pub(crate) http: Client,
    pub(crate) config: YoutubeConfig,
    pub(crate) token: AccessToken,
}

impl std::fmt::Debug for YoutubeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YoutubeSession")
            .field("api_base", &self.config.api_base)
            .field("upload_base", &self.config.upload_base)
            .finish_non_exhaustive()
    }
}

impl YoutubeSession {
    pub fn config(&self) -> &YoutubeConfig {
        &self.config
    }

    /// Number of the caller's own videos matching `title`.
    pub async fn count_by_title(&self, title: &str) -> YoutubeResult<u64> {
        let url = format!("{}/youtube/v3/search", self.config.api_base);
        let url = url.as_str();
        let http = &self.http;
        let token = self.token.as_str();

        with_retry(&self.config.retry, "search", move || async move {
            let start = Instant::now();
            let response = http
                .get(url)
                .bearer_auth(token)
                .query(&[
                    ("part", "snippet"),
                    ("forMine", "true"),
                    ("maxResults", "1"),
                    ("type", "video"),
                    ("q", title),
                ])
                .send()
                .await?;

            let status = response.status();
            record_request("search", status.as_u16(), start.elapsed().as_secs_f64() * 1000.0);

            if status != StatusCode::OK {
                let body = response.text().await.unwrap_or_default();
                return Err(YoutubeError::from_http_status(
                    status.as_u16(),
                    error_message(&body),
                ));
            }

            let result: SearchListResponse = response.json().await.map_err(|e| {
                YoutubeError::invalid_response(format!("unreadable search response: {}", e))
            })?;
            Ok(result.page_info.total_results)
        })
        .instrument(info_span!("youtube_search", title = %title))
        .await
        .inspect(|total| debug!("search for {:?} matched {} videos", title, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = YoutubeConfig::default();
        assert_eq!(config.chunk_size, 1024 * 1024);
        assert_eq!(config.category_id, "20");
        assert_eq!(config.privacy, PrivacyStatus::Private);
        assert_eq!(config.retry.max_retries, 10);
    }

    #[test]
    fn test_metadata_for() {
        let config = YoutubeConfig {
            description: "Icon & outro".to_string(),
            ..Default::default()
        };
        let metadata = config.metadata_for("Boss fight");
        assert_eq!(metadata.title, "Boss fight");
        assert_eq!(metadata.description, "Icon & outro");
        assert_eq!(metadata.category_id, "20");
    }

    #[tokio::test]
    async fn test_connect_without_credentials() {
        let connector = YoutubeConnector::new(YoutubeConfig {
            credentials_path: PathBuf::from("/nonexistent/token.json"),
            ..Default::default()
        });
        let err = connector.connect().await.unwrap_err();
        assert!(err.is_config());
    }
}
