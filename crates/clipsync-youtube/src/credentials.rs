//! Stored OAuth credentials.
//!
//! Acquiring and refreshing tokens happens outside this crate; we only read
//! the access token an external tool left on disk.

use serde::Deserialize;
use std::fmt;
use std::path::Path;

use crate::error::{YoutubeError, YoutubeResult};

#[derive(Deserialize)]
struct StoredCredentials {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    token: Option<String>,
}

/// Bearer token for the YouTube Data API.
#[derive(Clone)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Load the token from a JSON credentials file.
    ///
    /// Accepts either `access_token` or `token` as the field name.
    pub async fn load(path: &Path) -> YoutubeResult<Self> {
        let raw = tokio::fs::read(path).await.map_err(|e| {
            YoutubeError::config_error(format!(
                "cannot read credentials file {}: {}",
                path.display(),
                e
            ))
        })?;

        let stored: StoredCredentials = serde_json::from_slice(&raw).map_err(|e| {
            YoutubeError::config_error(format!(
                "malformed credentials file {}: {}",
                path.display(),
                e
            ))
        })?;

        let token = stored
            .access_token
            .or(stored.token)
            .map(|t| t.trim().to_string())
            .unwrap_or_default();

        if token.is_empty() {
            return Err(YoutubeError::auth_error(format!(
                "no access token in {}",
                path.display()
            )));
        }

        Ok(Self(token))
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken([REDACTED])")
    }
}
