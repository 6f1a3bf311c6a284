//! Remote video metadata.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier assigned by the remote service to an uploaded video.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(pub String);

impl VideoId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Visibility of an uploaded video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyStatus {
    #[default]
    Private,
    Unlisted,
    Public,
}

impl PrivacyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrivacyStatus::Private => "private",
            PrivacyStatus::Unlisted => "unlisted",
            PrivacyStatus::Public => "public",
        }
    }

    /// Parse a privacy value, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "private" => Some(PrivacyStatus::Private),
            "unlisted" => Some(PrivacyStatus::Unlisted),
            "public" => Some(PrivacyStatus::Public),
            _ => None,
        }
    }
}

/// Metadata sent alongside an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadMetadata {
    pub title: String,
    pub description: String,
    pub category_id: String,
    pub privacy: PrivacyStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privacy_parse() {
        assert_eq!(PrivacyStatus::parse("Private"), Some(PrivacyStatus::Private));
        assert_eq!(PrivacyStatus::parse("PUBLIC"), Some(PrivacyStatus::Public));
        assert_eq!(PrivacyStatus::parse("secret"), None);
    }
}
