//! Wire types for the YouTube Data API v3.

use clipsync_models::UploadMetadata;
use serde::{Deserialize, Serialize};

/// Body of the resumable upload initiation request.
#[derive(Debug, Clone, Serialize)]
pub struct VideoInsertRequest {
    pub snippet: VideoSnippet,
    pub status: VideoStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSnippet {
    pub title: String,
    pub description: String,
    pub category_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStatus {
    pub privacy_status: String,
}

impl From<&UploadMetadata> for VideoInsertRequest {
    fn from(metadata: &UploadMetadata) -> Self {
        Self {
            snippet: VideoSnippet {
                title: metadata.title.clone(),
                description: metadata.description.clone(),
                category_id: metadata.category_id.clone(),
            },
            status: VideoStatus {
                privacy_status: metadata.privacy.as_str().to_string(),
            },
        }
    }
}

/// Terminal upload response. Only the identifier matters here.
#[derive(Debug, Clone, Deserialize)]
pub struct VideoResource {
    #[serde(default)]
    pub id: Option<String>,
}

/// `search.list` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchListResponse {
    pub page_info: PageInfo,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub total_results: u64,
}

/// Google API error envelope, used to enrich error messages.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
}

/// Extract a readable message from an error body, falling back to the raw text.
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorResponse>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string())
}
