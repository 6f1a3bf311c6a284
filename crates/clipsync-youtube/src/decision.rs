//! Upload decision for a single candidate.

use async_trait::async_trait;
use clipsync_models::{Candidate, UploadDecision};
use tracing::debug;

use crate::client::YoutubeSession;
use crate::error::YoutubeResult;

/// Lookup of the caller's own videos by title.
#[async_trait]
pub trait VideoSearch: Send + Sync {
    /// Number of existing videos whose title matches `title`.
    async fn count_by_title(&self, title: &str) -> YoutubeResult<u64>;
}

#[async_trait]
impl VideoSearch for YoutubeSession {
    async fn count_by_title(&self, title: &str) -> YoutubeResult<u64> {
        YoutubeSession::count_by_title(self, title).await
    }
}

/// Decide whether `candidate` should be uploaded.
///
/// Untagged candidates never reach the remote service. The check is a
/// point-in-time search, so an upload racing from elsewhere goes unnoticed.
pub async fn plan_upload<S>(candidate: &Candidate, search: &S) -> YoutubeResult<UploadDecision>
where
    S: VideoSearch + ?Sized,
{
    if !candidate.is_upload_tagged() || candidate.title().is_empty() {
        return Ok(UploadDecision::NotEligible);
    }

    let matches = search.count_by_title(candidate.title()).await?;
    debug!(
        "{:?} has {} existing remote match(es)",
        candidate.title(),
        matches
    );

    if matches > 0 {
        Ok(UploadDecision::AlreadyOnRemote)
    } else {
        Ok(UploadDecision::Upload)
    }
}
