//! Conversion decision for one candidate.
//!
//! The planner compares a candidate against its conversion target:
//! wrong containers are skipped without touching the filesystem, a missing
//! target is converted, and an existing target is kept only when its frame
//! count matches the source. A target that exists with a matching frame count
//! is never overwritten.

use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, info};

use clipsync_models::{Candidate, ConversionDecision, ConversionTarget, StaleReason};

use crate::error::{MediaError, MediaResult};

/// Something that can count the frames of a media file.
#[async_trait]
pub trait FrameProbe: Send + Sync {
    async fn frame_count(&self, path: &Path) -> MediaResult<u64>;
}

/// Filesystem view of conversion targets.
pub trait TargetStore: Send + Sync {
    /// Size of the file at `path`, or `None` when it does not exist.
    fn size(&self, path: &Path) -> std::io::Result<Option<u64>>;

    /// Delete the file at `path`.
    fn remove(&self, path: &Path) -> std::io::Result<()>;
}

/// [`TargetStore`] over the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStore;

impl TargetStore for LocalStore {
    fn size(&self, path: &Path) -> std::io::Result<Option<u64>> {
        match std::fs::metadata(path) {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn remove(&self, path: &Path) -> std::io::Result<()> {
        std::fs::remove_file(path)
    }
}

/// Decides whether a candidate needs (re)conversion.
#[derive(Debug, Clone)]
pub struct ConversionPlanner<P, S = LocalStore> {
    probe: P,
    store: S,
    /// Accepted source containers, compared case-insensitively
    whitelist: Vec<String>,
    /// Targets at or below this size are stale without probing
    stale_floor_bytes: u64,
}

impl<P: FrameProbe> ConversionPlanner<P, LocalStore> {
    pub fn new(probe: P, whitelist: Vec<String>, stale_floor_bytes: u64) -> Self {
        Self::with_store(probe, LocalStore, whitelist, stale_floor_bytes)
    }
}

impl<P: FrameProbe, S: TargetStore> ConversionPlanner<P, S> {
    pub fn with_store(probe: P, store: S, whitelist: Vec<String>, stale_floor_bytes: u64) -> Self {
        Self {
            probe,
            store,
            whitelist,
            stale_floor_bytes,
        }
    }

    /// Frame count of the candidate's source, for progress reporting.
    pub async fn source_frames(&self, candidate: &Candidate) -> MediaResult<u64> {
        self.probe.frame_count(candidate.path()).await
    }

    /// Decide what to do with `candidate`. Performs no filesystem mutation.
    ///
    /// Errors from probing the source are returned so the caller can report
    /// the candidate; an unreadable target is treated as stale instead.
    pub async fn decide(
        &self,
        candidate: &Candidate,
        target: &ConversionTarget,
    ) -> MediaResult<ConversionDecision> {
        if !candidate.has_container(&self.whitelist) {
            return Ok(ConversionDecision::SkipWrongContainer);
        }

        let size = match self.store.size(target.path())? {
            Some(size) => size,
            None => return Ok(ConversionDecision::Convert),
        };

        if size <= self.stale_floor_bytes {
            return Ok(ConversionDecision::ReconvertMismatch(
                StaleReason::BelowSizeFloor { bytes: size },
            ));
        }

        let source = self.probe.frame_count(candidate.path()).await?;
        if source == 0 {
            return Err(MediaError::MissingFrameCount(candidate.path().to_path_buf()));
        }

        let target_frames = match self.probe.frame_count(target.path()).await {
            Ok(frames) => frames,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                debug!("Target {} unreadable: {}", target.path().display(), e);
                return Ok(ConversionDecision::ReconvertMismatch(StaleReason::Unreadable));
            }
        };

        if target_frames == source {
            Ok(ConversionDecision::SkipAlreadyConverted)
        } else {
            Ok(ConversionDecision::ReconvertMismatch(
                StaleReason::FrameMismatch {
                    source,
                    target: target_frames,
                },
            ))
        }
    }

    /// Delete a stale target ahead of re-encoding.
    ///
    /// Does nothing unless `decision` is a reconvert.
    pub fn discard_stale(
        &self,
        decision: &ConversionDecision,
        target: &ConversionTarget,
    ) -> MediaResult<()> {
        if let ConversionDecision::ReconvertMismatch(reason) = decision {
            self.store.remove(target.path())?;
            info!("Removed {} ({})", target.path().display(), reason);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    const MARKER: &str = "ytupload";
    const FLOOR: u64 = 1_048_576;

    #[derive(Default, Clone)]
    struct FakeProbe {
        frames: HashMap<PathBuf, u64>,
        calls: Arc<AtomicUsize>,
    }

    impl FakeProbe {
        fn with(mut self, path: &str, frames: u64) -> Self {
            self.frames.insert(PathBuf::from(path), frames);
            self
        }
    }

    #[async_trait]
    impl FrameProbe for FakeProbe {
        async fn frame_count(&self, path: &Path) -> MediaResult<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.frames
                .get(path)
                .copied()
                .ok_or_else(|| MediaError::ffprobe_failed("invalid data", None))
        }
    }

    #[derive(Default, Clone)]
    struct FakeStore {
        sizes: Arc<Mutex<HashMap<PathBuf, u64>>>,
        removed: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl FakeStore {
        fn with(self, path: &str, size: u64) -> Self {
            self.sizes.lock().unwrap().insert(PathBuf::from(path), size);
            self
        }
    }

    impl TargetStore for FakeStore {
        fn size(&self, path: &Path) -> std::io::Result<Option<u64>> {
            Ok(self.sizes.lock().unwrap().get(path).copied())
        }

        fn remove(&self, path: &Path) -> std::io::Result<()> {
            self.sizes.lock().unwrap().remove(path);
            self.removed.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    fn whitelist() -> Vec<String> {
        vec!["mkv".to_string(), "mp4".to_string()]
    }

    fn candidate(name: &str) -> (Candidate, ConversionTarget) {
        let c = Candidate::new(format!("/lib/lossless/{}", name), "/lib/lossless", MARKER);
        let t = c.conversion_target("AV1", "mp4");
        (c, t)
    }

    #[tokio::test]
    async fn test_wrong_container_skips_without_io() {
        let probe = FakeProbe::default();
        let store = FakeStore::default().with("/lib/AV1/clip.mp4", 10);
        let planner = ConversionPlanner::with_store(probe.clone(), store.clone(), whitelist(), FLOOR);

        for name in ["clip.avi", "clip.mov", "clip", "clip.MKV.bak"] {
            let (c, t) = candidate(name);
            let decision = planner.decide(&c, &t).await.unwrap();
            assert_eq!(decision, ConversionDecision::SkipWrongContainer, "{}", name);
            planner.discard_stale(&decision, &t).unwrap();
        }

        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
        assert!(store.removed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_target_converts() {
        let planner = ConversionPlanner::with_store(
            FakeProbe::default(),
            FakeStore::default(),
            whitelist(),
            FLOOR,
        );
        let (c, t) = candidate("clip.MKV");
        assert_eq!(planner.decide(&c, &t).await.unwrap(), ConversionDecision::Convert);
    }

    #[tokio::test]
    async fn test_matching_target_is_untouched() {
        let probe = FakeProbe::default()
            .with("/lib/lossless/clip.mkv", 1000)
            .with("/lib/AV1/clip.mp4", 1000);
        let store = FakeStore::default().with("/lib/AV1/clip.mp4", 50 * FLOOR);
        let planner = ConversionPlanner::with_store(probe, store.clone(), whitelist(), FLOOR);

        let (c, t) = candidate("clip.mkv");
        let decision = planner.decide(&c, &t).await.unwrap();
        assert_eq!(decision, ConversionDecision::SkipAlreadyConverted);

        planner.discard_stale(&decision, &t).unwrap();
        assert!(store.removed.lock().unwrap().is_empty());
        assert!(store.size(t.path()).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_mismatch_deletes_target_once() {
        let probe = FakeProbe::default()
            .with("/lib/lossless/clip.mkv", 1000)
            .with("/lib/AV1/clip.mp4", 400);
        let store = FakeStore::default().with("/lib/AV1/clip.mp4", 20 * FLOOR);
        let planner = ConversionPlanner::with_store(probe, store.clone(), whitelist(), FLOOR);

        let (c, t) = candidate("clip.mkv");
        let decision = planner.decide(&c, &t).await.unwrap();
        assert_eq!(
            decision,
            ConversionDecision::ReconvertMismatch(StaleReason::FrameMismatch {
                source: 1000,
                target: 400
            })
        );

        planner.discard_stale(&decision, &t).unwrap();
        assert_eq!(*store.removed.lock().unwrap(), vec![PathBuf::from("/lib/AV1/clip.mp4")]);
    }

    #[tokio::test]
    async fn test_zero_frame_target_is_mismatch() {
        let probe = FakeProbe::default()
            .with("/lib/lossless/clip.mkv", 1000)
            .with("/lib/AV1/clip.mp4", 0);
        let store = FakeStore::default().with("/lib/AV1/clip.mp4", 2 * FLOOR);
        let planner = ConversionPlanner::with_store(probe, store, whitelist(), FLOOR);

        let (c, t) = candidate("clip.mkv");
        assert!(matches!(
            planner.decide(&c, &t).await.unwrap(),
            ConversionDecision::ReconvertMismatch(StaleReason::FrameMismatch { target: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_small_target_is_stale_without_probing() {
        let probe = FakeProbe::default();
        let store = FakeStore::default().with("/lib/AV1/clip.mp4", 512);
        let planner = ConversionPlanner::with_store(probe.clone(), store, whitelist(), FLOOR);

        let (c, t) = candidate("clip.mkv");
        assert_eq!(
            planner.decide(&c, &t).await.unwrap(),
            ConversionDecision::ReconvertMismatch(StaleReason::BelowSizeFloor { bytes: 512 })
        );
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unreadable_target_is_stale() {
        let probe = FakeProbe::default().with("/lib/lossless/clip.mkv", 1000);
        let store = FakeStore::default().with("/lib/AV1/clip.mp4", 5 * FLOOR);
        let planner = ConversionPlanner::with_store(probe, store, whitelist(), FLOOR);

        let (c, t) = candidate("clip.mkv");
        assert_eq!(
            planner.decide(&c, &t).await.unwrap(),
            ConversionDecision::ReconvertMismatch(StaleReason::Unreadable)
        );
    }

    #[tokio::test]
    async fn test_unreadable_source_is_reported() {
        let probe = FakeProbe::default().with("/lib/AV1/clip.mp4", 1000);
        let store = FakeStore::default().with("/lib/AV1/clip.mp4", 5 * FLOOR);
        let planner = ConversionPlanner::with_store(probe, store.clone(), whitelist(), FLOOR);

        let (c, t) = candidate("clip.mkv");
        let err = planner.decide(&c, &t).await.unwrap_err();
        assert!(matches!(err, MediaError::FfprobeFailed { .. }));
        assert!(!err.is_fatal());
        assert!(store.removed.lock().unwrap().is_empty());
    }

    #[test]
    fn test_local_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");

        assert_eq!(LocalStore.size(&path).unwrap(), None);
        std::fs::write(&path, vec![0u8; 42]).unwrap();
        assert_eq!(LocalStore.size(&path).unwrap(), Some(42));

        LocalStore.remove(&path).unwrap();
        assert!(!path.exists());
    }
}
