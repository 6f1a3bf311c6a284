//! Candidates discovered during a library scan.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A source media file discovered in a source collection.
///
/// Immutable for the duration of a scan pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Absolute path of the source file
    path: PathBuf,
    /// Container extension as found on disk (no leading dot)
    extension: String,
    /// The source collection directory the file was listed from
    collection: PathBuf,
    /// Whether the filename carries the upload marker
    upload_tagged: bool,
    /// Remote title derived from the filename
    title: String,
}

impl Candidate {
    /// Build a candidate from a file inside `collection`.
    ///
    /// `marker` is the upload convention token matched case-insensitively
    /// against the file stem.
    pub fn new(path: impl Into<PathBuf>, collection: impl Into<PathBuf>, marker: &str) -> Self {
        let path = path.into();
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default();
        let stem = file_stem(&path);
        let upload_tagged = contains_marker(&stem, marker);
        let title = derive_title(&stem, marker);

        Self {
            path,
            extension,
            collection: collection.into(),
            upload_tagged,
            title,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn collection(&self) -> &Path {
        &self.collection
    }

    pub fn is_upload_tagged(&self) -> bool {
        self.upload_tagged
    }

    /// Title used for remote search and upload metadata.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// File name for log messages.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Case-insensitive container check against a whitelist.
    pub fn has_container(&self, whitelist: &[String]) -> bool {
        whitelist
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&self.extension))
    }

    /// Compute where the transcoded output for this candidate lives.
    ///
    /// The output folder is a sibling of the source collection and the file
    /// keeps its stem with `container` as the normalized extension.
    pub fn conversion_target(&self, output_folder: &str, container: &str) -> ConversionTarget {
        let base = self
            .collection
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.collection.clone());
        let dir = base.join(output_folder);
        let path = dir.join(format!("{}.{}", file_stem(&self.path), container));
        ConversionTarget { dir, path }
    }
}

/// Destination of a candidate's transcoded output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionTarget {
    dir: PathBuf,
    path: PathBuf,
}

impl ConversionTarget {
    /// Output subfolder that must exist before encoding.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Strip the upload marker from a stem and normalize whitespace.
pub fn derive_title(stem: &str, marker: &str) -> String {
    let mut remaining = stem.to_string();
    if !marker.trim().is_empty() {
        let needle = marker.to_ascii_lowercase();
        while let Some(idx) = remaining.to_ascii_lowercase().find(&needle) {
            remaining.replace_range(idx..idx + needle.len(), " ");
        }
    }
    remaining.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn contains_marker(stem: &str, marker: &str) -> bool {
    !marker.trim().is_empty()
        && stem
            .to_ascii_lowercase()
            .contains(&marker.to_ascii_lowercase())
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKER: &str = "ytupload";

    #[test]
    fn test_candidate_upload_tag() {
        let c = Candidate::new("/lib/game/lossless/clip ytupload.mp4", "/lib/game/lossless", MARKER);
        assert!(c.is_upload_tagged());
        assert_eq!(c.title(), "clip");
        assert_eq!(c.extension(), "mp4");

        let c = Candidate::new("/lib/game/lossless/clip YTUpload.mkv", "/lib/game/lossless", MARKER);
        assert!(c.is_upload_tagged());

        let c = Candidate::new("/lib/game/lossless/clip.mkv", "/lib/game/lossless", MARKER);
        assert!(!c.is_upload_tagged());
        assert_eq!(c.title(), "clip");
    }

    #[test]
    fn test_derive_title_strips_marker_anywhere() {
        assert_eq!(derive_title("ytupload best moments", MARKER), "best moments");
        assert_eq!(derive_title("best  YTUPLOAD  moments", MARKER), "best moments");
        assert_eq!(derive_title("no marker here", MARKER), "no marker here");
    }

    #[test]
    fn test_container_whitelist_case_insensitive() {
        let whitelist = vec!["mkv".to_string(), "mp4".to_string()];
        let c = Candidate::new("/l/lossless/a.MKV", "/l/lossless", MARKER);
        assert!(c.has_container(&whitelist));
        let c = Candidate::new("/l/lossless/a.avi", "/l/lossless", MARKER);
        assert!(!c.has_container(&whitelist));
        let c = Candidate::new("/l/lossless/noext", "/l/lossless", MARKER);
        assert!(!c.has_container(&whitelist));
    }

    #[test]
    fn test_conversion_target_is_sibling_folder() {
        let c = Candidate::new("/lib/game/lossless/clip.mkv", "/lib/game/lossless", MARKER);
        let target = c.conversion_target("AV1", "mp4");
        assert_eq!(target.dir(), Path::new("/lib/game/AV1"));
        assert_eq!(target.path(), Path::new("/lib/game/AV1/clip.mp4"));
    }

    #[test]
    fn test_conversion_target_keeps_marker_in_file_name() {
        let c = Candidate::new("/lib/lossless/clip ytupload.mkv", "/lib/lossless", MARKER);
        let target = c.conversion_target("AV1", "mp4");
        assert_eq!(target.path(), Path::new("/lib/AV1/clip ytupload.mp4"));
    }
}
