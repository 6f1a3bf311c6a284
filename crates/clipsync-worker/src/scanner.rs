//! Library scanning.

use std::path::{Path, PathBuf};

use clipsync_models::Candidate;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::ScanConfig;
use crate::error::{WorkerError, WorkerResult};

/// A source collection and the candidates listed from it.
#[derive(Debug, Clone)]
pub struct Collection {
    pub dir: PathBuf,
    pub candidates: Vec<Candidate>,
}

/// Find every source collection under `root` and list its immediate files.
///
/// Collections and files come back in name order so repeated runs walk the
/// library the same way. Unreadable subtrees are skipped with a warning.
pub fn scan_library(root: &Path, config: &ScanConfig) -> WorkerResult<Vec<Collection>> {
    if !root.is_dir() {
        return Err(WorkerError::scan_failed(format!(
            "{} is not a directory",
            root.display()
        )));
    }

    let mut collections = Vec::new();

    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable path during scan: {}", e);
                continue;
            }
        };

        if entry.file_type().is_dir() && entry.file_name() == config.collection_dir.as_str() {
            let dir = entry.path().to_path_buf();
            let candidates = list_candidates(&dir, &config.upload_marker)?;
            debug!("Collection {} has {} files", dir.display(), candidates.len());
            collections.push(Collection { dir, candidates });
        }
    }

    Ok(collections)
}

/// Regular files directly inside `collection`, in name order.
fn list_candidates(collection: &Path, marker: &str) -> WorkerResult<Vec<Candidate>> {
    let mut candidates = Vec::new();

    for entry in WalkDir::new(collection)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {}", collection.display(), e);
                continue;
            }
        };

        if entry.file_type().is_file() {
            candidates.push(Candidate::new(entry.into_path(), collection, marker));
        }
    }

    Ok(candidates)
}
