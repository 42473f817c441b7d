//! Feed directory discovery and path normalization.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

/// One feed subdirectory of the feeds root, in enumeration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedDirectory {
    pub path: PathBuf,
    pub index: usize,
}

impl FeedDirectory {
    /// Final path component, used for start/stop marker matching.
    pub fn basename(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Lists the immediate subdirectories of `root`.
///
/// The order is whatever the directory listing yields; it is not sorted and
/// is treated as the canonical run order.
///
/// # Errors
///
/// Returns an error if `root` cannot be listed.
pub fn discover_feeds(root: &Path) -> io::Result<Vec<FeedDirectory>> {
    let mut feeds = Vec::new();

    for entry in fs::read_dir(root)? {
        let path = entry?.path();
        if path.is_dir() {
            feeds.push(FeedDirectory {
                path,
                index: feeds.len(),
            });
        }
    }

    Ok(feeds)
}

/// Handles a feed exported one level deeper than expected.
///
/// A directory with any regular file is returned as is. A directory with no
/// regular files and exactly one subdirectory resolves to that subdirectory.
/// Anything else (no subdirectory, or several) is returned unchanged and left
/// for validation to reject.
pub fn extend_path(path: &Path) -> PathBuf {
    let Ok(entries) = fs::read_dir(path) else {
        debug!(path = %path.display(), "Could not list feed directory");
        return path.to_path_buf();
    };

    let mut subdirs = Vec::new();
    for entry in entries.flatten() {
        let entry_path = entry.path();
        if entry_path.is_file() {
            return path.to_path_buf();
        }
        if entry_path.is_dir() {
            subdirs.push(entry_path);
        }
    }

    // More than one candidate: the feed is most likely corrupted.
    match subdirs.as_slice() {
        [only] => {
            debug!(path = %only.display(), "Found subdirectory with feed");
            only.clone()
        }
        _ => path.to_path_buf(),
    }
}
