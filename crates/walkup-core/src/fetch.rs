//! Asset acquisition seam and output detection.
//!
//! A fetcher drops its result somewhere in the songs directory without
//! telling us where, so the caller snapshots the directory before the call
//! and diffs afterwards:
//!
//! 1. files with the target extension present after but not before → newest of those;
//! 2. otherwise the newest file with the target extension in the directory;
//! 3. otherwise the fetch counts as failed.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::names::has_extension;

/// Search-and-download backend.
#[async_trait]
pub trait AssetFetcher: Send {
    /// Run one query to completion. Success means the backend believes it
    /// wrote a file into its asset directory.
    async fn fetch(&mut self, query: &str) -> Result<(), FetchError>;
}

/// Build the backend query from the non-empty parts, in order.
pub fn build_query(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Set of file paths currently in `dir`. An unreadable directory is empty.
pub fn snapshot(dir: &Path) -> HashSet<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect(),
        Err(e) => {
            debug!("snapshot of {:?} failed: {}", dir, e);
            HashSet::new()
        }
    }
}

/// Locate the file a fetcher produced, given the snapshot taken before it ran.
pub fn detect_output(dir: &Path, before: &HashSet<PathBuf>, ext: &str) -> Option<PathBuf> {
    let after = snapshot(dir);
    let fresh: Vec<PathBuf> = after
        .difference(before)
        .filter(|p| has_extension(p, ext))
        .cloned()
        .collect();

    if let Some(path) = newest(fresh) {
        debug!("fetch output (new file): {:?}", path);
        return Some(path);
    }

    let fallback = newest(after.into_iter().filter(|p| has_extension(p, ext)));
    if let Some(ref path) = fallback {
        warn!("No new .{} file appeared, falling back to newest: {:?}", ext, path);
    }
    fallback
}

fn newest(paths: impl IntoIterator<Item = PathBuf>) -> Option<PathBuf> {
    paths
        .into_iter()
        .map(|p| {
            let modified = std::fs::metadata(&p)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, p)
        })
        .max()
        .map(|(_, p)| p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn touch(path: &Path, age_secs: u64) {
        let f = std::fs::File::create(path).unwrap();
        f.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
            .unwrap();
    }

    #[test]
    fn test_build_query_skips_empty_parts() {
        assert_eq!(build_query(&["Thunderstruck", "AC/DC", "audio"]), "Thunderstruck AC/DC audio");
        assert_eq!(build_query(&["Song", " ", "audio"]), "Song audio");
        assert_eq!(build_query(&["", ""]), "");
    }

    #[test]
    fn test_detect_prefers_new_file() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("old.mp3"), 0);
        let before = snapshot(dir.path());

        touch(&dir.path().join("fresh.mp3"), 600);
        touch(&dir.path().join("fresh.webm"), 0);
        assert_eq!(
            detect_output(dir.path(), &before, "mp3"),
            Some(dir.path().join("fresh.mp3"))
        );
    }

    #[test]
    fn test_detect_falls_back_to_newest() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("a.mp3"), 300);
        touch(&dir.path().join("b.MP3"), 10);
        let before = snapshot(dir.path());
        assert_eq!(
            detect_output(dir.path(), &before, "mp3"),
            Some(dir.path().join("b.MP3"))
        );
    }

    #[test]
    fn test_detect_nothing() {
        let dir = TempDir::new().unwrap();
        let before = snapshot(dir.path());
        touch(&dir.path().join("only.txt"), 0);
        assert_eq!(detect_output(dir.path(), &before, "mp3"), None);
    }
}
