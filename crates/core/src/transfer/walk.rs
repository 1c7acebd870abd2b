//! Local directory enumeration

use std::path::{Path, PathBuf};

use jiff::Timestamp;
use walkdir::WalkDir;

use super::timestamp::from_system_time;
use crate::error::{Error, Result};

/// A regular file found under a walked root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Full path on disk
    pub path: PathBuf,
    /// Path relative to the walk root, `/`-separated
    pub relative_path: String,
    pub modified: Timestamp,
    pub size: u64,
}

/// Base-name glob used to drop files before they are diffed or transferred
#[derive(Debug, Clone)]
pub struct ExcludePattern {
    pattern: glob::Pattern,
}

impl ExcludePattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = glob::Pattern::new(pattern)
            .map_err(|e| Error::Usage(format!("Invalid exclude pattern '{pattern}': {e}")))?;
        Ok(Self { pattern })
    }

    /// Match against the last segment of a `/`-separated relative path
    pub fn matches(&self, relative_path: &str) -> bool {
        let base = relative_path.rsplit('/').next().unwrap_or(relative_path);
        self.pattern.matches(base)
    }
}

/// Enumerate every regular file under `root`.
///
/// Symlinks are followed so that a dangling link is reported instead of being
/// skipped. The first error aborts the walk. Results are sorted by relative
/// path.
pub fn walk_directory(root: &Path, exclude: Option<&ExcludePattern>) -> Result<Vec<FileRecord>> {
    let mut records = Vec::new();

    for entry in WalkDir::new(root).follow_links(true).min_depth(1) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            let source = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("filesystem loop detected"));
            Error::fs(path, source)
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let relative_path = relative_slash_path(root, entry.path())?;
        if exclude.is_some_and(|p| p.matches(&relative_path)) {
            tracing::debug!(path = %relative_path, "Excluded by pattern");
            continue;
        }

        let metadata = entry.metadata().map_err(|e| {
            let source = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("metadata unavailable"));
            Error::fs(entry.path(), source)
        })?;
        let modified = metadata.modified().map_err(|e| Error::fs(entry.path(), e))?;

        records.push(FileRecord {
            path: entry.path().to_path_buf(),
            relative_path,
            modified: from_system_time(modified),
            size: metadata.len(),
        });
    }

    records.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(records)
}

fn relative_slash_path(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).map_err(|_| {
        Error::fs(
            path,
            std::io::Error::other(format!("not under {}", root.display())),
        )
    })?;

    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), b"alpha").unwrap();
        fs::create_dir_all(dir.path().join("sub/deeper")).unwrap();
        fs::write(dir.path().join("sub/b.log"), b"bravo!").unwrap();
        fs::write(dir.path().join("sub/deeper/c.txt"), b"c").unwrap();
        fs::create_dir_all(dir.path().join("empty")).unwrap();
        dir
    }

    #[test]
    fn test_walk_yields_files_only() {
        let dir = tree();
        let records = walk_directory(dir.path(), None).unwrap();
        let names: Vec<_> = records.iter().map(|r| r.relative_path.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "sub/b.log", "sub/deeper/c.txt"]);
        assert_eq!(records[1].size, 6);
        assert_eq!(records[0].path, dir.path().join("a.txt"));
    }

    #[test]
    fn test_walk_exclude_matches_base_name() {
        let dir = tree();
        let exclude = ExcludePattern::new("*.log").unwrap();
        let records = walk_directory(dir.path(), Some(&exclude)).unwrap();
        assert!(records.iter().all(|r| !r.relative_path.ends_with(".log")));
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_walk_missing_root_is_fatal() {
        let dir = TempDir::new().unwrap();
        let err = walk_directory(&dir.path().join("nope"), None).unwrap_err();
        assert!(matches!(err, Error::Filesystem { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_walk_broken_symlink_is_fatal() {
        let dir = tree();
        std::os::unix::fs::symlink(dir.path().join("gone"), dir.path().join("dangling")).unwrap();
        let err = walk_directory(dir.path(), None).unwrap_err();
        assert!(matches!(err, Error::Filesystem { .. }));
    }

    #[test]
    fn test_invalid_exclude_pattern() {
        assert!(matches!(ExcludePattern::new("[").unwrap_err(), Error::Usage(_)));
    }
}
