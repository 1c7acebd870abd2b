//! Timestamp-based difference between a source and a destination tree
//!
//! Sync policy is modification-time only: a path is transferred when it is
//! missing at the destination or the source copy is strictly newer. Content is
//! never hashed. Instants are compared at whole-second precision because the
//! service truncates last-modified values to seconds.

use std::collections::{BTreeSet, HashMap};

use jiff::Timestamp;
use serde::Serialize;

use super::timestamp::remote_time_or_min;
use super::walk::FileRecord;
use crate::path::RemotePath;
use crate::traits::ObjectInfo;

/// A remote object seen through a listing prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRecord {
    /// Full object key
    pub key: String,
    /// Key with the listing prefix removed
    pub relative_path: String,
    /// Last-modified value as returned by the listing
    pub last_modified: Option<String>,
    pub size: i64,
}

impl ObjectRecord {
    /// Build records for every listed object under `prefix`, skipping
    /// directory markers and keys outside the prefix boundary.
    pub fn from_listing(prefix: &RemotePath, objects: Vec<ObjectInfo>) -> Vec<ObjectRecord> {
        let mut records: Vec<_> = objects
            .into_iter()
            .filter_map(|info| {
                let relative_path = prefix.relative_key(&info.key)?.to_string();
                Some(ObjectRecord {
                    key: info.key,
                    relative_path,
                    last_modified: info.last_modified,
                    size: info.size_bytes,
                })
            })
            .collect();
        records.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        records
    }
}

/// One side of a diff: anything with a relative path and a comparable instant
pub trait SyncRecord {
    fn relative_path(&self) -> &str;
    fn modified(&self) -> Timestamp;
}

impl SyncRecord for FileRecord {
    fn relative_path(&self) -> &str {
        &self.relative_path
    }

    fn modified(&self) -> Timestamp {
        self.modified
    }
}

impl SyncRecord for ObjectRecord {
    fn relative_path(&self) -> &str {
        &self.relative_path
    }

    fn modified(&self) -> Timestamp {
        remote_time_or_min(self.last_modified.as_deref())
    }
}

/// Paths to act on after comparing two trees
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffResult {
    /// Missing at the destination or strictly newer at the source
    pub to_transfer: BTreeSet<String>,
    /// Present only at the destination; empty unless deletion was requested
    pub to_delete: BTreeSet<String>,
    /// Present on both sides and not newer at the source
    pub unchanged: usize,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.to_transfer.is_empty() && self.to_delete.is_empty()
    }
}

/// Compare `source` against `dest`
pub fn diff<S, D>(source: &[S], dest: &[D], delete_extraneous: bool) -> DiffResult
where
    S: SyncRecord,
    D: SyncRecord,
{
    let dest_index: HashMap<&str, i64> = dest
        .iter()
        .map(|d| (d.relative_path(), d.modified().as_second()))
        .collect();

    let mut result = DiffResult::default();

    for src in source {
        match dest_index.get(src.relative_path()) {
            Some(dest_secs) if src.modified().as_second() <= *dest_secs => result.unchanged += 1,
            _ => {
                result.to_transfer.insert(src.relative_path().to_string());
            }
        }
    }

    if delete_extraneous {
        let source_paths: BTreeSet<&str> = source.iter().map(|s| s.relative_path()).collect();
        result.to_delete = dest
            .iter()
            .map(|d| d.relative_path())
            .filter(|path| !source_paths.contains(path))
            .map(str::to_string)
            .collect();
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn file(rel: &str, ts: &str) -> FileRecord {
        FileRecord {
            path: PathBuf::from("/root").join(rel),
            relative_path: rel.to_string(),
            modified: ts.parse().unwrap(),
            size: 1,
        }
    }

    fn object(rel: &str, modified: &str) -> ObjectRecord {
        ObjectRecord {
            key: format!("prefix/{rel}"),
            relative_path: rel.to_string(),
            last_modified: Some(modified.to_string()),
            size: 1,
        }
    }

    #[test]
    fn test_missing_at_destination_is_transferred() {
        let source = vec![file("a.txt", "2024-01-01T00:00:00Z")];
        let dest: Vec<ObjectRecord> = vec![];
        let result = diff(&source, &dest, false);
        assert!(result.to_transfer.contains("a.txt"));
    }

    #[test]
    fn test_newer_source_is_transferred() {
        let source = vec![file("a.txt", "2024-01-02T00:00:00Z")];
        let dest = vec![object("a.txt", "Mon, 01 Jan 2024 00:00:00 GMT")];
        let result = diff(&source, &dest, false);
        assert_eq!(result.to_transfer.len(), 1);
        assert_eq!(result.unchanged, 0);
    }

    #[test]
    fn test_older_or_equal_source_is_skipped() {
        let source = vec![
            file("old.txt", "2023-12-31T00:00:00Z"),
            file("same.txt", "2024-01-01T00:00:00Z"),
        ];
        let dest = vec![
            object("old.txt", "2024-01-01T00:00:00Z"),
            object("same.txt", "2024-01-01T00:00:00.000Z"),
        ];
        let result = diff(&source, &dest, false);
        assert!(result.to_transfer.is_empty());
        assert_eq!(result.unchanged, 2);
    }

    #[test]
    fn test_subsecond_difference_is_ignored() {
        let source = vec![file("a.txt", "2024-01-01T00:00:00.750Z")];
        let dest = vec![object("a.txt", "Mon, 01 Jan 2024 00:00:00 GMT")];
        assert!(diff(&source, &dest, false).to_transfer.is_empty());
    }

    #[test]
    fn test_unparseable_destination_forces_transfer() {
        let source = vec![file("a.txt", "2000-01-01T00:00:00Z")];
        let dest = vec![object("a.txt", "not a date")];
        assert!(diff(&source, &dest, false).to_transfer.contains("a.txt"));
    }

    #[test]
    fn test_delete_extraneous() {
        let source = vec![file("keep.txt", "2024-01-01T00:00:00Z")];
        let dest = vec![
            object("keep.txt", "2024-01-01T00:00:00Z"),
            object("stale.txt", "2024-01-01T00:00:00Z"),
            object("sub/stale.txt", "2024-01-01T00:00:00Z"),
        ];

        let without = diff(&source, &dest, false);
        assert!(without.to_delete.is_empty());

        let with = diff(&source, &dest, true);
        assert_eq!(
            with.to_delete.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["stale.txt", "sub/stale.txt"]
        );
        assert!(with.to_transfer.is_disjoint(&with.to_delete));
    }

    #[test]
    fn test_remote_source_against_local_destination() {
        let source = vec![object("a.txt", "2024-06-01T12:00:00Z")];
        let dest = vec![file("a.txt", "2024-06-01T12:00:00Z")];
        assert!(diff(&source, &dest, false).is_empty());
    }

    #[test]
    fn test_records_from_listing() {
        let prefix = RemotePath::new("b", "backup");
        let mut info = ObjectInfo::new("backup/sub/b.txt", 3);
        info.last_modified = Some("2024-01-01T00:00:00Z".to_string());
        let listing = vec![
            info,
            ObjectInfo::new("backup/a.txt", 1),
            ObjectInfo::new("backup/sub/", 0),
            ObjectInfo::new("backup2/x.txt", 1),
        ];

        let records = ObjectRecord::from_listing(&prefix, listing);
        let rels: Vec<_> = records.iter().map(|r| r.relative_path.as_str()).collect();
        assert_eq!(rels, vec!["a.txt", "sub/b.txt"]);
        assert_eq!(records[1].size, 3);
    }
}
