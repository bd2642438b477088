//! On-disk snapshot inventory.
//!
//! A snapshot is one completed zip archive in the output directory. This
//! module lists them oldest-first and deletes evicted ones with per-file
//! fault tolerance.

use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// One completed archive file on disk. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotDescriptor {
    /// File name without extension, `<tree_id>_<timestamp>[.<n>]`
    pub id: String,

    /// Full path to the archive file
    pub path: PathBuf,

    /// Archive size in bytes
    pub size_bytes: u64,

    /// Last-modified time, epoch milliseconds
    pub modified_ms: i64,
}

impl SnapshotDescriptor {
    /// Build a descriptor from an archive file's metadata.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        let modified_ms = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        Ok(Self {
            id: path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path: path.to_path_buf(),
            size_bytes: meta.len(),
            modified_ms,
        })
    }
}

/// List all snapshots in the output directory, oldest first.
///
/// Only regular files are considered. Ordering is by modification time with
/// a lexical tie-break on the id so eviction order is deterministic.
pub fn list_snapshots(dir: &Path) -> std::io::Result<Vec<SnapshotDescriptor>> {
    let mut snapshots = Vec::new();

    if !dir.is_dir() {
        return Ok(snapshots);
    }

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        snapshots.push(SnapshotDescriptor::from_path(&entry.path())?);
    }

    sort_oldest_first(&mut snapshots);
    Ok(snapshots)
}

/// Sort snapshots oldest-first with a deterministic tie-break.
pub fn sort_oldest_first(snapshots: &mut [SnapshotDescriptor]) {
    snapshots.sort_by(|a, b| {
        a.modified_ms
            .cmp(&b.modified_ms)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Total bytes across a snapshot listing.
pub fn total_size(snapshots: &[SnapshotDescriptor]) -> u64 {
    snapshots.iter().map(|s| s.size_bytes).sum()
}

/// Delete the given snapshots from disk, in order.
///
/// A delete that fails (permissions, already gone, OS error) is logged and
/// skipped; the pass always continues to the next candidate. Returns the
/// number of files actually removed.
pub fn delete_snapshots(victims: &[SnapshotDescriptor]) -> usize {
    let mut deleted = 0;

    for victim in victims {
        match std::fs::remove_file(&victim.path) {
            Ok(()) => {
                info!(snapshot = %victim.id, "Deleted old snapshot");
                deleted += 1;
            }
            Err(e) => {
                warn!(snapshot = %victim.id, error = %e, "Failed to delete snapshot, skipping");
            }
        }
    }

    deleted
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn descriptor(id: &str, path: PathBuf, size: u64, modified: i64) -> SnapshotDescriptor {
        SnapshotDescriptor {
            id: id.to_string(),
            path,
            size_bytes: size,
            modified_ms: modified,
        }
    }

    #[test]
    fn test_list_missing_directory_is_empty() -> std::io::Result<()> {
        let temp = TempDir::new()?;
        let snapshots = list_snapshots(&temp.path().join("nope"))?;
        assert!(snapshots.is_empty());
        Ok(())
    }

    #[test]
    fn test_list_skips_subdirectories() -> std::io::Result<()> {
        let temp = TempDir::new()?;
        fs::write(temp.path().join("a.zip"), b"aaaa")?;
        fs::create_dir(temp.path().join("not-a-snapshot"))?;

        let snapshots = list_snapshots(temp.path())?;
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].id, "a");
        assert_eq!(snapshots[0].size_bytes, 4);
        Ok(())
    }

    #[test]
    fn test_sort_breaks_ties_lexically() {
        let mut snapshots = vec![
            descriptor("b", PathBuf::from("b.zip"), 1, 100),
            descriptor("a", PathBuf::from("a.zip"), 1, 100),
            descriptor("c", PathBuf::from("c.zip"), 1, 50),
        ];
        sort_oldest_first(&mut snapshots);
        let ids: Vec<_> = snapshots.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_total_size() {
        let snapshots = vec![
            descriptor("a", PathBuf::from("a.zip"), 10, 1),
            descriptor("b", PathBuf::from("b.zip"), 32, 2),
        ];
        assert_eq!(total_size(&snapshots), 42);
        assert_eq!(total_size(&[]), 0);
    }

    #[test]
    fn test_delete_continues_past_failure() -> std::io::Result<()> {
        let temp = TempDir::new()?;
        let good1 = temp.path().join("one.zip");
        let good2 = temp.path().join("three.zip");
        fs::write(&good1, b"1")?;
        fs::write(&good2, b"3")?;
        // remove_file on a directory fails on every platform
        let bad = temp.path().join("two.zip");
        fs::create_dir(&bad)?;

        let victims = vec![
            descriptor("one", good1.clone(), 1, 1),
            descriptor("two", bad.clone(), 0, 2),
            descriptor("three", good2.clone(), 1, 3),
        ];

        let deleted = delete_snapshots(&victims);
        assert_eq!(deleted, 2);
        assert!(!good1.exists());
        assert!(bad.exists());
        assert!(!good2.exists());
        Ok(())
    }
}
