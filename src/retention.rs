//! Retention policy and eviction selection.
//!
//! Pure decision logic: given an oldest-first snapshot listing and the
//! configured limits, pick which snapshots to delete and in what order.
//! Actual deletion happens in the orchestrator (`snapshot::delete_snapshots`).

use crate::snapshot::SnapshotDescriptor;

/// The pair of limits bounding how many and how much snapshot data is kept.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    /// Maximum number of snapshots to keep, at least 1
    pub max_snapshots: usize,

    /// Maximum total bytes across all snapshots, 0 = unlimited
    pub max_total_bytes: u64,
}

/// Outcome of the size-based pass.
#[derive(Debug)]
pub struct SizeEviction {
    /// Snapshots to delete, in deletion order (oldest first)
    pub victims: Vec<SnapshotDescriptor>,

    /// True when the single remaining snapshot alone exceeds the cap.
    /// The last snapshot is never selected; callers log this instead.
    pub last_oversized: bool,
}

/// Select the oldest snapshots so that at most `keep` remain.
///
/// `snapshots` must be sorted oldest-first. Run before a new snapshot is
/// created, with `keep = max_snapshots - 1`, this makes room so the archive
/// about to be written never pushes the count past the limit.
pub fn select_for_count(snapshots: &[SnapshotDescriptor], keep: usize) -> Vec<SnapshotDescriptor> {
    if snapshots.len() <= keep {
        return Vec::new();
    }
    snapshots[..snapshots.len() - keep].to_vec()
}

/// Select the oldest snapshots until the total fits under `max_total_bytes`.
///
/// `snapshots` must be sorted oldest-first. Never selects the last remaining
/// snapshot: if one snapshot is left and it alone exceeds the cap, selection
/// stops and `last_oversized` is set. A cap of 0 means unlimited.
pub fn select_for_size(snapshots: &[SnapshotDescriptor], max_total_bytes: u64) -> SizeEviction {
    let mut victims = Vec::new();

    if max_total_bytes == 0 {
        return SizeEviction {
            victims,
            last_oversized: false,
        };
    }

    let mut total: u64 = snapshots.iter().map(|s| s.size_bytes).sum();
    let mut remaining = snapshots.len();
    let mut iter = snapshots.iter();

    while total > max_total_bytes && remaining > 1 {
        // remaining > 1 guarantees a next element
        if let Some(oldest) = iter.next() {
            total = total.saturating_sub(oldest.size_bytes);
            remaining -= 1;
            victims.push(oldest.clone());
        } else {
            break;
        }
    }

    SizeEviction {
        victims,
        last_oversized: remaining == 1 && total > max_total_bytes,
    }
}
