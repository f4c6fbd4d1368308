//! Manifest-versus-local diff: decides which remote files need fetching and
//! which local files are stale.
//!
//! The rule is exact-match on the `(name, size)` pair in both directions:
//!
//! - A remote entry is queued iff no local file has the identical name AND
//!   identical size. A size mismatch counts as missing and triggers a full
//!   re-fetch — there is no partial patching.
//! - A local file is deleted iff no remote entry matches it by the same
//!   `(name, size)` pair. This prunes renamed, resized, and retired files
//!   alike.
//!
//! When the local set already equals the manifest, both lists are empty and
//! the sync session reports "up to date" without issuing a single chunk
//! request.

use crate::protocol::messages::RemoteFileDescriptor;

/// A file found in the destination directory during the local scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub name: String,
    pub size: u64,
}

/// The outcome of diffing a manifest against the local directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    /// Remote entries still needing transfer, processed as a stack: the LAST
    /// entry is the next to fetch, and entries are removed from the end only
    /// on successful completion or permanent per-file failure.
    pub queue: Vec<RemoteFileDescriptor>,
    /// Names of local files with no exact `(name, size)` match in the
    /// manifest; deleted before the first transfer starts.
    pub deletions: Vec<String>,
}

impl SyncPlan {
    /// True when nothing needs transferring or deleting.
    pub fn is_noop(&self) -> bool {
        self.queue.is_empty() && self.deletions.is_empty()
    }
}

/// Computes the transfer queue and deletion list for one manifest response.
///
/// Queue order follows manifest order, so with pop-from-end semantics the
/// manifest's LAST entry is fetched first.
pub fn plan_sync(manifest: &[RemoteFileDescriptor], local: &[LocalFile]) -> SyncPlan {
    let queue = manifest
        .iter()
        .filter(|remote| {
            !local
                .iter()
                .any(|l| l.name == remote.name && l.size == remote.size)
        })
        .cloned()
        .collect();

    let deletions = local
        .iter()
        .filter(|l| {
            !manifest
                .iter()
                .any(|remote| remote.name == l.name && remote.size == l.size)
        })
        .map(|l| l.name.clone())
        .collect();

    SyncPlan { queue, deletions }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
