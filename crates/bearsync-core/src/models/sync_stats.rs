//! Sync run accounting

use std::fmt;

use serde::{Deserialize, Serialize};

/// Counts of what one sync run did to the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    /// Notes that were not in the cache before
    pub added: usize,
    /// Notes that replaced an existing cache entry
    pub updated: usize,
    /// Notes removed after a remote delete
    pub deleted: usize,
    /// Notes skipped because their body could not be resolved
    pub failed: usize,
}

impl SyncStats {
    pub const fn is_empty(&self) -> bool {
        self.added == 0 && self.updated == 0 && self.deleted == 0 && self.failed == 0
    }
}

impl fmt::Display for SyncStats {
    /// Joins the non-zero categories, e.g. `2 new, 1 deleted`, or prints
    /// `no changes`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("no changes");
        }

        let parts = [
            (self.added, "new"),
            (self.updated, "updated"),
            (self.deleted, "deleted"),
            (self.failed, "failed"),
        ]
        .into_iter()
        .filter(|(count, _)| *count > 0)
        .map(|(count, label)| format!("{count} {label}"))
        .collect::<Vec<_>>();

        f.write_str(&parts.join(", "))
    }
}
