//! Message counters exposed to the host's status surface.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the serve side of the protocol. Cheap enough to bump from
/// every handler invocation.
#[derive(Debug, Default)]
pub struct SyncStats {
    /// Chunk requests received.
    pub file_requests: AtomicU64,
    /// Chunk requests naming a hash we do not hold.
    pub file_unknown: AtomicU64,
    /// Hash-list requests received.
    pub file_list_requests: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub file_requests: u64,
    pub file_unknown: u64,
    pub file_list_requests: u64,
}

impl SyncStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            file_requests: self.file_requests.load(Ordering::Relaxed),
            file_unknown: self.file_unknown.load(Ordering::Relaxed),
            file_list_requests: self.file_list_requests.load(Ordering::Relaxed),
        }
    }
}
