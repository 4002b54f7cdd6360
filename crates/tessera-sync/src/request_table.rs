//! Correlation table for hash-list requests.
//!
//! Keyed by message id. An entry is born when this node broadcasts a
//! hash-list request or first sees a payload request worth relaying, and
//! dies only by TTL sweep; a processed entry lingers as a tombstone that
//! keeps duplicate-suppression working until the janitor gets to it.

use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tessera_core::Signature;

use crate::net::Peer;

/// Where one tracked request stands.
///
/// `signature()` is Some exactly while a response is still expected; once
/// it goes None for an id it never comes back.
#[derive(Clone)]
pub enum RequestState {
    /// We issued the request ourselves, or answered one directly. A
    /// response for this id must carry `signature`.
    Originated { signature: Signature },

    /// Relaying a request on behalf of `origin`; the response gets
    /// forwarded to them.
    Forwarding {
        signature: Signature,
        origin: Arc<dyn Peer>,
    },

    /// Response processed; the relay back to `origin` is still owed.
    Relaying { origin: Arc<dyn Peer> },

    /// Fully processed. Garbage until the janitor sweeps the entry.
    Resolved,
}

impl RequestState {
    /// The signature a response must match, while one is still expected.
    pub fn signature(&self) -> Option<&Signature> {
        match self {
            RequestState::Originated { signature } => Some(signature),
            RequestState::Forwarding { signature, .. } => Some(signature),
            RequestState::Relaying { .. } | RequestState::Resolved => None,
        }
    }

    /// The peer owed a relayed response, if any.
    pub fn origin(&self) -> Option<Arc<dyn Peer>> {
        match self {
            RequestState::Forwarding { origin, .. } => Some(origin.clone()),
            RequestState::Relaying { origin } => Some(origin.clone()),
            RequestState::Originated { .. } | RequestState::Resolved => None,
        }
    }
}

impl fmt::Debug for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestState::Originated { signature } => {
                write!(f, "Originated({signature:?})")
            }
            RequestState::Forwarding { signature, origin } => {
                write!(
                    f,
                    "Forwarding({signature:?}, origin {})",
                    hex::encode(&origin.id()[..8])
                )
            }
            RequestState::Relaying { origin } => {
                write!(f, "Relaying(origin {})", hex::encode(&origin.id()[..8]))
            }
            RequestState::Resolved => f.write_str("Resolved"),
        }
    }
}

/// One table entry.
#[derive(Debug, Clone)]
pub struct RequestRecord {
    pub state: RequestState,
    /// Insertion time, milliseconds. The TTL pruning key; state
    /// transitions keep the original value.
    pub created_at: u64,
}

impl RequestRecord {
    pub fn new(state: RequestState, created_at: u64) -> Self {
        Self { state, created_at }
    }
}

/// Thread-safe id → record map: the single source of truth for request
/// correlation. Handlers replace whole records rather than mutating fields
/// in place, so a reader never observes a half-written state.
#[derive(Default)]
pub struct RequestTable {
    entries: DashMap<u32, RequestRecord>,
}

impl RequestTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert only if `id` is not already live. Returns true on insert.
    pub fn insert_if_absent(&self, id: u32, record: RequestRecord) -> bool {
        match self.entries.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
        }
    }

    /// Unconditional overwrite; used for state transitions.
    pub fn insert(&self, id: u32, record: RequestRecord) {
        self.entries.insert(id, record);
    }

    /// Snapshot of the record for `id`, cloned out of the map.
    pub fn get(&self, id: u32) -> Option<RequestRecord> {
        self.entries.get(&id).map(|r| r.clone())
    }

    /// Drop every entry inserted before `cutoff`.
    pub fn remove_older_than(&self, cutoff: u64) {
        self.entries.retain(|_, record| record.created_at >= cutoff);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
