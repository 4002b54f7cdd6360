//! Single-flight guard for chunk downloads.
//!
//! A hash lives in the set for the duration of exactly one outbound chunk
//! request; membership means "do not start another fetch for this hash".
//! The timestamp exists only so the janitor can reclaim entries leaked by
//! a fetch that never returned.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tessera_core::ChunkHash;

#[derive(Default)]
pub struct InflightSet {
    entries: DashMap<ChunkHash, u64>,
}

impl InflightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `hash` for one fetch attempt. Atomic: exactly one of several
    /// concurrent callers gets true.
    pub fn try_acquire(&self, hash: ChunkHash, now: u64) -> bool {
        match self.entries.entry(hash) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
        }
    }

    /// Release a claim. Must be called on every exit path of the fetch
    /// that acquired it.
    pub fn release(&self, hash: &ChunkHash) {
        self.entries.remove(hash);
    }

    pub fn contains(&self, hash: &ChunkHash) -> bool {
        self.entries.contains_key(hash)
    }

    /// Drop claims acquired before `cutoff`.
    pub fn remove_older_than(&self, cutoff: u64) {
        self.entries.retain(|_, acquired_at| *acquired_at >= cutoff);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::content_hash;

    #[test]
    fn second_acquire_fails_until_release() {
        let set = InflightSet::new();
        let hash = content_hash(b"chunk");

        assert!(set.try_acquire(hash, 100));
        assert!(!set.try_acquire(hash, 200));
        assert!(set.contains(&hash));

        set.release(&hash);
        assert!(!set.contains(&hash));
        assert!(set.try_acquire(hash, 300));
    }

    #[test]
    fn distinct_hashes_do_not_interfere() {
        let set = InflightSet::new();
        assert!(set.try_acquire(content_hash(b"a"), 1));
        assert!(set.try_acquire(content_hash(b"b"), 1));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn remove_older_than_reclaims_leaked_claims() {
        let set = InflightSet::new();
        let stale = content_hash(b"stale");
        let fresh = content_hash(b"fresh");
        set.try_acquire(stale, 1_000);
        set.try_acquire(fresh, 9_000);

        set.remove_older_than(5_000);

        assert!(!set.contains(&stale));
        assert!(set.contains(&fresh));
    }
}
