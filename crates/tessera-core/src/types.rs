//! Identifiers shared across the chain, the chunk store, and the network.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// BLAKE3 digest of a chunk's content. Doubles as the chunk's identity:
/// if the hash matches, the content is correct.
pub type ChunkHash = [u8; 32];

/// A peer's static public key.
pub type PeerId = [u8; 32];

/// Hash a byte slice, returning a 32-byte BLAKE3 digest.
pub fn content_hash(data: &[u8]) -> ChunkHash {
    *blake3::hash(data).as_bytes()
}

// ── Signature ─────────────────────────────────────────────────────────────────

/// Signature of an arbitrary transaction: 64 opaque bytes assigned by the
/// chain. The manager treats it as an identity, never verifies it.
///
/// The textual form is base58 and is what appears in logs and serialized
/// records; maps key on the raw bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature(pub [u8; 64]);

impl Signature {
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(&self.0[..]).into_string()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b58 = self.to_base58();
        write!(f, "Signature({}..)", &b58[..8.min(b58.len())])
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base58())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = bs58::decode(&s)
            .into_vec()
            .map_err(serde::de::Error::custom)?;
        if bytes.len() != 64 {
            return Err(serde::de::Error::custom("expected 64 signature bytes"));
        }
        let mut arr = [0u8; 64];
        arr.copy_from_slice(&bytes);
        Ok(Signature(arr))
    }
}

// ── Chain views ───────────────────────────────────────────────────────────────

/// Summary of one block, as used by chain sync.
///
/// The arbitrary-data protocol reuses an *empty* summaries message as its
/// historical "no such chunk" reply, so the type lives here with the rest
/// of the shared model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockSummary {
    pub height: u64,
    pub signature: Signature,
}

/// The transaction index's view of an arbitrary transaction: the signature
/// identifying it, the content hash of the whole payload, and the ordered
/// chunk-hash manifest.
///
/// Payloads small enough to travel whole have an empty manifest.
#[derive(Debug, Clone)]
pub struct ArbitraryTx {
    pub signature: Signature,
    /// Content hash of the complete payload blob.
    pub blob_hash: ChunkHash,
    /// Ordered hashes of the payload's chunks. The authoritative list a
    /// peer's chunk offer is validated against.
    pub chunk_hashes: Vec<ChunkHash>,
}

impl ArbitraryTx {
    /// Manifest membership. Says nothing about whether the chunk is held
    /// locally, only whether it belongs to this transaction at all.
    pub fn contains_chunk(&self, hash: &ChunkHash) -> bool {
        self.chunk_hashes.iter().any(|h| h == hash)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
