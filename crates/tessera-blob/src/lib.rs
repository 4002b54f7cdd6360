//! Content-addressed storage for arbitrary-transaction payloads.
//!
//! Every stored object is a chunk: a file named by the BLAKE3 digest of
//! its contents, sharded into 256 subdirectories by the first hash byte.
//! A complete payload is itself a chunk (named by the transaction's blob
//! hash), so "do we hold this payload" reduces to hash lookups against
//! the transaction's chunk manifest.
//!
//! Writes verify the digest and land atomically; a chunk that exists is
//! never rewritten.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use memmap2::Mmap;

use tessera_core::{content_hash, ArbitraryTx, ChunkHash};

/// On-disk chunk store. Cheap to clone; clones share the same root.
#[derive(Clone)]
pub struct ChunkStore {
    root: PathBuf,
}

/// Space accounting for the status surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreUsage {
    pub chunks: usize,
    pub bytes: u64,
}

impl ChunkStore {
    /// Open (creating if needed) a store rooted at `root`.
    ///
    /// Production roots come from the `storage.blob_path` setting; tests
    /// use a temp dir.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create store root: {}", root.display()))?;
        Ok(Self { root })
    }

    // ── Payload queries ───────────────────────────────────────────────────────

    /// Whether a transaction's payload is wholly local: either the
    /// complete blob is present, or the manifest is non-empty and every
    /// chunk in it is.
    pub fn is_data_local(&self, tx: &ArbitraryTx) -> bool {
        if self.has(&tx.blob_hash) {
            return true;
        }
        !tx.chunk_hashes.is_empty() && tx.chunk_hashes.iter().all(|h| self.has(h))
    }

    /// The subset of a transaction's manifest held locally, in manifest
    /// order. This is what gets offered to a peer asking after the
    /// payload.
    pub fn held_chunks(&self, tx: &ArbitraryTx) -> Vec<ChunkHash> {
        tx.chunk_hashes
            .iter()
            .filter(|hash| self.has(hash))
            .copied()
            .collect()
    }

    /// Reassemble a transaction's complete payload.
    ///
    /// Prefers the stored blob; otherwise concatenates the manifest
    /// chunks in order. When the joined bytes hash to the transaction's
    /// blob hash they are also kept as a whole blob, making the next
    /// lookup a single read. Returns None while any chunk is missing.
    pub fn assemble(&self, tx: &ArbitraryTx) -> Result<Option<Bytes>> {
        if let Some(blob) = self.get(&tx.blob_hash)? {
            return Ok(Some(blob));
        }
        if tx.chunk_hashes.is_empty() {
            return Ok(None);
        }

        let mut payload = Vec::new();
        for hash in &tx.chunk_hashes {
            match self.get(hash)? {
                Some(chunk) => payload.extend_from_slice(&chunk),
                None => return Ok(None),
            }
        }

        if content_hash(&payload) == tx.blob_hash {
            self.write_if_absent(&tx.blob_hash, &payload)?;
            tracing::debug!(
                sig = %tx.signature,
                bytes = payload.len(),
                chunks = tx.chunk_hashes.len(),
                "payload reassembled"
            );
        } else {
            tracing::warn!(
                sig = %tx.signature,
                "reassembled payload does not hash to the manifest blob hash"
            );
        }
        Ok(Some(Bytes::from(payload)))
    }

    // ── Chunk access ──────────────────────────────────────────────────────────

    /// Whether one chunk is present.
    pub fn has(&self, hash: &ChunkHash) -> bool {
        self.chunk_path(hash).exists()
    }

    /// Read one chunk. None if absent.
    ///
    /// mmap-backed, so repeated reads of a served chunk stay in the page
    /// cache.
    pub fn get(&self, hash: &ChunkHash) -> Result<Option<Bytes>> {
        let path = self.chunk_path(hash);
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to open chunk {}", hex::encode(hash)))
            }
        };

        // Safety: read-only mapping of an immutable file
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("failed to map chunk {}", hex::encode(hash)))?;
        Ok(Some(Bytes::copy_from_slice(&mmap)))
    }

    /// Store one chunk under its content hash. Data that does not hash to
    /// `hash` is refused. Re-storing an existing chunk is a no-op.
    pub fn put(&self, hash: &ChunkHash, data: &[u8]) -> Result<()> {
        if content_hash(data) != *hash {
            bail!("content does not hash to {}", hex::encode(hash));
        }
        self.write_if_absent(hash, data)
    }

    /// Atomic write: temp file in the target shard, fsync, rename.
    fn write_if_absent(&self, hash: &ChunkHash, data: &[u8]) -> Result<()> {
        let path = self.chunk_path(hash);
        if path.exists() {
            return Ok(());
        }
        let dir = path.parent().context("chunk path has no parent")?;
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create shard dir: {}", dir.display()))?;

        let tmp = dir.join(format!("{}.{}.tmp", hex::encode(hash), std::process::id()));
        {
            let mut file = fs::File::create(&tmp)
                .with_context(|| format!("failed to create temp file: {}", tmp.display()))?;
            file.write_all(data).context("failed to write chunk data")?;
            file.sync_all().context("failed to sync chunk to disk")?;
        }
        fs::rename(&tmp, &path)
            .with_context(|| format!("failed to move chunk into place: {}", path.display()))?;

        tracing::trace!(hash = hex::encode(hash), bytes = data.len(), "chunk stored");
        Ok(())
    }

    fn chunk_path(&self, hash: &ChunkHash) -> PathBuf {
        let name = hex::encode(hash);
        let (shard, _) = name.split_at(2);
        self.root.join(shard).join(&name)
    }

    /// Chunk count and byte total, for the status surface. Walks the
    /// whole store; not for hot paths. Transient temp files are skipped.
    pub fn usage(&self) -> StoreUsage {
        let mut usage = StoreUsage::default();
        let Ok(shards) = fs::read_dir(&self.root) else {
            return usage;
        };
        for shard in shards.flatten() {
            let Ok(entries) = fs::read_dir(shard.path()) else {
                continue;
            };
            for entry in entries.flatten() {
                if entry.path().extension().is_some() {
                    continue;
                }
                usage.chunks += 1;
                if let Ok(meta) = entry.metadata() {
                    usage.bytes += meta.len();
                }
            }
        }
        usage
    }
}
