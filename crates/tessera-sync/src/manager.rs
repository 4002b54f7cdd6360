//! The arbitrary-data manager.
//!
//! The chain records arbitrary transactions whose payloads live off-chain
//! as content-addressed blobs, possibly split into chunks. This manager
//! keeps the local chunk store converging toward the payloads the chain
//! references: a scavenger task picks a transaction whose payload is
//! missing, asks connected peers which chunks they hold, and fetches the
//! missing ones. The symmetric serve side lives in the handlers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use tessera_blob::ChunkStore;
use tessera_core::config::SyncConfig;
use tessera_core::{content_hash, ChunkHash, Message, MessageKind, Signature};

use crate::chain::ChainIndex;
use crate::clock::Clock;
use crate::inflight::InflightSet;
use crate::net::{Network, Peer};
use crate::request_table::{RequestRecord, RequestState, RequestTable};
use crate::stats::SyncStats;

/// Budget for one outstanding request: the discovery poll deadline and the
/// TTL after which the janitor reclaims correlation state.
pub const REQUEST_TIMEOUT_MS: u64 = 5_000;

/// Scavenger inter-iteration sleep.
const SCAVENGE_INTERVAL: Duration = Duration::from_millis(2_000);

/// Discovery response poll step.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Process-wide controller for arbitrary-transaction payload transfer.
/// Construct one at node init, wrap it in an `Arc`, and hand clones to the
/// message dispatcher and the housekeeping timer.
pub struct ArbitraryDataManager {
    chain: Arc<dyn ChainIndex>,
    network: Arc<dyn Network>,
    clock: Arc<dyn Clock>,
    store: ChunkStore,
    config: SyncConfig,
    requests: RequestTable,
    inflight: InflightSet,
    stats: SyncStats,
    stop: watch::Sender<bool>,
}

impl ArbitraryDataManager {
    pub fn new(
        chain: Arc<dyn ChainIndex>,
        network: Arc<dyn Network>,
        clock: Arc<dyn Clock>,
        store: ChunkStore,
        config: SyncConfig,
    ) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            chain,
            network,
            clock,
            store,
            config,
            requests: RequestTable::new(),
            inflight: InflightSet::new(),
            stats: SyncStats::default(),
            stop,
        }
    }

    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    pub fn requests(&self) -> &RequestTable {
        &self.requests
    }

    pub fn inflight(&self) -> &InflightSet {
        &self.inflight
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    pub(crate) fn chain(&self) -> &dyn ChainIndex {
        self.chain.as_ref()
    }

    pub(crate) fn network(&self) -> &dyn Network {
        self.network.as_ref()
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub(crate) fn config(&self) -> &SyncConfig {
        &self.config
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Launch the scavenger task. The handle completes after `shutdown`.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let stopping = self.stop.subscribe();
        tokio::spawn(async move {
            manager.scavenge_loop(stopping).await;
        })
    }

    /// Signal the scavenger to exit. Interrupts an in-progress sleep.
    pub fn shutdown(&self) {
        let _ = self.stop.send(true);
    }

    async fn scavenge_loop(&self, mut stopping: watch::Receiver<bool>) {
        tracing::info!("arbitrary data scavenger running");
        loop {
            tokio::select! {
                _ = stopping.changed() => {}
                _ = tokio::time::sleep(SCAVENGE_INTERVAL) => {}
            }
            if *stopping.borrow() {
                break;
            }
            self.scavenge_once().await;
        }
        tracing::info!("arbitrary data scavenger stopped");
    }

    /// One scavenger pass: pick a random transaction whose payload we are
    /// missing and ask the network who has its chunks.
    async fn scavenge_once(&self) {
        let mut peers = self.network.handshaked_peers();
        peers.retain(|p| !p.is_misbehaving());

        // Don't fetch unless enough up-to-date peers are connected
        if peers.len() < self.config.min_peers {
            tracing::trace!(
                peers = peers.len(),
                min = self.config.min_peers,
                "below peer threshold, not fetching"
            );
            return;
        }

        let signatures = match self.chain.arbitrary_signatures() {
            Ok(signatures) => signatures,
            Err(e) => {
                tracing::error!(error = %e, "failed to list arbitrary transactions");
                return;
            }
        };

        let wanted: Vec<Signature> = signatures
            .into_iter()
            .filter(|sig| !self.has_local_data(sig))
            .collect();
        if wanted.is_empty() {
            return;
        }

        // Random pick keeps a fleet of nodes from converging on the same
        // transaction in lockstep
        let pick = wanted[rand::thread_rng().gen_range(0..wanted.len())];
        self.find(&pick).await;
    }

    /// Whether the payload for `signature` is already wholly local.
    /// Lookup failures count as held, so one bad row cannot pin the
    /// scavenger to it.
    fn has_local_data(&self, signature: &Signature) -> bool {
        match self.chain.arbitrary_tx(signature) {
            Ok(Some(tx)) => self.store.is_data_local(&tx),
            Ok(None) => true,
            Err(e) => {
                tracing::error!(sig = %signature, error = %e, "failed to load arbitrary transaction");
                true
            }
        }
    }

    // ── Discovery ─────────────────────────────────────────────────────────────

    /// Broadcast a hash-list request for `signature` and wait, bounded, for
    /// the response to be processed by the hash-list handler.
    ///
    /// Returns false only when the table entry vanished underneath us (the
    /// janitor swept it). A deadline with no response returns true: the
    /// response may still arrive late and will be handled normally.
    pub async fn find(&self, signature: &Signature) -> bool {
        let now = self.clock.now_millis();

        // Random ids; a collision with a live entry just redraws
        let id = loop {
            let candidate = rand::thread_rng().gen_range(1..u32::MAX);
            let record = RequestRecord::new(
                RequestState::Originated {
                    signature: *signature,
                },
                now,
            );
            if self.requests.insert_if_absent(candidate, record) {
                break candidate;
            }
        };

        tracing::info!(sig = %signature, id, "requesting chunk hash list");
        let message = Message::new(
            id,
            MessageKind::GetArbitraryDataFileList {
                signature: *signature,
            },
        );
        let build = move |_peer: &dyn Peer| Some(message.clone());
        self.network.broadcast(&build).await;

        // Poll until the handler marks the response processed
        let mut waited = 0u64;
        while waited < REQUEST_TIMEOUT_MS {
            tokio::time::sleep(POLL_INTERVAL).await;

            let Some(record) = self.requests.get(id) else {
                return false;
            };
            if record.state.signature().is_none() {
                return true;
            }

            waited += POLL_INTERVAL.as_millis() as u64;
        }

        tracing::info!(sig = %signature, id, "hash list request timed out");
        true
    }

    // ── Fetch ─────────────────────────────────────────────────────────────────

    /// Fetch one chunk from `peer` and persist it.
    ///
    /// One request, no retry; the caller may try again with another peer.
    /// `Ok(Some)` means the chunk arrived, verified, and was stored.
    /// `Ok(None)` means no usable reply, a content-hash mismatch, or that
    /// another fetch for this hash is already in flight. `Err` means the
    /// store write failed.
    pub async fn fetch_chunk(&self, peer: &dyn Peer, hash: ChunkHash) -> Result<Option<Bytes>> {
        if !self.inflight.try_acquire(hash, self.clock.now_millis()) {
            tracing::debug!(hash = hex::encode(&hash[..8]), "chunk fetch already in flight");
            return Ok(None);
        }

        tracing::info!(
            hash = hex::encode(&hash[..8]),
            peer = hex::encode(&peer.id()[..8]),
            "fetching chunk"
        );
        let reply = peer.request(MessageKind::GetArbitraryDataFile { hash }).await;
        self.inflight.release(&hash);

        let data = match reply {
            Some(Message {
                kind: MessageKind::ArbitraryDataFile { data },
                ..
            }) => data,
            Some(other) => {
                tracing::debug!(
                    hash = hex::encode(&hash[..8]),
                    reply = other.kind.name(),
                    "peer cannot provide chunk"
                );
                return Ok(None);
            }
            None => {
                tracing::info!(hash = hex::encode(&hash[..8]), "no reply to chunk request");
                return Ok(None);
            }
        };

        if content_hash(&data) != hash {
            tracing::warn!(
                hash = hex::encode(&hash[..8]),
                peer = hex::encode(&peer.id()[..8]),
                "chunk content does not match requested hash, discarding"
            );
            return Ok(None);
        }

        self.store
            .put(&hash, &data)
            .context("failed to persist fetched chunk")?;
        Ok(Some(data))
    }

    // ── Janitor ───────────────────────────────────────────────────────────────

    /// Drop correlation and in-flight entries older than the request
    /// timeout. Called from the host's housekeeping timer; idempotent.
    pub fn cleanup(&self, now: u64) {
        let cutoff = now.saturating_sub(REQUEST_TIMEOUT_MS);
        self.requests.remove_older_than(cutoff);
        self.inflight.remove_older_than(cutoff);
    }
}
