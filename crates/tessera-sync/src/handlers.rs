//! Inbound message handlers.
//!
//! The host node's dispatcher routes each arbitrary-data message here, one
//! invocation per message, possibly concurrent across peers. A message of
//! the wrong shape for its handler is dropped without comment; misdirected
//! traffic is not worth penalising a peer over.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tessera_core::{Message, MessageKind};

use crate::manager::ArbitraryDataManager;
use crate::net::Peer;
use crate::request_table::{RequestRecord, RequestState};

impl ArbitraryDataManager {
    /// GET_ARBITRARY_DATA: serve the whole payload if we hold it, else
    /// re-broadcast the request so another peer can.
    ///
    /// The id is recorded before any work so a second copy of the same
    /// request (from any peer) is dropped on arrival.
    pub async fn on_get_arbitrary_data(&self, peer: Arc<dyn Peer>, message: &Message) {
        let MessageKind::GetArbitraryData { signature } = &message.kind else {
            return;
        };
        let now = self.clock().now_millis();

        let record = RequestRecord::new(
            RequestState::Forwarding {
                signature: *signature,
                origin: peer.clone(),
            },
            now,
        );
        if !self.requests().insert_if_absent(message.id, record) {
            tracing::debug!(id = message.id, "duplicate payload request, ignoring");
            return;
        }

        let tx = match self.chain().arbitrary_tx(signature) {
            Ok(Some(tx)) => tx,
            Ok(None) => return,
            Err(e) => {
                tracing::error!(sig = %signature, error = %e, "failed to load arbitrary transaction");
                return;
            }
        };

        if self.store().is_data_local(&tx) {
            let data = match self.store().assemble(&tx) {
                Ok(Some(data)) => data,
                Ok(None) => return,
                Err(e) => {
                    tracing::error!(sig = %signature, error = %e, "failed to assemble payload");
                    return;
                }
            };

            // Mark the request answered before replying; the entry stays
            // live so later copies of the same id are still suppressed
            self.requests().insert(
                message.id,
                RequestRecord::new(
                    RequestState::Originated {
                        signature: *signature,
                    },
                    now,
                ),
            );

            let reply = Message::new(
                message.id,
                MessageKind::ArbitraryData {
                    signature: *signature,
                    data,
                },
            );
            if !peer.send(&reply).await {
                peer.disconnect("failed to send arbitrary data").await;
            }
            return;
        }

        // We don't hold it; let everyone except the requester try
        let requester = peer.id();
        let original = message.clone();
        let build = move |p: &dyn Peer| {
            if p.id() == requester {
                None
            } else {
                Some(original.clone())
            }
        };
        self.network().broadcast(&build).await;
    }

    /// GET_ARBITRARY_DATA_FILE_LIST: pure read-side responder. Reply with
    /// the subset of the manifest we hold locally; an unknown signature
    /// still gets an (empty) reply so the asker need not wait out a timeout.
    pub async fn on_get_arbitrary_data_file_list(&self, peer: Arc<dyn Peer>, message: &Message) {
        let MessageKind::GetArbitraryDataFileList { signature } = &message.kind else {
            return;
        };
        self.stats().file_list_requests.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            peer = hex::encode(&peer.id()[..8]),
            sig = %signature,
            "hash list requested"
        );

        let tx = match self.chain().arbitrary_tx(signature) {
            Ok(tx) => tx,
            Err(e) => {
                tracing::error!(sig = %signature, error = %e, "failed to load arbitrary transaction");
                return;
            }
        };

        let hashes = match tx {
            Some(tx) => self.store().held_chunks(&tx),
            None => Vec::new(),
        };

        let reply = Message::new(
            message.id,
            MessageKind::ArbitraryDataFileList {
                signature: *signature,
                hashes,
            },
        );
        if !peer.send(&reply).await {
            peer.disconnect("failed to send list of hashes").await;
        }
    }

    /// ARBITRARY_DATA_FILE_LIST: a peer answered a hash-list request we
    /// broadcast (or relayed). Validate the offer against the manifest,
    /// fetch what we are missing, and relay the list if we were asking on
    /// someone else's behalf.
    pub async fn on_arbitrary_data_file_list(&self, peer: Arc<dyn Peer>, message: &Message) {
        let MessageKind::ArbitraryDataFileList { signature, hashes } = &message.kind else {
            return;
        };

        let Some(request) = self.requests().get(message.id) else {
            tracing::debug!(id = message.id, "hash list for unknown request, ignoring");
            return;
        };
        // Already processed: a second reply for this id changes nothing
        let Some(expected) = request.state.signature().copied() else {
            return;
        };
        if expected != *signature {
            tracing::debug!(
                id = message.id,
                sig = %signature,
                "hash list signature mismatch, ignoring"
            );
            return;
        }
        if hashes.is_empty() {
            return;
        }

        let tx = match self.chain().arbitrary_tx(signature) {
            Ok(Some(tx)) => tx,
            Ok(None) => return,
            Err(e) => {
                tracing::error!(sig = %signature, error = %e, "failed to load arbitrary transaction");
                return;
            }
        };

        // Every offered hash must belong to the transaction's manifest; a
        // single stray hash discredits the whole offer
        for hash in hashes {
            if !tx.contains_chunk(hash) {
                tracing::info!(
                    hash = hex::encode(&hash[..8]),
                    sig = %signature,
                    "offer contains non-manifest hash, discarding"
                );
                return;
            }
        }

        // Response is now considered processed for this id
        let next = match request.state.origin() {
            Some(origin) => RequestState::Relaying { origin },
            None => RequestState::Resolved,
        };
        self.requests()
            .insert(message.id, RequestRecord::new(next, request.created_at));

        for hash in hashes {
            if self.store().has(hash) {
                continue;
            }
            if self.inflight().contains(hash) {
                tracing::debug!(hash = hex::encode(&hash[..8]), "already fetching chunk");
                continue;
            }
            match self.fetch_chunk(peer.as_ref(), *hash).await {
                Ok(Some(data)) => tracing::info!(
                    hash = hex::encode(&hash[..8]),
                    bytes = data.len(),
                    peer = hex::encode(&peer.id()[..8]),
                    "chunk stored"
                ),
                Ok(None) => tracing::info!(
                    hash = hex::encode(&hash[..8]),
                    peer = hex::encode(&peer.id()[..8]),
                    "chunk not received"
                ),
                Err(e) => tracing::error!(
                    hash = hex::encode(&hash[..8]),
                    error = %e,
                    "failed to store fetched chunk"
                ),
            }
        }

        // If we were relaying for another peer, they get the list as-is
        if let Some(origin) = request.state.origin() {
            if !origin.send(message).await {
                origin
                    .disconnect("failed to forward arbitrary data file list")
                    .await;
            }
            self.requests().insert(
                message.id,
                RequestRecord::new(RequestState::Resolved, request.created_at),
            );
        }
    }

    /// GET_ARBITRARY_DATA_FILE: stream one chunk back, or answer with a
    /// short definite "unknown" so the peer need not wait out its timeout.
    pub async fn on_get_arbitrary_data_file(&self, peer: Arc<dyn Peer>, message: &Message) {
        let MessageKind::GetArbitraryDataFile { hash } = &message.kind else {
            return;
        };
        self.stats().file_requests.fetch_add(1, Ordering::Relaxed);

        match self.store().get(hash) {
            Ok(Some(data)) => {
                tracing::debug!(
                    hash = hex::encode(&hash[..8]),
                    bytes = data.len(),
                    "serving chunk"
                );
                let reply = Message::new(message.id, MessageKind::ArbitraryDataFile { data });
                if !peer.send(&reply).await {
                    peer.disconnect("failed to send file").await;
                }
            }
            Ok(None) => {
                self.stats().file_unknown.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    hash = hex::encode(&hash[..8]),
                    peer = hex::encode(&peer.id()[..8]),
                    "chunk unknown"
                );
                // Older peers recognise only the empty-summaries sentinel
                let kind = if self.config().legacy_file_unknown {
                    MessageKind::BlockSummaries {
                        summaries: Vec::new(),
                    }
                } else {
                    MessageKind::ArbitraryDataFileUnknown { hash: *hash }
                };
                let reply = Message::new(message.id, kind);
                if !peer.send(&reply).await {
                    peer.disconnect("failed to send file-unknown response").await;
                }
            }
            Err(e) => {
                tracing::error!(hash = hex::encode(&hash[..8]), error = %e, "failed to read chunk");
            }
        }
    }
}
