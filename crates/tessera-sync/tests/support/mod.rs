//! In-memory collaborators for driving the manager in tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use tessera_blob::ChunkStore;
use tessera_core::config::SyncConfig;
use tessera_core::{content_hash, ArbitraryTx, ChunkHash, Message, MessageKind, PeerId, Signature};
use tessera_sync::{ArbitraryDataManager, ChainError, ChainIndex, Clock, Network, Peer};

// ── Clock ─────────────────────────────────────────────────────────────────────

/// Hand-cranked clock so TTL behavior is testable without real waiting.
pub struct ManualClock(AtomicU64);

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self(AtomicU64::new(start))
    }

    pub fn advance(&self, millis: u64) {
        self.0.fetch_add(millis, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

// ── Chain ─────────────────────────────────────────────────────────────────────

/// Transaction index backed by a map. Set `fail` to make every call fail.
#[derive(Default)]
pub struct MockChain {
    txs: Mutex<HashMap<Signature, ArbitraryTx>>,
    pub fail: AtomicBool,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tx: ArbitraryTx) {
        self.txs.lock().unwrap().insert(tx.signature, tx);
    }
}

impl ChainIndex for MockChain {
    fn arbitrary_signatures(&self) -> Result<Vec<Signature>, ChainError> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(ChainError::Backend("injected failure".into()));
        }
        Ok(self.txs.lock().unwrap().keys().copied().collect())
    }

    fn arbitrary_tx(&self, signature: &Signature) -> Result<Option<ArbitraryTx>, ChainError> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(ChainError::Backend("injected failure".into()));
        }
        Ok(self.txs.lock().unwrap().get(signature).cloned())
    }
}

// ── Peers ─────────────────────────────────────────────────────────────────────

/// A scripted peer: records everything sent to it and serves chunk
/// requests out of a local map, answering with the legacy empty-summaries
/// sentinel for anything it does not hold.
pub struct MockPeer {
    id: PeerId,
    pub misbehaving: bool,
    /// Chunks this peer can serve, by content hash.
    pub chunks: Mutex<HashMap<ChunkHash, Bytes>>,
    /// Flip to false to make every send fail.
    pub send_ok: AtomicBool,
    /// Delay applied to `request`, to widen race windows in tests.
    pub delay_ms: AtomicU64,
    pub sent: Mutex<Vec<Message>>,
    pub requested: Mutex<Vec<ChunkHash>>,
    pub disconnected: Mutex<Option<String>>,
}

impl MockPeer {
    pub fn new(id_byte: u8) -> Arc<Self> {
        Arc::new(Self {
            id: [id_byte; 32],
            misbehaving: false,
            chunks: Mutex::new(HashMap::new()),
            send_ok: AtomicBool::new(true),
            delay_ms: AtomicU64::new(0),
            sent: Mutex::new(Vec::new()),
            requested: Mutex::new(Vec::new()),
            disconnected: Mutex::new(None),
        })
    }

    pub fn misbehaving_peer(id_byte: u8) -> Arc<Self> {
        let mut peer = Self::new(id_byte);
        Arc::get_mut(&mut peer).unwrap().misbehaving = true;
        peer
    }

    /// A peer holding the given chunk payloads.
    pub fn with_chunks(id_byte: u8, payloads: &[&[u8]]) -> Arc<Self> {
        let peer = Self::new(id_byte);
        let mut chunks = peer.chunks.lock().unwrap();
        for payload in payloads {
            chunks.insert(content_hash(payload), Bytes::copy_from_slice(payload));
        }
        drop(chunks);
        peer
    }

    pub fn sent_messages(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }

    pub fn disconnect_reason(&self) -> Option<String> {
        self.disconnected.lock().unwrap().clone()
    }

    pub fn requested_hashes(&self) -> Vec<ChunkHash> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl Peer for MockPeer {
    fn id(&self) -> PeerId {
        self.id
    }

    fn is_misbehaving(&self) -> bool {
        self.misbehaving
    }

    async fn send(&self, message: &Message) -> bool {
        self.sent.lock().unwrap().push(message.clone());
        self.send_ok.load(Ordering::Relaxed)
    }

    async fn request(&self, kind: MessageKind) -> Option<Message> {
        let delay = self.delay_ms.load(Ordering::Relaxed);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        match kind {
            MessageKind::GetArbitraryDataFile { hash } => {
                self.requested.lock().unwrap().push(hash);
                let chunk = self.chunks.lock().unwrap().get(&hash).cloned();
                match chunk {
                    Some(data) => Some(Message::new(0, MessageKind::ArbitraryDataFile { data })),
                    None => Some(Message::new(
                        0,
                        MessageKind::BlockSummaries {
                            summaries: Vec::new(),
                        },
                    )),
                }
            }
            _ => None,
        }
    }

    async fn disconnect(&self, reason: &str) {
        *self.disconnected.lock().unwrap() = Some(reason.to_string());
    }
}

// ── Network ───────────────────────────────────────────────────────────────────

/// Transport fan-out over a list of mock peers. Broadcast messages are
/// recorded globally and delivered to each peer's `sent` log.
#[derive(Default)]
pub struct MockNetwork {
    peers: Mutex<Vec<Arc<MockPeer>>>,
    pub broadcasts: Mutex<Vec<Message>>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_peer(&self, peer: Arc<MockPeer>) {
        self.peers.lock().unwrap().push(peer);
    }

    pub fn broadcast_count(&self) -> usize {
        self.broadcasts.lock().unwrap().len()
    }

    pub fn first_broadcast(&self) -> Option<Message> {
        self.broadcasts.lock().unwrap().first().cloned()
    }
}

#[async_trait]
impl Network for MockNetwork {
    fn handshaked_peers(&self) -> Vec<Arc<dyn Peer>> {
        self.peers
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.clone() as Arc<dyn Peer>)
            .collect()
    }

    async fn broadcast(&self, build: &(dyn for<'a> Fn(&'a dyn Peer) -> Option<Message> + Send + Sync)) {
        let peers: Vec<Arc<MockPeer>> = self.peers.lock().unwrap().clone();
        for peer in peers {
            if let Some(message) = build(peer.as_ref()) {
                self.broadcasts.lock().unwrap().push(message.clone());
                peer.send(&message).await;
            }
        }
    }
}

// ── Node harness ──────────────────────────────────────────────────────────────

/// A manager wired to mocks, plus handles to everything around it.
pub struct TestNode {
    pub manager: Arc<ArbitraryDataManager>,
    pub chain: Arc<MockChain>,
    pub network: Arc<MockNetwork>,
    pub clock: Arc<ManualClock>,
    pub store: ChunkStore,
    _dir: tempfile::TempDir,
}

pub fn node() -> TestNode {
    node_with(SyncConfig::default())
}

pub fn node_with(config: SyncConfig) -> TestNode {
    let dir = tempfile::tempdir().unwrap();
    let store = ChunkStore::open(dir.path()).unwrap();
    let chain = Arc::new(MockChain::new());
    let network = Arc::new(MockNetwork::new());
    let clock = Arc::new(ManualClock::new(1_000_000));

    let manager = Arc::new(ArbitraryDataManager::new(
        chain.clone(),
        network.clone(),
        clock.clone(),
        store.clone(),
        config,
    ));

    TestNode {
        manager,
        chain,
        network,
        clock,
        store,
        _dir: dir,
    }
}

/// An arbitrary transaction whose payload is the concatenation of
/// `payloads`, plus each chunk's (hash, bytes) pair in manifest order.
pub fn tx_with_chunks(sig_byte: u8, payloads: &[&[u8]]) -> (ArbitraryTx, Vec<(ChunkHash, Bytes)>) {
    let blob: Vec<u8> = payloads.concat();
    let chunks: Vec<(ChunkHash, Bytes)> = payloads
        .iter()
        .map(|p| (content_hash(p), Bytes::copy_from_slice(p)))
        .collect();
    let tx = ArbitraryTx {
        signature: Signature([sig_byte; 64]),
        blob_hash: content_hash(&blob),
        chunk_hashes: chunks.iter().map(|(h, _)| *h).collect(),
    };
    (tx, chunks)
}
