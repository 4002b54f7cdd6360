//! Message model for the arbitrary-data protocol.
//!
//! These are the shapes the manager consumes and produces. Encoding and
//! decoding belong to the host node's codec; nothing here knows about bytes
//! on the wire. Every message carries a 32-bit id, and a response carries
//! the id of the request it answers.

use bytes::Bytes;

use crate::types::{BlockSummary, ChunkHash, Signature};

/// One protocol message: correlation id plus payload.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: u32,
    pub kind: MessageKind,
}

impl Message {
    pub fn new(id: u32, kind: MessageKind) -> Self {
        Self { id, kind }
    }
}

/// Payload variants of the arbitrary-data protocol.
#[derive(Debug, Clone)]
pub enum MessageKind {
    /// Ask for a transaction's complete payload.
    GetArbitraryData { signature: Signature },

    /// Complete payload response.
    ArbitraryData { signature: Signature, data: Bytes },

    /// Ask which of a transaction's chunks the receiver holds.
    GetArbitraryDataFileList { signature: Signature },

    /// Hash-list response: the subset of the manifest the sender holds.
    ArbitraryDataFileList {
        signature: Signature,
        hashes: Vec<ChunkHash>,
    },

    /// Ask for one chunk by content hash.
    GetArbitraryDataFile { hash: ChunkHash },

    /// Chunk contents. The hash is implied: BLAKE3 of the data.
    ArbitraryDataFile { data: Bytes },

    /// Definitive "no such chunk" response.
    ArbitraryDataFileUnknown { hash: ChunkHash },

    /// Chain-sync block summaries. An *empty* list doubles as the legacy
    /// "no such chunk" reply; older peers expect that form.
    BlockSummaries { summaries: Vec<BlockSummary> },
}

impl MessageKind {
    /// Protocol-level label, for dispatch tables and logs.
    pub fn name(&self) -> &'static str {
        match self {
            MessageKind::GetArbitraryData { .. } => "GET_ARBITRARY_DATA",
            MessageKind::ArbitraryData { .. } => "ARBITRARY_DATA",
            MessageKind::GetArbitraryDataFileList { .. } => "GET_ARBITRARY_DATA_FILE_LIST",
            MessageKind::ArbitraryDataFileList { .. } => "ARBITRARY_DATA_FILE_LIST",
            MessageKind::GetArbitraryDataFile { .. } => "GET_ARBITRARY_DATA_FILE",
            MessageKind::ArbitraryDataFile { .. } => "ARBITRARY_DATA_FILE",
            MessageKind::ArbitraryDataFileUnknown { .. } => "ARBITRARY_DATA_FILE_UNKNOWN",
            MessageKind::BlockSummaries { .. } => "BLOCK_SUMMARIES",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::content_hash;

    #[test]
    fn response_carries_request_id() {
        let request = Message::new(
            42,
            MessageKind::GetArbitraryDataFile {
                hash: content_hash(b"chunk"),
            },
        );
        let reply = Message::new(
            request.id,
            MessageKind::ArbitraryDataFile {
                data: Bytes::from_static(b"chunk"),
            },
        );
        assert_eq!(reply.id, 42);
    }

    #[test]
    fn names_are_distinct() {
        let a = MessageKind::GetArbitraryDataFile {
            hash: content_hash(b"x"),
        };
        let b = MessageKind::ArbitraryDataFile {
            data: Bytes::new(),
        };
        assert_ne!(a.name(), b.name());
    }
}
