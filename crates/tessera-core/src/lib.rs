//! tessera-core: shared types, the wire-message model, and configuration.
//! All other tessera crates depend on this one.

pub mod config;
pub mod message;
pub mod types;

pub use message::{Message, MessageKind};
pub use types::{content_hash, ArbitraryTx, BlockSummary, ChunkHash, PeerId, Signature};
