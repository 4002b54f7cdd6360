//! Chain storage port: what the manager needs from the transaction index.

use tessera_core::{ArbitraryTx, Signature};
use thiserror::Error;

/// Persistence-layer failure. Never fatal to the manager; iterations and
/// handlers log it and move on.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("chain storage failure: {0}")]
    Backend(String),
}

/// Read-side view of the transaction index.
///
/// Implemented by the host node's repository. Listings cover confirmed and
/// unconfirmed transactions alike; an unconfirmed payload is as fetchable
/// as a confirmed one.
pub trait ChainIndex: Send + Sync {
    /// Signatures of every arbitrary-type transaction the chain knows of.
    fn arbitrary_signatures(&self) -> Result<Vec<Signature>, ChainError>;

    /// Load one arbitrary transaction. None if the signature is unknown or
    /// the transaction is not of arbitrary type.
    fn arbitrary_tx(&self, signature: &Signature) -> Result<Option<ArbitraryTx>, ChainError>;
}
