use ledger_core::{BlockError, ChainError};
use thiserror::Error;

/// Failures at the replication boundary. None of these stop the node; the
/// caller logs them and carries on.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("network error talking to {peer}: {source}")]
    Network {
        peer: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not decode payload from {peer}: {source}")]
    Decode {
        peer: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not encode payload: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("gossip payload of {size} bytes exceeds {limit}")]
    DatagramTooLarge { size: usize, limit: usize },
    #[error("transfer from {peer} exceeded {limit} bytes")]
    TransferTooLarge { peer: String, limit: u64 },
    #[error("unknown peer {0}")]
    UnknownPeer(String),
    #[error(transparent)]
    Block(#[from] BlockError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error("mining task failed: {0}")]
    Mining(String),
    #[error("background task failed: {0}")]
    Task(String),
    #[error("persisting chain failed: {0}")]
    Persist(String),
    #[error("replication queue is closed")]
    QueueClosed,
}

impl NodeError {
    pub(crate) fn network(peer: impl Into<String>, source: std::io::Error) -> Self {
        Self::Network {
            peer: peer.into(),
            source,
        }
    }
}
