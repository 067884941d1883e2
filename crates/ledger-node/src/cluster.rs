use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use async_trait::async_trait;
use ledger_core::Block;
use serde::{Deserialize, Serialize};

use crate::error::NodeError;

/// A cluster member and the two addresses replication needs from it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub id: String,
    pub gossip_addr: SocketAddr,
    pub transfer_addr: SocketAddr,
}

impl Peer {
    pub fn new(id: impl Into<String>, gossip_addr: SocketAddr, transfer_addr: SocketAddr) -> Self {
        Self {
            id: id.into(),
            gossip_addr,
            transfer_addr,
        }
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={},{}", self.id, self.gossip_addr, self.transfer_addr)
    }
}

/// Parses `id=gossip_addr,transfer_addr`.
impl FromStr for Peer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, addrs) = s
            .split_once('=')
            .ok_or_else(|| format!("peer `{s}` must look like id=gossip_addr,transfer_addr"))?;
        let (gossip, transfer) = addrs
            .split_once(',')
            .ok_or_else(|| format!("peer `{s}` is missing a transfer address"))?;
        let id = id.trim();
        if id.is_empty() {
            return Err(format!("peer `{s}` has an empty id"));
        }
        let gossip_addr = gossip
            .trim()
            .parse()
            .map_err(|e| format!("bad gossip address in `{s}`: {e}"))?;
        let transfer_addr = transfer
            .trim()
            .parse()
            .map_err(|e| format!("bad transfer address in `{s}`: {e}"))?;
        Ok(Peer::new(id, gossip_addr, transfer_addr))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "block.new")]
    NewBlock,
}

/// The gossip payload announcing a freshly mined block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEvent {
    pub event: EventKind,
    pub block: Block,
    pub node_id: String,
}

impl BlockEvent {
    pub fn new_block(block: Block, node_id: impl Into<String>) -> Self {
        Self {
            event: EventKind::NewBlock,
            block,
            node_id: node_id.into(),
        }
    }
}

/// Membership and broadcast, as replication sees them.
#[async_trait]
pub trait Cluster: Send + Sync {
    fn local_id(&self) -> &str;

    /// Every known member other than this node.
    fn peers(&self) -> Vec<Peer>;

    fn peer(&self, id: &str) -> Option<Peer> {
        self.peers().into_iter().find(|p| p.id == id)
    }

    async fn broadcast(&self, event: &BlockEvent) -> Result<(), NodeError>;
}
