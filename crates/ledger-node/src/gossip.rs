use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cluster::{BlockEvent, Cluster, Peer};
use crate::constants::MAX_DATAGRAM_BYTES;
use crate::error::NodeError;
use crate::replication::ReplicationEvent;

/// Static-membership gossip over UDP: every broadcast is one JSON datagram
/// sent to each known peer, with no acknowledgement or retry.
pub struct UdpGossip {
    local_id: String,
    socket: UdpSocket,
    members: RwLock<Vec<Peer>>,
}

impl UdpGossip {
    pub async fn bind(
        local_id: impl Into<String>,
        addr: SocketAddr,
        seeds: Vec<Peer>,
    ) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        let gossip = Self {
            local_id: local_id.into(),
            socket,
            members: RwLock::new(Vec::new()),
        };
        for peer in seeds {
            gossip.add_peer(peer);
        }
        info!(node_id = %gossip.local_id, addr = %gossip.socket.local_addr()?, "gossip bound");
        Ok(gossip)
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Adds `peer`, replacing any member with the same id. Our own id is ignored.
    pub fn add_peer(&self, peer: Peer) {
        if peer.id == self.local_id {
            return;
        }
        let mut members = self.members.write();
        members.retain(|p| p.id != peer.id);
        debug!(peer = %peer, "peer joined");
        members.push(peer);
    }

    pub fn remove_peer(&self, id: &str) -> Option<Peer> {
        let mut members = self.members.write();
        let pos = members.iter().position(|p| p.id == id)?;
        debug!(peer_id = id, "peer left");
        Some(members.remove(pos))
    }

    /// Decode inbound datagrams into replication events until cancelled or
    /// until the event queue closes. Undecodable datagrams are dropped.
    pub async fn receive(
        self: Arc<Self>,
        events: mpsc::Sender<ReplicationEvent>,
        token: CancellationToken,
    ) {
        let mut buf = vec![0u8; MAX_DATAGRAM_BYTES];
        loop {
            let (len, from) = tokio::select! {
                _ = token.cancelled() => break,
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok(r) => r,
                    Err(e) => {
                        warn!(error = %e, "gossip receive failed");
                        continue;
                    }
                },
            };
            let event: BlockEvent = match serde_json::from_slice(&buf[..len]) {
                Ok(event) => event,
                Err(e) => {
                    warn!(%from, error = %e, "dropping undecodable gossip datagram");
                    continue;
                }
            };
            debug!(%from, origin = %event.node_id, index = event.block.index, "gossip received");
            if events.send(ReplicationEvent::NewBlock(event)).await.is_err() {
                break;
            }
        }
        debug!("gossip receive loop stopped");
    }
}

#[async_trait]
impl Cluster for UdpGossip {
    fn local_id(&self) -> &str {
        &self.local_id
    }

    fn peers(&self) -> Vec<Peer> {
        self.members.read().clone()
    }

    async fn broadcast(&self, event: &BlockEvent) -> Result<(), NodeError> {
        let payload = serde_json::to_vec(event).map_err(NodeError::Encode)?;
        if payload.len() > MAX_DATAGRAM_BYTES {
            return Err(NodeError::DatagramTooLarge {
                size: payload.len(),
                limit: MAX_DATAGRAM_BYTES,
            });
        }

        let mut first_failure = None;
        for peer in self.peers() {
            if let Err(e) = self.socket.send_to(&payload, peer.gossip_addr).await {
                warn!(peer_id = %peer.id, error = %e, "gossip send failed");
                first_failure.get_or_insert(NodeError::network(peer.id, e));
            }
        }
        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
