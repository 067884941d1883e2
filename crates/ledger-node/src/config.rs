use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use ledger_core::MiningStrategy;

use crate::cluster::Peer;
use crate::constants::{DEFAULT_EVENT_QUEUE, DEFAULT_TRANSFER_QUEUE, DEFAULT_TRANSFER_WORKERS};

#[derive(Parser, Debug)]
#[command(name = "ledger-node")]
#[command(about = "Gossip-replicated proof-of-work ledger node")]
pub struct Args {
    /// Cluster-unique node id (random if omitted)
    #[arg(long, env = "LEDGER_NODE_ID")]
    pub node_id: Option<String>,

    /// HTTP address, e.g. 127.0.0.1:8080
    #[arg(long, env = "LEDGER_HTTP_LISTEN", default_value = "127.0.0.1:8080")]
    pub http_listen: SocketAddr,

    /// UDP address for block gossip
    #[arg(long, env = "LEDGER_GOSSIP_LISTEN", default_value = "127.0.0.1:7946")]
    pub gossip_listen: SocketAddr,

    /// TCP address serving chain transfers
    #[arg(long, env = "LEDGER_TRANSFER_LISTEN", default_value = "127.0.0.1:7947")]
    pub transfer_listen: SocketAddr,

    /// Cluster member as id=gossip_addr,transfer_addr (repeatable)
    #[arg(long = "peer", value_name = "ID=GOSSIP,TRANSFER")]
    pub peers: Vec<Peer>,

    /// Data directory for sled; in-memory only when omitted
    #[arg(long, env = "LEDGER_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Capacity of the replication event queue
    #[arg(long, default_value_t = DEFAULT_EVENT_QUEUE)]
    pub event_queue: usize,

    /// Accepted transfer connections waiting for a worker
    #[arg(long, default_value_t = DEFAULT_TRANSFER_QUEUE)]
    pub transfer_queue: usize,

    /// Concurrent chain transfers
    #[arg(long, default_value_t = DEFAULT_TRANSFER_WORKERS)]
    pub transfer_workers: usize,

    /// Search nonces on all cores
    #[arg(long)]
    pub parallel_mining: bool,
}

/// Everything a node needs to start, resolved from [`Args`].
#[derive(Clone, Debug)]
pub struct NodeConfig {
    pub node_id: String,
    pub http_listen: SocketAddr,
    pub gossip_listen: SocketAddr,
    pub transfer_listen: SocketAddr,
    pub peers: Vec<Peer>,
    pub data_dir: Option<PathBuf>,
    pub event_queue: usize,
    pub transfer_queue: usize,
    pub transfer_workers: usize,
    pub mining: MiningStrategy,
}

impl NodeConfig {
    /// A node bound to ephemeral loopback ports with no peers and no storage.
    pub fn ephemeral(node_id: impl Into<String>) -> Self {
        let any = SocketAddr::from(([127, 0, 0, 1], 0));
        Self {
            node_id: node_id.into(),
            http_listen: any,
            gossip_listen: any,
            transfer_listen: any,
            peers: Vec::new(),
            data_dir: None,
            event_queue: DEFAULT_EVENT_QUEUE,
            transfer_queue: DEFAULT_TRANSFER_QUEUE,
            transfer_workers: DEFAULT_TRANSFER_WORKERS,
            mining: MiningStrategy::Sequential,
        }
    }
}

impl From<Args> for NodeConfig {
    fn from(args: Args) -> Self {
        Self {
            node_id: args
                .node_id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            http_listen: args.http_listen,
            gossip_listen: args.gossip_listen,
            transfer_listen: args.transfer_listen,
            peers: args.peers,
            data_dir: args.data_dir,
            event_queue: args.event_queue.max(1),
            transfer_queue: args.transfer_queue.max(1),
            transfer_workers: args.transfer_workers.max(1),
            mining: if args.parallel_mining {
                MiningStrategy::Parallel
            } else {
                MiningStrategy::Sequential
            },
        }
    }
}
