//! A ledger replica: UDP block gossip, TCP chain transfer and a small HTTP
//! surface around a shared [`ledger_core::Ledger`].

pub mod api;
pub mod cluster;
pub mod config;
pub mod constants;
pub mod error;
pub mod gossip;
pub mod node;
pub mod replication;
pub mod runtime;
pub mod transfer;

pub use cluster::{BlockEvent, Cluster, EventKind, Peer};
pub use config::{Args, NodeConfig};
pub use error::NodeError;
pub use gossip::UdpGossip;
pub use node::Node;
pub use replication::{EventOutcome, ReplicationEvent};
pub use runtime::{launch, RunningNode};
pub use transfer::{fetch_chain, TransferServer};
