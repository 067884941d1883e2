/// Largest gossip datagram this node will send or accept.
pub const MAX_DATAGRAM_BYTES: usize = 60 * 1024;
/// Upper bound on a bulk chain transfer.
pub const MAX_TRANSFER_BYTES: u64 = 256 * 1024 * 1024;

pub const DEFAULT_EVENT_QUEUE: usize = 1000;
pub const DEFAULT_TRANSFER_QUEUE: usize = 100;
pub const DEFAULT_TRANSFER_WORKERS: usize = 8;
