//! Durable chain snapshots. The ledger itself lives in memory; a store only
//! lets a restarted node resume from the last chain it accepted.

pub mod sled_store;

pub use sled_store::SledStore;
