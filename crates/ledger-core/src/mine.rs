use serde::{Deserialize, Serialize};
use tracing::info;

use crate::block::Block;
use crate::chain::Ledger;
use crate::error::BlockError;
use crate::pow::{find_nonce, find_nonce_parallel};
use crate::transaction::Transaction;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MiningStrategy {
    #[default]
    Sequential,
    /// Spread the nonce search over the rayon thread pool.
    Parallel,
}

/// Mine `data` on top of the current tip and append the result.
///
/// The candidate is taken under a read lock, the nonce search runs with no
/// lock held, and only the final append takes the write lock. If another
/// block landed in the meantime the append fails and nothing changes.
pub fn mine_next_block(
    ledger: &Ledger,
    data: Vec<Transaction>,
    strategy: MiningStrategy,
) -> Result<Block, BlockError> {
    let mut block = ledger.candidate(data);
    match strategy {
        MiningStrategy::Sequential => find_nonce(&mut block),
        MiningStrategy::Parallel => find_nonce_parallel(&mut block),
    }
    ledger.append(block.clone())?;
    info!(index = block.index, hash = %block.hash, "mined block");
    Ok(block)
}
