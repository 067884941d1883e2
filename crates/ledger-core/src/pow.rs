//! Proof-of-work: difficulty is a literal count of leading zero bits in the
//! block hash, not a numeric target.

use std::time::Instant;

use rayon::prelude::*;
use tracing::info;

use crate::block::Block;
use crate::constants::HASH_BITS;
use crate::error::BlockError;

pub fn count_leading_zero_bits(hash: &[u8]) -> u32 {
    let mut total = 0u32;
    for b in hash {
        if *b == 0 {
            total += 8;
        } else {
            total += b.leading_zeros();
            break;
        }
    }
    total
}

/// Leading zero bits of a hex hash, or `None` if it is not valid hex.
pub fn leading_zero_bits_hex(hash: &str) -> Option<u32> {
    hex::decode(hash).ok().map(|bytes| count_leading_zero_bits(&bytes))
}

pub fn hash_satisfies_difficulty(hash: &str, difficulty: u32) -> bool {
    check_difficulty(hash, difficulty).is_ok()
}

pub(crate) fn check_difficulty(hash: &str, difficulty: u32) -> Result<(), BlockError> {
    if difficulty == 0 {
        return Ok(());
    }
    let found = leading_zero_bits_hex(hash).unwrap_or(0);
    if difficulty > HASH_BITS || found < difficulty {
        return Err(BlockError::Difficulty {
            required: difficulty,
            found,
        });
    }
    Ok(())
}

/// Search nonces sequentially until the block hash satisfies the block's
/// difficulty. Unbounded; callers must not hold the ledger lock.
pub fn find_nonce(block: &mut Block) {
    let start = Instant::now();
    loop {
        block.hash = block.compute_hash();
        if hash_satisfies_difficulty(&block.hash, block.difficulty) {
            break;
        }
        block.nonce = block.nonce.wrapping_add(1);
    }
    info!(
        index = block.index,
        nonce = block.nonce,
        difficulty = block.difficulty,
        elapsed_secs = start.elapsed().as_secs_f64(),
        "found block nonce"
    );
}

/// Same contract as [`find_nonce`], but splits the nonce space across the
/// rayon pool. The winning nonce is whichever thread finds one first.
pub fn find_nonce_parallel(block: &mut Block) {
    let start = Instant::now();
    let template = block.clone();
    let found = (block.nonce..u64::MAX).into_par_iter().find_any(|nonce| {
        let mut attempt = template.clone();
        attempt.nonce = *nonce;
        hash_satisfies_difficulty(&attempt.compute_hash(), attempt.difficulty)
    });

    match found {
        Some(nonce) => {
            block.nonce = nonce;
            block.hash = block.compute_hash();
            info!(
                index = block.index,
                nonce = block.nonce,
                difficulty = block.difficulty,
                elapsed_secs = start.elapsed().as_secs_f64(),
                "found block nonce (parallel)"
            );
        }
        None => {
            block.nonce = 0;
            find_nonce(block);
        }
    }
}
