//! Difficulty retargeting.
//!
//! Every [`DIFFICULTY_ADJUSTMENT_INTERVAL`] blocks the time taken for the last
//! window is compared with the expected `BLOCK_GENERATION_INTERVAL *
//! DIFFICULTY_ADJUSTMENT_INTERVAL` seconds. More than twice as fast adds one
//! bit of difficulty, more than twice as slow removes one, anything in between
//! keeps it. The step is always exactly one bit: oscillation is bounded at the
//! cost of slow adaptation, and that trade-off is intentional.

use tracing::debug;

use crate::block::Block;
use crate::constants::{BLOCK_GENERATION_INTERVAL, DIFFICULTY_ADJUSTMENT_INTERVAL};

/// Difficulty the block after the tip of `blocks` must be mined at.
pub fn next_difficulty(blocks: &[Block]) -> u32 {
    let Some(last) = blocks.last() else {
        return 0;
    };
    if last.index % DIFFICULTY_ADJUSTMENT_INTERVAL == 0 && last.index != 0 {
        adjusted_difficulty(blocks, last)
    } else {
        last.difficulty
    }
}

fn adjusted_difficulty(blocks: &[Block], last: &Block) -> u32 {
    let reference_index = last.index - DIFFICULTY_ADJUSTMENT_INTERVAL;
    let Some(reference) = blocks.iter().rev().find(|b| b.index == reference_index) else {
        return last.difficulty;
    };

    let expected_ms = BLOCK_GENERATION_INTERVAL * DIFFICULTY_ADJUSTMENT_INTERVAL as i64 * 1000;
    let actual_ms = (last.timestamp - reference.timestamp).num_milliseconds();

    let next = if actual_ms < expected_ms / 2 {
        reference.difficulty.saturating_add(1)
    } else if actual_ms > expected_ms * 2 {
        reference.difficulty.saturating_sub(1)
    } else {
        reference.difficulty
    };
    debug!(
        at = last.index,
        expected_ms,
        actual_ms,
        from = reference.difficulty,
        to = next,
        "difficulty retarget"
    );
    next
}
