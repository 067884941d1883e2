#![allow(dead_code)]

use std::fs;

use chrono::Utc;
use ledger_core::{pow::find_nonce, Block, Ledger};
use ledger_storage::SledStore;
use tempfile::{tempdir, TempDir};

pub fn create_temp_store() -> (TempDir, SledStore) {
    // Create a temporary directory for the sled database
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let db_path = temp_dir.path().to_path_buf();
    (
        temp_dir,
        SledStore::open(&db_path).expect("Failed to open SledStore"),
    )
}

pub fn teardown_store(temp_dir: TempDir, store: SledStore) {
    let db_path = temp_dir.path().to_path_buf();
    store.clear().expect("Failed to clear the store");
    drop(store);
    temp_dir.close().expect("Failed to delete temp dir");
    let _ = fs::remove_dir_all(&db_path);
    assert!(!db_path.exists(), "Database directory should be removed");
}

/// Genesis followed by `count` mined blocks at difficulty `difficulty`.
pub fn mined_chain(count: usize, difficulty: u32) -> Vec<Block> {
    let mut blocks = vec![Ledger::genesis()];
    for _ in 0..count {
        let mut next = Block::candidate(blocks.last().unwrap(), vec![], difficulty, Utc::now());
        find_nonce(&mut next);
        blocks.push(next);
    }
    blocks
}
