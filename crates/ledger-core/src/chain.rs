use anyhow::Result;
use chrono::Utc;
use num_bigint::BigUint;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::block::{genesis_block, is_valid_block, Block};
use crate::difficulty::next_difficulty;
use crate::error::{BlockError, ChainError};
use crate::transaction::{apply_in_place, validate_block_transactions, Transaction, UnspentSet};

/// Trait the storage backends implement to persist chain snapshots.
/// This lives in `ledger-core` to avoid a circular dependency.
pub trait ChainStore: Send + Sync {
    /// Persist a block just appended on top of the stored tip.
    fn put_block(&self, block: &Block) -> Result<()>;
    /// Replace the stored chain with `blocks`.
    fn save_chain(&self, blocks: &[Block]) -> Result<()>;
    /// The stored chain, or `None` if nothing has been saved yet.
    fn load_chain(&self) -> Result<Option<Vec<Block>>>;
    fn close(&self) -> Result<()>;
}

/// Σ 2^difficulty over the chain. Fork choice compares this, never length.
pub fn chain_work(blocks: &[Block]) -> BigUint {
    blocks
        .iter()
        .map(|b| BigUint::from(1u8) << b.difficulty)
        .sum()
}

/// Check a whole chain from genesis and return the unspent set it derives.
pub fn validate_chain(blocks: &[Block]) -> Result<UnspentSet, ChainError> {
    let Some(first) = blocks.first() else {
        return Err(ChainError::MissingGenesis);
    };
    if *first != genesis_block() {
        return Err(ChainError::UnexpectedGenesis {
            found: first.hash.clone(),
        });
    }

    let mut unspent = UnspentSet::new();
    for pair in blocks.windows(2) {
        let (prev, block) = (&pair[0], &pair[1]);
        is_valid_block(block, prev).map_err(|source| ChainError::InvalidBlock {
            index: block.index,
            source,
        })?;
        validate_block_transactions(&block.data, &unspent).map_err(|source| {
            ChainError::InvalidBlock {
                index: block.index,
                source: BlockError::Transactions {
                    index: block.index,
                    source,
                },
            }
        })?;
        apply_in_place(&block.data, &mut unspent);
    }
    Ok(unspent)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplaceOutcome {
    Replaced {
        old_height: u64,
        new_height: u64,
        old_work: BigUint,
        new_work: BigUint,
    },
    /// The candidate was valid but did not carry more work.
    NotBetter { local_work: BigUint, candidate_work: BigUint },
}

struct LedgerState {
    blocks: Vec<Block>,
    unspent: UnspentSet,
}

impl LedgerState {
    fn last(&self) -> &Block {
        // The chain always holds at least genesis.
        &self.blocks[self.blocks.len() - 1]
    }
}

/// The node's single owner of the chain and its derived unspent set.
///
/// Reads take a shared lock and return owned copies; `append` and `replace`
/// take the exclusive lock and either fully apply or leave state untouched.
pub struct Ledger {
    state: RwLock<LedgerState>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LedgerState {
                blocks: vec![Self::genesis()],
                unspent: UnspentSet::new(),
            }),
        }
    }

    /// The fixed first block every chain must start with.
    pub fn genesis() -> Block {
        genesis_block()
    }

    /// Rebuild a ledger from a stored chain. The chain is fully revalidated.
    pub fn from_chain(blocks: Vec<Block>) -> Result<Self, ChainError> {
        let unspent = validate_chain(&blocks)?;
        Ok(Self {
            state: RwLock::new(LedgerState { blocks, unspent }),
        })
    }

    pub fn last(&self) -> Block {
        self.state.read().last().clone()
    }

    pub fn height(&self) -> u64 {
        self.state.read().last().index
    }

    pub fn len(&self) -> usize {
        self.state.read().blocks.len()
    }

    /// Never true: a ledger always holds genesis.
    pub fn is_empty(&self) -> bool {
        self.state.read().blocks.is_empty()
    }

    pub fn snapshot(&self) -> Vec<Block> {
        self.state.read().blocks.clone()
    }

    pub fn unspent(&self) -> UnspentSet {
        self.state.read().unspent.clone()
    }

    pub fn chain_work(&self) -> BigUint {
        chain_work(&self.state.read().blocks)
    }

    pub fn next_difficulty(&self) -> u32 {
        next_difficulty(&self.state.read().blocks)
    }

    pub fn is_valid(&self) -> Result<(), ChainError> {
        validate_chain(&self.state.read().blocks).map(|_| ())
    }

    /// An unmined block on top of the current tip at the current difficulty.
    pub fn candidate(&self, data: Vec<Transaction>) -> Block {
        let state = self.state.read();
        let difficulty = next_difficulty(&state.blocks);
        Block::candidate(state.last(), data, difficulty, Utc::now())
    }

    pub fn append(&self, block: Block) -> Result<(), BlockError> {
        let mut state = self.state.write();
        is_valid_block(&block, state.last())?;
        validate_block_transactions(&block.data, &state.unspent).map_err(|source| {
            BlockError::Transactions {
                index: block.index,
                source,
            }
        })?;
        apply_in_place(&block.data, &mut state.unspent);
        info!(index = block.index, hash = %block.hash, difficulty = block.difficulty, "block appended");
        state.blocks.push(block);
        Ok(())
    }

    /// Swap in `candidate` if it is valid and carries strictly more work.
    pub fn replace(&self, candidate: Vec<Block>) -> Result<ReplaceOutcome, ChainError> {
        // Validation only reads the candidate, so it runs before the lock.
        let unspent = validate_chain(&candidate)?;
        let candidate_work = chain_work(&candidate);

        let mut state = self.state.write();
        let local_work = chain_work(&state.blocks);
        if candidate_work <= local_work {
            debug!(%local_work, %candidate_work, "candidate chain not better");
            return Ok(ReplaceOutcome::NotBetter {
                local_work,
                candidate_work,
            });
        }

        let old_height = state.last().index;
        state.blocks = candidate;
        state.unspent = unspent;
        let new_height = state.last().index;
        info!(old_height, new_height, %local_work, %candidate_work, "chain replaced");
        Ok(ReplaceOutcome::Replaced {
            old_height,
            new_height,
            old_work: local_work,
            new_work: candidate_work,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::pow::find_nonce;
    use crate::transaction::{sign_input, OutPoint, TxIn, TxOut};

    fn mined(prev: &Block, difficulty: u32) -> Block {
        let mut block = Block::candidate(prev, vec![], difficulty, Utc::now());
        find_nonce(&mut block);
        block
    }

    /// Genesis followed by blocks at the given difficulties.
    fn build(difficulties: &[u32]) -> Vec<Block> {
        let mut blocks = vec![Ledger::genesis()];
        for d in difficulties {
            let next = mined(blocks.last().unwrap(), *d);
            blocks.push(next);
        }
        blocks
    }

    #[test]
    fn new_ledger_holds_only_genesis() {
        let ledger = Ledger::new();
        assert_eq!(ledger.len(), 1);
        assert!(!ledger.is_empty());
        assert_eq!(ledger.last(), Ledger::genesis());
        assert_eq!(ledger.height(), 0);
        assert!(ledger.is_valid().is_ok());
        assert_eq!(ledger.chain_work(), BigUint::from(1u8));
    }

    #[test]
    fn append_accepts_valid_successor() {
        let ledger = Ledger::new();
        let mut block = ledger.candidate(vec![]);
        find_nonce(&mut block);
        ledger.append(block.clone()).unwrap();
        assert_eq!(ledger.last(), block);
        assert_eq!(ledger.height(), 1);
    }

    #[test]
    fn failed_append_leaves_ledger_unchanged() {
        let ledger = Ledger::new();
        let first = mined(&ledger.last(), 0);
        ledger.append(first).unwrap();
        let before = ledger.snapshot();

        let mut bad = mined(&ledger.last(), 0);
        bad.nonce += 1;
        assert!(matches!(ledger.append(bad), Err(BlockError::Hash { .. })));

        let out_of_order = mined(&Ledger::genesis(), 0);
        assert!(matches!(
            ledger.append(out_of_order),
            Err(BlockError::Index { expected: 2, actual: 1 })
        ));
        assert_eq!(ledger.snapshot(), before);
    }

    #[test]
    fn append_rejects_unfunded_transactions() {
        let ledger = Ledger::new();
        let txn = Transaction::new(
            vec![TxIn::unsigned(OutPoint::new("nowhere", 0))],
            vec![TxOut::new("addr", 1)],
        );
        let mut block = ledger.candidate(vec![txn]);
        find_nonce(&mut block);
        assert!(matches!(
            ledger.append(block),
            Err(BlockError::Transactions { index: 1, .. })
        ));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn snapshot_is_a_deep_copy() {
        let ledger = Ledger::new();
        let mut snapshot = ledger.snapshot();
        snapshot.push(mined(&Ledger::genesis(), 0));
        snapshot[0].nonce = 99;
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.last(), Ledger::genesis());
    }

    #[test]
    fn snapshot_revalidates() {
        let ledger = Ledger::new();
        for _ in 0..5 {
            let mut block = ledger.candidate(vec![]);
            find_nonce(&mut block);
            ledger.append(block).unwrap();
        }
        assert!(validate_chain(&ledger.snapshot()).is_ok());
        let restored = Ledger::from_chain(ledger.snapshot()).unwrap();
        assert_eq!(restored.snapshot(), ledger.snapshot());
    }

    #[test]
    fn valid_chain_validates_and_any_field_mutation_breaks_it() {
        let chain = build(&[1, 2, 1, 3]);
        assert!(validate_chain(&chain).is_ok());

        for i in 1..chain.len() {
            let mutations: Vec<Box<dyn Fn(&mut Block)>> = vec![
                Box::new(|b: &mut Block| b.index += 1),
                Box::new(|b: &mut Block| b.hash = "0".repeat(64)),
                Box::new(|b: &mut Block| b.prev_hash.push('0')),
                Box::new(|b: &mut Block| b.timestamp = b.timestamp + chrono::Duration::nanoseconds(1)),
                Box::new(|b: &mut Block| b.difficulty += 1),
                Box::new(|b: &mut Block| b.nonce = b.nonce.wrapping_add(1)),
                Box::new(|b: &mut Block| b.data.push(Transaction::new(vec![], vec![]))),
            ];
            for mutate in mutations {
                let mut tampered = chain.clone();
                mutate(&mut tampered[i]);
                assert!(validate_chain(&tampered).is_err(), "block {i} mutation went unnoticed");
            }
        }
    }

    /// Block 1 pays a zero-value output to `owner`, block 2 spends it to `payee`.
    fn signed_chain(owner: &KeyPair, payee: &KeyPair) -> Vec<Block> {
        let mint = Transaction::new(vec![], vec![TxOut::new(owner.public_key_hex(), 0)]);
        let mut blocks = vec![Ledger::genesis()];
        let mut first = Block::candidate(&blocks[0], vec![mint.clone()], 1, Utc::now());
        find_nonce(&mut first);
        blocks.push(first);

        let unspent = validate_chain(&blocks).unwrap();
        let mut spend = Transaction::new(
            vec![TxIn::unsigned(OutPoint::new(mint.id, 0))],
            vec![TxOut::new(payee.public_key_hex(), 0)],
        );
        spend.inputs[0].signature = sign_input(&spend, 0, owner, &unspent).unwrap();
        let mut second = Block::candidate(&blocks[1], vec![spend], 1, Utc::now());
        find_nonce(&mut second);
        blocks.push(second);
        blocks
    }

    #[test]
    fn swapping_a_signature_invalidates_the_block() {
        let alice = KeyPair::generate().unwrap();
        let bob = KeyPair::generate().unwrap();
        let chain = signed_chain(&alice, &bob);
        let unspent = validate_chain(&chain).unwrap();
        assert_eq!(unspent.len(), 1);
        assert!(unspent.iter().all(|(_, out)| out.address == bob.public_key_hex()));

        // A fresh signature from the same key is just as valid on its own.
        let mut tampered = chain.clone();
        let before_spend = validate_chain(&chain[..2]).unwrap();
        let resigned = sign_input(&tampered[2].data[0], 0, &alice, &before_spend).unwrap();
        assert_ne!(resigned, tampered[2].data[0].inputs[0].signature);
        tampered[2].data[0].inputs[0].signature = resigned;

        assert!(matches!(
            validate_chain(&tampered),
            Err(ChainError::InvalidBlock {
                index: 2,
                source: BlockError::Hash { .. }
            })
        ));
    }

    #[test]
    fn genesis_must_match_by_value() {
        let mut chain = build(&[0]);
        // A deserialised copy of genesis is accepted.
        let json = serde_json::to_string(&chain).unwrap();
        let decoded: Vec<Block> = serde_json::from_str(&json).unwrap();
        assert!(validate_chain(&decoded).is_ok());

        chain[0].nonce = 1;
        assert!(matches!(
            validate_chain(&chain),
            Err(ChainError::UnexpectedGenesis { .. })
        ));
        assert_eq!(validate_chain(&[]), Err(ChainError::MissingGenesis));
    }

    #[test]
    fn chain_work_sums_powers_of_two() {
        assert_eq!(chain_work(&build(&[1, 1, 1])), BigUint::from(7u8));
        assert_eq!(chain_work(&build(&[1, 3])), BigUint::from(11u8));
        let mut heavy = build(&[]);
        heavy[0].difficulty = 200;
        assert_eq!(chain_work(&heavy), BigUint::from(1u8) << 200u32);
    }

    #[test]
    fn total_work_beats_length() {
        let ledger = Ledger::new();
        let long_light = build(&[1, 1, 1]);
        assert!(matches!(
            ledger.replace(long_light.clone()),
            Ok(ReplaceOutcome::Replaced { new_height: 3, .. })
        ));

        let short_heavy = build(&[1, 3]);
        assert!(matches!(
            ledger.replace(short_heavy.clone()),
            Ok(ReplaceOutcome::Replaced { old_height: 3, new_height: 2, .. })
        ));
        assert_eq!(ledger.snapshot(), short_heavy);

        // And the longer, lighter chain cannot take it back.
        assert!(matches!(
            ledger.replace(long_light),
            Ok(ReplaceOutcome::NotBetter { .. })
        ));
        assert_eq!(ledger.snapshot(), short_heavy);
    }

    #[test]
    fn equal_work_is_not_better() {
        let ledger = Ledger::from_chain(build(&[2])).unwrap();
        let rival = build(&[2]);
        assert!(matches!(
            ledger.replace(rival),
            Ok(ReplaceOutcome::NotBetter { .. })
        ));
    }

    #[test]
    fn invalid_candidate_is_rejected_before_work_comparison() {
        let ledger = Ledger::new();
        let mut heavy = build(&[4, 4]);
        heavy[2].prev_hash = "elsewhere".into();
        assert!(matches!(
            ledger.replace(heavy),
            Err(ChainError::InvalidBlock { index: 2, .. })
        ));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn concurrent_appends_never_fork_the_ledger() {
        use std::sync::Arc;
        let ledger = Arc::new(Ledger::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    let mut accepted = 0;
                    for _ in 0..10 {
                        let mut block = ledger.candidate(vec![]);
                        find_nonce(&mut block);
                        if ledger.append(block).is_ok() {
                            accepted += 1;
                        }
                    }
                    accepted
                })
            })
            .collect();
        let accepted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(ledger.len(), accepted + 1);
        assert!(ledger.is_valid().is_ok());
    }
}
