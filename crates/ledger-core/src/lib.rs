//! Consensus core of the ledger: transactions, blocks, proof-of-work,
//! difficulty retargeting and the fork-choice rule.

pub mod block;
pub mod chain;
pub mod constants;
pub mod crypto;
pub mod difficulty;
pub mod error;
pub mod mine;
pub mod pow;
pub mod transaction;

pub use block::{genesis_block, is_valid_block, Block, Hash};
pub use chain::{chain_work, validate_chain, ChainStore, Ledger, ReplaceOutcome};
pub use error::{BlockError, ChainError, CryptoError, TxError};
pub use mine::{mine_next_block, MiningStrategy};
pub use transaction::{
    apply_transactions, transaction_id, validate_block_transactions, validate_input,
    validate_transaction, OutPoint, Transaction, TxIn, TxOut, UnspentSet,
};
