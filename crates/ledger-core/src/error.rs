use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::transaction::OutPoint;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),
    #[error("invalid private key")]
    InvalidPrivateKey,
    #[error("failed to generate key material")]
    KeyGeneration,
    #[error("failed to sign message")]
    Signing,
}

/// Transaction-level validation failures. Every variant names the offending
/// transaction so a rejected block can be diagnosed from the log line alone.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TxError {
    #[error("transaction id was wrong: expected {expected} got {actual}")]
    IdMismatch { expected: String, actual: String },
    #[error("transaction {txid} references unspent output {outpoint} which does not exist")]
    MissingOutput { txid: String, outpoint: OutPoint },
    #[error("transaction {txid} failed signature verification for input {outpoint}")]
    BadSignature { txid: String, outpoint: OutPoint },
    #[error("transaction {txid} does not balance (total in: {inputs}, total out: {outputs})")]
    Conservation {
        txid: String,
        inputs: u64,
        outputs: u64,
    },
    #[error("output {outpoint} is spent twice (second spend in transaction {txid})")]
    DoubleSpend { txid: String, outpoint: OutPoint },
    #[error("transaction {txid} amounts overflow")]
    AmountOverflow { txid: String },
    #[error("transaction {txid} has no input at position {index}")]
    InputOutOfRange { txid: String, index: usize },
    #[error("output {outpoint} spent by transaction {txid} has an unusable owner address: {source}")]
    InvalidOwner {
        txid: String,
        outpoint: OutPoint,
        #[source]
        source: CryptoError,
    },
    #[error("key does not own output {outpoint} spent by transaction {txid}")]
    NotOwner { txid: String, outpoint: OutPoint },
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Structural block validation failures, in the order they are checked.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("index was wrong: expected {expected} got {actual}")]
    Index { expected: u64, actual: u64 },
    #[error("preceding hash was wrong: expected {expected} got {actual}")]
    PrevHash { expected: String, actual: String },
    #[error("block hash was wrong: expected {expected} got {actual}")]
    Hash { expected: String, actual: String },
    #[error("block is more than {tolerance_secs}s older than its predecessor (prev: {prev}, block: {block})")]
    TooOld {
        prev: DateTime<Utc>,
        block: DateTime<Utc>,
        tolerance_secs: i64,
    },
    #[error("block is more than {tolerance_secs}s newer than node time (block: {block}, now: {now})")]
    FromFuture {
        block: DateTime<Utc>,
        now: DateTime<Utc>,
        tolerance_secs: i64,
    },
    #[error("hash did not match required difficulty (required {required} leading zero bits, found {found})")]
    Difficulty { required: u32, found: u32 },
    #[error("block {index} carries invalid transactions: {source}")]
    Transactions {
        index: u64,
        #[source]
        source: TxError,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("genesis block was missing")]
    MissingGenesis,
    #[error("genesis block was unexpected (hash {found})")]
    UnexpectedGenesis { found: String },
    #[error("block {index} is invalid: {source}")]
    InvalidBlock {
        index: u64,
        #[source]
        source: BlockError,
    },
}
