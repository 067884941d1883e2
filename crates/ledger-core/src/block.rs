use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants::{GENESIS_HASH, HASH_SIZE, TIMESTAMP_TOLERANCE_SECS};
use crate::error::BlockError;
use crate::pow;
use crate::transaction::Transaction;

pub type Hash = [u8; HASH_SIZE];

/// Block timestamps travel and hash as RFC 3339 text with nanosecond precision.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

mod rfc3339_nanos {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let text = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&text)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub hash: String,
    pub prev_hash: String,
    #[serde(with = "rfc3339_nanos")]
    pub timestamp: DateTime<Utc>,
    pub difficulty: u32,
    pub nonce: u64,
    #[serde(default)]
    pub data: Vec<Transaction>,
}

impl Block {
    /// An unmined successor of `prev`: empty hash, nonce zero.
    pub fn candidate(
        prev: &Block,
        data: Vec<Transaction>,
        difficulty: u32,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            index: prev.index + 1,
            hash: String::new(),
            prev_hash: prev.hash.clone(),
            timestamp,
            difficulty,
            nonce: 0,
            data,
        }
    }

    /// Digest of the carried transactions in order. Each contributes its id
    /// and every input signature, since the id alone does not cover
    /// signatures.
    pub fn data_digest(&self) -> Hash {
        let mut hasher = Sha256::new();
        for txn in &self.data {
            hasher.update((txn.id.len() as u64).to_le_bytes());
            hasher.update(txn.id.as_bytes());
            hasher.update((txn.inputs.len() as u64).to_le_bytes());
            for input in &txn.inputs {
                hasher.update((input.signature.len() as u64).to_le_bytes());
                hasher.update(input.signature.as_bytes());
            }
        }
        hasher.finalize().into()
    }

    /// Hash preimage. Field order is part of the protocol: index, prev_hash,
    /// timestamp, difficulty, nonce, data digest. Text fields are length
    /// prefixed.
    pub fn hash_bytes(&self) -> Vec<u8> {
        let timestamp = format_timestamp(&self.timestamp);
        let mut bytes =
            Vec::with_capacity(8 + 8 + self.prev_hash.len() + 8 + timestamp.len() + 4 + 8 + 32);
        bytes.extend_from_slice(&self.index.to_le_bytes());
        bytes.extend_from_slice(&(self.prev_hash.len() as u64).to_le_bytes());
        bytes.extend_from_slice(self.prev_hash.as_bytes());
        bytes.extend_from_slice(&(timestamp.len() as u64).to_le_bytes());
        bytes.extend_from_slice(timestamp.as_bytes());
        bytes.extend_from_slice(&self.difficulty.to_le_bytes());
        bytes.extend_from_slice(&self.nonce.to_le_bytes());
        bytes.extend_from_slice(&self.data_digest());
        bytes
    }

    pub fn compute_hash(&self) -> String {
        hex::encode(Sha256::digest(self.hash_bytes()))
    }
}

pub fn genesis_block() -> Block {
    Block {
        index: 0,
        hash: GENESIS_HASH.to_string(),
        prev_hash: String::new(),
        timestamp: DateTime::<Utc>::default(),
        difficulty: 0,
        nonce: 0,
        data: vec![],
    }
}

/// Structural and proof-of-work checks of `candidate` as the successor of
/// `prev`, against the local clock.
pub fn is_valid_block(candidate: &Block, prev: &Block) -> Result<(), BlockError> {
    is_valid_block_at(candidate, prev, Utc::now())
}

pub fn is_valid_block_at(
    candidate: &Block,
    prev: &Block,
    now: DateTime<Utc>,
) -> Result<(), BlockError> {
    let expected_index = prev.index + 1;
    if candidate.index != expected_index {
        return Err(BlockError::Index {
            expected: expected_index,
            actual: candidate.index,
        });
    }
    if candidate.prev_hash != prev.hash {
        return Err(BlockError::PrevHash {
            expected: prev.hash.clone(),
            actual: candidate.prev_hash.clone(),
        });
    }
    let computed = candidate.compute_hash();
    if computed != candidate.hash {
        return Err(BlockError::Hash {
            expected: computed,
            actual: candidate.hash.clone(),
        });
    }
    is_valid_timestamp(candidate, prev, now)?;
    pow::check_difficulty(&candidate.hash, candidate.difficulty)
}

fn is_valid_timestamp(
    candidate: &Block,
    prev: &Block,
    now: DateTime<Utc>,
) -> Result<(), BlockError> {
    let tolerance = Duration::seconds(TIMESTAMP_TOLERANCE_SECS);
    if candidate.timestamp < prev.timestamp - tolerance {
        return Err(BlockError::TooOld {
            prev: prev.timestamp,
            block: candidate.timestamp,
            tolerance_secs: TIMESTAMP_TOLERANCE_SECS,
        });
    }
    if candidate.timestamp > now + tolerance {
        return Err(BlockError::FromFuture {
            block: candidate.timestamp,
            now,
            tolerance_secs: TIMESTAMP_TOLERANCE_SECS,
        });
    }
    Ok(())
}
