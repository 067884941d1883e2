//! Account-less UTXO transactions.
//!
//! A transaction consumes outputs from the [`UnspentSet`] and creates new
//! ones. Spending authority is proven by signing the transaction id, so a
//! single signature per input commits to the whole output allocation.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::crypto::{self, KeyPair};
use crate::error::TxError;

/// Reference to one output of an earlier transaction.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub txn_out_id: String,
    pub txn_out_index: u64,
}

impl OutPoint {
    pub fn new(txn_out_id: impl Into<String>, txn_out_index: u64) -> Self {
        Self {
            txn_out_id: txn_out_id.into(),
            txn_out_index,
        }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txn_out_id, self.txn_out_index)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    pub txn_out_id: String,
    pub txn_out_index: u64,
    /// Hex of the fixed-width signature over the spending transaction's id.
    pub signature: String,
}

impl TxIn {
    /// An input with no signature yet; see [`sign_input`].
    pub fn unsigned(outpoint: OutPoint) -> Self {
        Self {
            txn_out_id: outpoint.txn_out_id,
            txn_out_index: outpoint.txn_out_index,
            signature: String::new(),
        }
    }

    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.txn_out_id.clone(), self.txn_out_index)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    /// Hex-encoded public key of the owner.
    pub address: String,
    pub amount: u64,
}

impl TxOut {
    pub fn new(address: impl Into<String>, amount: u64) -> Self {
        Self {
            address: address.into(),
            amount,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    #[serde(rename = "txn_in")]
    pub inputs: Vec<TxIn>,
    #[serde(rename = "txn_out")]
    pub outputs: Vec<TxOut>,
}

impl Transaction {
    /// Build a transaction and stamp it with its derived id.
    pub fn new(inputs: Vec<TxIn>, outputs: Vec<TxOut>) -> Self {
        let mut txn = Self {
            id: String::new(),
            inputs,
            outputs,
        };
        txn.id = transaction_id(&txn);
        txn
    }
}

/// Outputs that are still spendable, keyed by where they were created.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UnspentSet {
    outputs: BTreeMap<OutPoint, TxOut>,
}

impl UnspentSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<&TxOut> {
        self.outputs.get(outpoint)
    }

    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.outputs.contains_key(outpoint)
    }

    pub fn insert(&mut self, outpoint: OutPoint, output: TxOut) {
        self.outputs.insert(outpoint, output);
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OutPoint, &TxOut)> {
        self.outputs.iter()
    }
}

impl FromIterator<(OutPoint, TxOut)> for UnspentSet {
    fn from_iter<I: IntoIterator<Item = (OutPoint, TxOut)>>(iter: I) -> Self {
        Self {
            outputs: iter.into_iter().collect(),
        }
    }
}

fn write_str(hasher: &mut Sha256, s: &str) {
    hasher.update((s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}

/// Digest over every input reference followed by every output, in list order.
pub fn transaction_id(txn: &Transaction) -> String {
    let mut hasher = Sha256::new();
    for input in &txn.inputs {
        write_str(&mut hasher, &input.txn_out_id);
        hasher.update(input.txn_out_index.to_le_bytes());
    }
    for output in &txn.outputs {
        write_str(&mut hasher, &output.address);
        hasher.update(output.amount.to_le_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Check that `input` spends an existing output and is signed by its owner.
/// Returns the referenced output on success.
pub fn validate_input<'a>(
    input: &TxIn,
    txn: &Transaction,
    unspent: &'a UnspentSet,
) -> Result<&'a TxOut, TxError> {
    let outpoint = input.outpoint();
    let Some(referenced) = unspent.get(&outpoint) else {
        return Err(TxError::MissingOutput {
            txid: txn.id.clone(),
            outpoint,
        });
    };
    let public_key = crypto::decode_public_key(&referenced.address).map_err(|source| {
        TxError::InvalidOwner {
            txid: txn.id.clone(),
            outpoint: outpoint.clone(),
            source,
        }
    })?;
    let signature = hex::decode(&input.signature).unwrap_or_default();
    if !crypto::verify(txn.id.as_bytes(), &signature, &public_key) {
        return Err(TxError::BadSignature {
            txid: txn.id.clone(),
            outpoint,
        });
    }
    Ok(referenced)
}

pub fn validate_transaction(txn: &Transaction, unspent: &UnspentSet) -> Result<(), TxError> {
    let expected = transaction_id(txn);
    if txn.id != expected {
        return Err(TxError::IdMismatch {
            expected,
            actual: txn.id.clone(),
        });
    }

    // Listing one output twice would count its amount twice.
    let mut seen = HashSet::with_capacity(txn.inputs.len());
    for input in &txn.inputs {
        let outpoint = input.outpoint();
        if !seen.insert(outpoint.clone()) {
            return Err(TxError::DoubleSpend {
                txid: txn.id.clone(),
                outpoint,
            });
        }
    }

    let overflow = || TxError::AmountOverflow {
        txid: txn.id.clone(),
    };
    let mut total_in = 0u64;
    for input in &txn.inputs {
        let referenced = validate_input(input, txn, unspent)?;
        total_in = total_in.checked_add(referenced.amount).ok_or_else(overflow)?;
    }
    let mut total_out = 0u64;
    for output in &txn.outputs {
        total_out = total_out.checked_add(output.amount).ok_or_else(overflow)?;
    }

    if total_in != total_out {
        return Err(TxError::Conservation {
            txid: txn.id.clone(),
            inputs: total_in,
            outputs: total_out,
        });
    }
    Ok(())
}

/// Validate a block's transactions as a set. Double-spends across the set are
/// reported before any per-transaction check runs.
pub fn validate_block_transactions(
    txns: &[Transaction],
    unspent: &UnspentSet,
) -> Result<(), TxError> {
    let mut spent = HashSet::new();
    for txn in txns {
        for input in &txn.inputs {
            let outpoint = input.outpoint();
            if !spent.insert(outpoint.clone()) {
                return Err(TxError::DoubleSpend {
                    txid: txn.id.clone(),
                    outpoint,
                });
            }
        }
    }

    for txn in txns {
        validate_transaction(txn, unspent)?;
    }
    Ok(())
}

/// Returns the set that results from applying `txns`. The input set is left
/// untouched so alternate chains can be replayed before anything is committed.
pub fn apply_transactions(txns: &[Transaction], unspent: &UnspentSet) -> UnspentSet {
    let mut next = unspent.clone();
    apply_in_place(txns, &mut next);
    next
}

/// [`apply_transactions`] on an owned set, for callers that already hold the
/// only copy.
pub(crate) fn apply_in_place(txns: &[Transaction], unspent: &mut UnspentSet) {
    for txn in txns {
        for input in &txn.inputs {
            unspent.outputs.remove(&input.outpoint());
        }
    }
    for txn in txns {
        for (position, output) in txn.outputs.iter().enumerate() {
            unspent.insert(OutPoint::new(txn.id.clone(), position as u64), output.clone());
        }
    }
}

/// Sign the input at `input_index` with `key_pair`, returning the hex signature.
/// The key must own the referenced output.
pub fn sign_input(
    txn: &Transaction,
    input_index: usize,
    key_pair: &KeyPair,
    unspent: &UnspentSet,
) -> Result<String, TxError> {
    let input = txn
        .inputs
        .get(input_index)
        .ok_or_else(|| TxError::InputOutOfRange {
            txid: txn.id.clone(),
            index: input_index,
        })?;
    let outpoint = input.outpoint();
    let referenced = unspent
        .get(&outpoint)
        .ok_or_else(|| TxError::MissingOutput {
            txid: txn.id.clone(),
            outpoint: outpoint.clone(),
        })?;
    if referenced.address != key_pair.public_key_hex() {
        return Err(TxError::NotOwner {
            txid: txn.id.clone(),
            outpoint,
        });
    }
    let signature = key_pair.sign(txn.id.as_bytes())?;
    Ok(hex::encode(signature))
}
