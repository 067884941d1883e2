use anyhow::{bail, Context, Result};
use ledger_core::{Block, ChainStore};
use sled::{Batch, Db, IVec, Tree};
use std::path::Path;
use tracing::{debug, info};

const TREE_BLOCKS: &str = "blocks";

#[derive(Clone)]
pub struct SledStore {
  db: Db,
  blocks: Tree,
}

impl SledStore {
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
    let path = path.as_ref();
    let db = sled::open(path).with_context(|| format!("opening sled at {}", path.display()))?;
    let blocks = db.open_tree(TREE_BLOCKS)?;
    info!(path = %path.display(), "sled store opened");
    Ok(Self { db, blocks })
  }

  pub fn get_block(&self, index: u64) -> Result<Option<Block>> {
    self
      .blocks
      .get(index.to_be_bytes())?
      .map(|ivec| decode_block(index, &ivec))
      .transpose()
  }

  /// The highest stored block. Keys are big-endian so it is the last entry.
  pub fn tip(&self) -> Result<Option<Block>> {
    self
      .blocks
      .last()?
      .map(|(key, value)| decode_block(decode_key(&key)?, &value))
      .transpose()
  }

  pub fn tip_height(&self) -> Result<Option<u64>> {
    Ok(self.tip()?.map(|b| b.index))
  }

  pub fn tip_hash(&self) -> Result<Option<String>> {
    Ok(self.tip()?.map(|b| b.hash))
  }

  /// Drop every stored block.
  pub fn clear(&self) -> Result<()> {
    self.blocks.clear()?;
    self.db.flush()?;
    Ok(())
  }
}

fn decode_key(key: &[u8]) -> Result<u64> {
  let key: [u8; 8] = key.try_into().context("block key is not 8 bytes")?;
  Ok(u64::from_be_bytes(key))
}

fn decode_block(index: u64, bytes: &IVec) -> Result<Block> {
  bincode::deserialize(bytes).with_context(|| format!("stored block {index} is corrupt"))
}

impl ChainStore for SledStore {
  fn put_block(&self, block: &Block) -> Result<()> {
    let bytes = bincode::serialize(block)?;
    self.blocks.insert(block.index.to_be_bytes(), bytes)?;
    self.db.flush()?;
    debug!(index = block.index, "block persisted");
    Ok(())
  }

  fn save_chain(&self, blocks: &[Block]) -> Result<()> {
    let mut batch = Batch::default();
    for key in self.blocks.iter().keys() {
      batch.remove(key?);
    }
    for block in blocks {
      batch.insert(block.index.to_be_bytes().to_vec(), bincode::serialize(block)?);
    }
    // Removals and inserts land atomically.
    self.blocks.apply_batch(batch)?;
    self.db.flush()?;
    info!(blocks = blocks.len(), "chain snapshot persisted");
    Ok(())
  }

  fn load_chain(&self) -> Result<Option<Vec<Block>>> {
    if self.blocks.is_empty() {
      return Ok(None);
    }
    let mut chain = Vec::with_capacity(self.blocks.len());
    // Big-endian keys iterate in index order.
    for entry in self.blocks.iter() {
      let (key, value) = entry?;
      let index = decode_key(&key)?;
      if index != chain.len() as u64 {
        bail!("stored chain has a gap at index {}", chain.len());
      }
      chain.push(decode_block(index, &value)?);
    }
    Ok(Some(chain))
  }

  fn close(&self) -> Result<()> {
    self.db.flush()?;
    Ok(())
  }
}
