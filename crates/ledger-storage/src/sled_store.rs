use anyhow::{Context, Result};
use ledger_core::{Block, BlockStore, StoreStats, Transaction};
use sled::{Db, IVec, Tree};
use std::path::Path;
use tracing::{debug, info};

const TREE_BLOCKS: &str = "blocks";
const TREE_TRANSACTIONS: &str = "transactions";
const KEY_TIP_HEIGHT: &[u8] = b"tip_height";
const KEY_TIP_HASH: &[u8] = b"tip_hash";

/// Blocks keyed by big-endian index, plus every transaction keyed by
/// (block index, position) so per-address lookups don't decode whole blocks.
#[derive(Clone)]
pub struct SledStore {
  db: Db,
  blocks: Tree,
  transactions: Tree,
}

fn tx_key(index: u64, position: u32) -> [u8; 12] {
  let mut key = [0u8; 12];
  key[..8].copy_from_slice(&index.to_be_bytes());
  key[8..].copy_from_slice(&position.to_be_bytes());
  key
}

impl SledStore {
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
    let db = sled::open(path.as_ref())
      .with_context(|| format!("opening sled store at {}", path.as_ref().display()))?;
    let blocks = db.open_tree(TREE_BLOCKS)?;
    let transactions = db.open_tree(TREE_TRANSACTIONS)?;
    info!("sled store opened");
    Ok(Self {
      db,
      blocks,
      transactions,
    })
  }

  pub fn get_block(&self, index: u64) -> Result<Option<Block>> {
    self
      .blocks
      .get(index.to_be_bytes())?
      .map(|ivec: IVec| {
        bincode::deserialize(&ivec).with_context(|| format!("decoding stored block {index}"))
      })
      .transpose()
  }

  pub fn tip_height(&self) -> Result<Option<u64>> {
    self
      .db
      .get(KEY_TIP_HEIGHT)?
      .map(|v| {
        let arr: [u8; 8] = v.as_ref().try_into().context("malformed tip height")?;
        Ok(u64::from_be_bytes(arr))
      })
      .transpose()
  }

  pub fn tip_hash(&self) -> Result<Option<String>> {
    Ok(
      self
        .db
        .get(KEY_TIP_HASH)?
        .map(|v| String::from_utf8_lossy(&v).into_owned()),
    )
  }

  pub fn close(&self) -> Result<()> {
    self.db.flush()?;
    Ok(())
  }
}

impl BlockStore for SledStore {
  fn persist_block(&self, block: &Block) -> Result<()> {
    let bytes = bincode::serialize(block)?;
    self.blocks.insert(block.index().to_be_bytes(), bytes)?;

    // Rows left by an earlier block at this index.
    for key in self.transactions.scan_prefix(block.index().to_be_bytes()).keys() {
      self.transactions.remove(key?)?;
    }
    for (position, tx) in block.transactions().iter().enumerate() {
      let key = tx_key(block.index(), position as u32);
      self.transactions.insert(key, bincode::serialize(tx)?)?;
    }

    // update tip
    self
      .db
      .insert(KEY_TIP_HEIGHT, &block.index().to_be_bytes())?;
    self.db.insert(KEY_TIP_HASH, block.hash().as_bytes())?;

    self.db.flush()?;
    debug!("block {} persisted", block.index());
    Ok(())
  }

  fn load_all_blocks(&self) -> Result<Vec<Block>> {
    self
      .blocks
      .iter()
      .values()
      .map(|value| -> Result<Block> {
        let value = value?;
        bincode::deserialize(&value).context("decoding stored block")
      })
      .collect()
  }

  fn clear(&self) -> Result<()> {
    self.blocks.clear()?;
    self.transactions.clear()?;
    self.db.remove(KEY_TIP_HEIGHT)?;
    self.db.remove(KEY_TIP_HASH)?;
    self.db.flush()?;
    info!("sled store cleared");
    Ok(())
  }

  fn transactions_for(&self, address: &str) -> Result<Vec<Transaction>> {
    let mut found = Vec::new();
    for value in self.transactions.iter().values() {
      let tx: Transaction = bincode::deserialize(&value?).context("decoding stored transaction")?;
      if tx.sender == address || tx.recipient == address {
        found.push(tx);
      }
    }
    Ok(found)
  }

  fn stats(&self) -> Result<StoreStats> {
    Ok(StoreStats {
      total_blocks: self.blocks.len() as u64,
      total_transactions: self.transactions.len() as u64,
    })
  }
}
