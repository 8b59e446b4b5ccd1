use anyhow::Result;
use ledger_core::{Block, BlockStore, StoreStats, Transaction};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

/// Non-durable store for tests and throwaway nodes.
#[derive(Default)]
pub struct MemoryStore {
    blocks: Mutex<BTreeMap<u64, Block>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn blocks(&self) -> std::sync::MutexGuard<'_, BTreeMap<u64, Block>> {
        self.blocks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BlockStore for MemoryStore {
    fn persist_block(&self, block: &Block) -> Result<()> {
        self.blocks().insert(block.index(), block.clone());
        Ok(())
    }

    fn load_all_blocks(&self) -> Result<Vec<Block>> {
        Ok(self.blocks().values().cloned().collect())
    }

    fn clear(&self) -> Result<()> {
        self.blocks().clear();
        Ok(())
    }

    fn transactions_for(&self, address: &str) -> Result<Vec<Transaction>> {
        Ok(self
            .blocks()
            .values()
            .flat_map(|b| b.transactions().iter())
            .filter(|tx| tx.sender == address || tx.recipient == address)
            .cloned()
            .collect())
    }

    fn stats(&self) -> Result<StoreStats> {
        let blocks = self.blocks();
        Ok(StoreStats {
            total_blocks: blocks.len() as u64,
            total_transactions: blocks.values().map(|b| b.transactions().len() as u64).sum(),
        })
    }
}
