use crate::error::{IntegrityError, IntegrityFault, LedgerError};
use crate::{now_secs, pow, Block, Transaction};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Trait the storage backends implement to mirror the chain.
/// This lives in `ledger-core` to avoid a circular dependency.
pub trait BlockStore: Send + Sync {
    fn persist_block(&self, block: &Block) -> anyhow::Result<()>;
    /// Every stored block, ordered by index.
    fn load_all_blocks(&self) -> anyhow::Result<Vec<Block>>;
    fn clear(&self) -> anyhow::Result<()>;
    fn transactions_for(&self, address: &str) -> anyhow::Result<Vec<Transaction>>;
    fn stats(&self) -> anyhow::Result<StoreStats>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total_blocks: u64,
    pub total_transactions: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LedgerStats {
    pub total_blocks: usize,
    pub total_transactions: usize,
    pub pending_transactions: usize,
    pub difficulty: u32,
    pub mining_reward: f64,
    pub latest_block_hash: String,
}

/// The chain of mined blocks plus the buffer of admitted transactions.
#[derive(Clone, Debug)]
pub struct Ledger {
    chain: Vec<Block>,
    pending: Vec<Transaction>,
    difficulty: u32,
    mining_reward: f64,
}

impl Ledger {
    /// A ledger holding only a freshly mined genesis block.
    pub fn new(difficulty: u32, mining_reward: f64) -> Self {
        let mut genesis = Block::genesis();
        genesis.mine(difficulty);
        info!("Genesis block mined: {}", genesis.hash());
        Self {
            chain: vec![genesis],
            pending: Vec::new(),
            difficulty,
            mining_reward,
        }
    }

    /// Rebuilds a ledger from stored blocks, checking each one as it is appended.
    pub fn restore(
        difficulty: u32,
        mining_reward: f64,
        blocks: impl IntoIterator<Item = Block>,
    ) -> Result<Self, LedgerError> {
        let mut ledger = Self {
            chain: Vec::new(),
            pending: Vec::new(),
            difficulty,
            mining_reward,
        };
        for block in blocks {
            ledger.append_external_block(block)?;
        }
        if ledger.chain.is_empty() {
            return Err(LedgerError::EmptyRestore);
        }
        info!("Restored {} blocks", ledger.chain.len());
        Ok(ledger)
    }

    /// Discards every block and pending transaction and starts over from a new genesis.
    pub fn reset(&mut self, difficulty: u32, mining_reward: f64) {
        *self = Self::new(difficulty, mining_reward);
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn pending_transactions(&self) -> &[Transaction] {
        &self.pending
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn mining_reward(&self) -> f64 {
        self.mining_reward
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn latest_block(&self) -> &Block {
        // Only `restore` ever sees an empty chain, and it refuses to return one.
        &self.chain[self.chain.len() - 1]
    }

    pub fn block_at(&self, index: u64) -> Option<&Block> {
        usize::try_from(index).ok().and_then(|i| self.chain.get(i))
    }

    /// Admits `tx` to the pending buffer and returns the new pending count.
    pub fn submit_transaction(&mut self, tx: Transaction) -> Result<usize, LedgerError> {
        if let Err(e) = tx.validate() {
            warn!("Rejected transaction {tx}: {e}");
            return Err(e.into());
        }
        debug!("Accepted transaction {tx}");
        self.pending.push(tx);
        Ok(self.pending.len())
    }

    /// The unmined block that would hold every pending transaction plus the
    /// reward for `reward_address`. Leaves the ledger untouched.
    pub fn candidate_block(&self, reward_address: &str) -> Block {
        let mut txs = self.pending.clone();
        txs.push(Transaction::reward(reward_address, self.mining_reward));
        Block::new(
            self.chain.len() as u64,
            txs,
            self.latest_block().hash(),
            now_secs(),
        )
    }

    /// Appends a block produced from [`Ledger::candidate_block`] and clears the
    /// pending buffer.
    pub fn commit_block(&mut self, block: Block) -> Result<&Block, LedgerError> {
        if !block.is_valid() {
            return Err(LedgerError::InvalidBlock {
                index: block.index(),
            });
        }
        self.check_link(&block)?;
        info!("Block mined: {}", block.hash());
        self.chain.push(block);
        self.pending.clear();
        Ok(self.latest_block())
    }

    /// Packages the pending transactions and a reward into a new block, mines
    /// it at the current difficulty and appends it. An empty pending buffer
    /// still yields a block holding just the reward.
    pub fn mine_block(&mut self, reward_address: &str) -> Result<&Block, LedgerError> {
        let mut block = self.candidate_block(reward_address);
        info!("Mining block {}...", block.index());
        block.mine(self.difficulty);
        self.commit_block(block)
    }

    /// Appends a block that was mined elsewhere, e.g. one loaded from storage.
    pub fn append_external_block(&mut self, block: Block) -> Result<(), LedgerError> {
        if !block.is_valid() {
            warn!("Rejected external block {}: invalid", block.index());
            return Err(LedgerError::InvalidBlock {
                index: block.index(),
            });
        }
        if !self.chain.is_empty() {
            self.check_link(&block)?;
        }
        self.chain.push(block);
        Ok(())
    }

    fn check_link(&self, block: &Block) -> Result<(), LedgerError> {
        let tip = self.latest_block().hash();
        if block.previous_hash() != tip {
            warn!("Rejected block {}: previous hash mismatch", block.index());
            return Err(LedgerError::BrokenLink {
                index: block.index(),
                expected: tip.to_string(),
                actual: block.previous_hash().to_string(),
            });
        }
        Ok(())
    }

    /// Walks the chain from block 1 and reports the first block that fails.
    /// Proof-of-work is judged against the ledger's current difficulty.
    pub fn validate_chain(&self) -> Result<(), IntegrityError> {
        for pair in self.chain.windows(2) {
            let (previous, current) = (&pair[0], &pair[1]);
            let fail = |fault: IntegrityFault| {
                warn!("Block {} failed validation: {fault}", current.index());
                Err(IntegrityError {
                    index: current.index(),
                    fault,
                })
            };
            if !current.is_valid() {
                return fail(IntegrityFault::InvalidBlock);
            }
            if current.hash() != current.compute_hash() {
                return fail(IntegrityFault::HashMismatch);
            }
            if current.previous_hash() != previous.hash() {
                return fail(IntegrityFault::BrokenLink);
            }
            if !pow::meets_difficulty(current.hash(), self.difficulty) {
                return fail(IntegrityFault::InsufficientWork {
                    difficulty: self.difficulty,
                });
            }
        }
        Ok(())
    }

    pub fn is_chain_valid(&self) -> bool {
        self.validate_chain().is_ok()
    }

    fn chain_transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.chain.iter().flat_map(|b| b.transactions().iter())
    }

    /// Net amount received by `address` over mined blocks; pending
    /// transactions don't count.
    pub fn balance_of(&self, address: &str) -> f64 {
        self.chain_transactions().fold(0.0, |mut balance, tx| {
            if tx.sender == address {
                balance -= tx.amount;
            }
            if tx.recipient == address {
                balance += tx.amount;
            }
            balance
        })
    }

    pub fn transaction_count(&self, address: &str) -> usize {
        self.chain_transactions()
            .filter(|tx| tx.sender == address || tx.recipient == address)
            .count()
    }

    /// Everything ever issued as a mining reward.
    pub fn total_supply(&self) -> f64 {
        self.chain_transactions()
            .filter(|tx| tx.is_reward())
            .map(|tx| tx.amount)
            .sum()
    }

    pub fn statistics(&self) -> LedgerStats {
        LedgerStats {
            total_blocks: self.chain.len(),
            total_transactions: self.chain.iter().map(|b| b.transactions().len()).sum(),
            pending_transactions: self.pending.len(),
            difficulty: self.difficulty,
            mining_reward: self.mining_reward,
            latest_block_hash: self.latest_block().hash().to_string(),
        }
    }

    #[cfg(test)]
    pub(crate) fn chain_mut(&mut self) -> &mut Vec<Block> {
        &mut self.chain
    }

    #[cfg(test)]
    pub(crate) fn set_difficulty(&mut self, difficulty: u32) {
        self.difficulty = difficulty;
    }
}
