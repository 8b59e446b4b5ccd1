//! Ledger operations as the HTTP layer sees them: the in-memory ledger is
//! the source of truth and every mined block is mirrored to the store.
//! Store failures are logged and reported, never fatal.

use crate::config::LedgerParams;
use ledger_core::{
    Block, BlockStore, IntegrityError, Ledger, LedgerError, LedgerStats, SharedLedger,
    Transaction,
};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("persistence failure: {0}")]
    Persistence(String),
}

#[derive(Debug, Serialize)]
pub struct Submitted {
    pub transaction: Transaction,
    pub pending_count: usize,
}

#[derive(Debug, Serialize)]
pub struct Mined {
    pub block: Block,
    pub reward: f64,
    pub persisted: bool,
}

#[derive(Debug, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub message: String,
    pub total_blocks: usize,
    pub failed_block: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct BalanceReport {
    pub address: String,
    pub balance: f64,
    pub transaction_count: usize,
}

#[derive(Debug, Serialize)]
pub struct NodeStats {
    #[serde(flatten)]
    pub ledger: LedgerStats,
    pub total_supply: f64,
    pub database_blocks: Option<u64>,
    pub database_transactions: Option<u64>,
}

pub struct LedgerService {
    ledger: SharedLedger,
    store: Arc<dyn BlockStore>,
    params: LedgerParams,
    cancel: AtomicBool,
    /// Held across a chain change and its store write, so the store sees
    /// mined blocks and resets in the same order as the ledger.
    mirror_lock: Mutex<()>,
}

impl LedgerService {
    /// Builds the ledger from whatever the store holds. An empty store gets
    /// the new genesis block. An unreadable or invalid one is wiped and
    /// replaced by a fresh chain.
    pub fn open(params: LedgerParams, store: Arc<dyn BlockStore>) -> Self {
        let ledger = match store.load_all_blocks() {
            Ok(blocks) if blocks.is_empty() => {
                info!("No blocks in store, starting from genesis");
                let ledger = Ledger::new(params.difficulty, params.mining_reward);
                mirror(store.as_ref(), ledger.latest_block());
                ledger
            }
            Ok(blocks) => {
                let count = blocks.len();
                match Ledger::restore(params.difficulty, params.mining_reward, blocks) {
                    Ok(ledger) => {
                        info!("Loaded {count} blocks from store");
                        ledger
                    }
                    Err(e) => {
                        warn!("Stored chain rejected ({e}), using a fresh chain");
                        start_fresh(params, store.as_ref())
                    }
                }
            }
            Err(e) => {
                warn!("Error loading blocks from store: {e:#}, using a fresh chain");
                start_fresh(params, store.as_ref())
            }
        };

        Self {
            ledger: SharedLedger::new(ledger),
            store,
            params,
            cancel: AtomicBool::new(false),
            mirror_lock: Mutex::new(()),
        }
    }

    fn mirror_guard(&self) -> MutexGuard<'_, ()> {
        self.mirror_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn chain(&self) -> Vec<Block> {
        self.ledger.read().chain().to_vec()
    }

    /// Negative or out-of-range indices are simply not found.
    pub fn block(&self, index: i64) -> Option<Block> {
        let index = u64::try_from(index).ok()?;
        self.ledger.read().block_at(index).cloned()
    }

    pub fn latest_block(&self) -> Block {
        self.ledger.read().latest_block().clone()
    }

    pub fn pending(&self) -> Vec<Transaction> {
        self.ledger.read().pending_transactions().to_vec()
    }

    pub fn submit(
        &self,
        sender: String,
        recipient: String,
        amount: f64,
    ) -> Result<Submitted, ServiceError> {
        let transaction = Transaction::new(sender, recipient, amount);
        let pending_count = self.ledger.submit_transaction(transaction.clone())?;
        Ok(Submitted {
            transaction,
            pending_count,
        })
    }

    /// Mines the pending transactions. Runs the whole proof-of-work search, so
    /// call it off the async executor.
    pub fn mine(&self, miner_address: &str) -> Result<Mined, ServiceError> {
        let _mirror = self.mirror_guard();
        let block = self.ledger.mine_pending_block(miner_address, &self.cancel)?;
        let persisted = mirror(self.store.as_ref(), &block);
        Ok(Mined {
            reward: self.params.mining_reward,
            block,
            persisted,
        })
    }

    /// Aborts any running and future nonce search. Used on shutdown.
    pub fn cancel_mining(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn validate(&self) -> ValidationReport {
        let ledger = self.ledger.read();
        let total_blocks = ledger.len();
        match ledger.validate_chain() {
            Ok(()) => ValidationReport {
                valid: true,
                message: "Blockchain is valid".to_string(),
                total_blocks,
                failed_block: None,
            },
            Err(IntegrityError { index, fault }) => ValidationReport {
                valid: false,
                message: format!("Blockchain is invalid: block {index}: {fault}"),
                total_blocks,
                failed_block: Some(index),
            },
        }
    }

    pub fn balance(&self, address: &str) -> BalanceReport {
        let (balance, in_memory_count) = {
            let ledger = self.ledger.read();
            (ledger.balance_of(address), ledger.transaction_count(address))
        };
        let transaction_count = match self.store.transactions_for(address) {
            Ok(txs) => txs.len(),
            Err(e) => {
                warn!("Error reading transactions for {address}: {e:#}");
                in_memory_count
            }
        };
        BalanceReport {
            address: address.to_string(),
            balance,
            transaction_count,
        }
    }

    pub fn stats(&self) -> NodeStats {
        let (ledger, total_supply) = {
            let ledger = self.ledger.read();
            (ledger.statistics(), ledger.total_supply())
        };
        let stored = self
            .store
            .stats()
            .map_err(|e| warn!("Error reading store stats: {e:#}"))
            .ok();
        NodeStats {
            ledger,
            total_supply,
            database_blocks: stored.map(|s| s.total_blocks),
            database_transactions: stored.map(|s| s.total_transactions),
        }
    }

    /// Wipes the store and starts a new chain. Returns whether the new genesis
    /// was persisted. If the store can't be cleared the ledger is left untouched.
    pub fn reset(&self) -> Result<bool, ServiceError> {
        let _mirror = self.mirror_guard();
        self.store
            .clear()
            .map_err(|e| ServiceError::Persistence(format!("{e:#}")))?;
        self.ledger
            .reset(self.params.difficulty, self.params.mining_reward);
        info!("Ledger reset to genesis");
        Ok(mirror(self.store.as_ref(), &self.latest_block()))
    }
}

/// New ledger over a store whose contents were rejected. The old records are
/// dropped so blocks mined from here on don't sit behind them.
fn start_fresh(params: LedgerParams, store: &dyn BlockStore) -> Ledger {
    let ledger = Ledger::new(params.difficulty, params.mining_reward);
    match store.clear() {
        Ok(()) => {
            mirror(store, ledger.latest_block());
        }
        Err(e) => warn!("Error clearing rejected store: {e:#}"),
    }
    ledger
}

/// Writes `block` to the store, logging instead of failing.
fn mirror(store: &dyn BlockStore, block: &Block) -> bool {
    match store.persist_block(block) {
        Ok(()) => true,
        Err(e) => {
            warn!("Error saving block {}: {e:#}", block.index());
            false
        }
    }
}
