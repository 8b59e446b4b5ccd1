//! Thread-safe handle over a [`Ledger`].
//!
//! All writers (submit, mine, append, reset) are serialised by one mutex.
//! Mining prepares its candidate under a read lock, runs the nonce search with
//! no state lock held and commits under the write lock, so readers are never
//! stuck behind a long proof-of-work search.

use crate::error::LedgerError;
use crate::{Block, Ledger, MineOutcome, Transaction};
use std::sync::atomic::AtomicBool;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{info, warn};

pub struct SharedLedger {
    state: RwLock<Ledger>,
    writer: Mutex<()>,
}

impl SharedLedger {
    pub fn new(ledger: Ledger) -> Self {
        Self {
            state: RwLock::new(ledger),
            writer: Mutex::new(()),
        }
    }

    /// Read access to the current state. Held guards block commits, so keep them short.
    pub fn read(&self) -> RwLockReadGuard<'_, Ledger> {
        // Writes only happen through infallible steps, so a poisoned lock still holds a consistent ledger.
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Ledger> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn exclusive(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn submit_transaction(&self, tx: Transaction) -> Result<usize, LedgerError> {
        let _writer = self.exclusive();
        self.write().submit_transaction(tx)
    }

    /// Mines the pending transactions plus a reward for `reward_address`.
    /// Setting `cancel` aborts the search and leaves the pending buffer as it was.
    pub fn mine_block(
        &self,
        reward_address: &str,
        cancel: &AtomicBool,
    ) -> Result<Block, LedgerError> {
        self.mine(reward_address, cancel, false)
    }

    /// Like [`SharedLedger::mine_block`], but refuses to mine a reward-only
    /// block. The emptiness check and the mining happen under one writer lock.
    pub fn mine_pending_block(
        &self,
        reward_address: &str,
        cancel: &AtomicBool,
    ) -> Result<Block, LedgerError> {
        self.mine(reward_address, cancel, true)
    }

    fn mine(
        &self,
        reward_address: &str,
        cancel: &AtomicBool,
        require_pending: bool,
    ) -> Result<Block, LedgerError> {
        let _writer = self.exclusive();
        let (mut candidate, difficulty) = {
            let ledger = self.read();
            if require_pending && ledger.pending_transactions().is_empty() {
                return Err(LedgerError::NothingPending);
            }
            (ledger.candidate_block(reward_address), ledger.difficulty())
        };

        info!("Mining block {}...", candidate.index());
        match candidate.mine_until(difficulty, cancel) {
            MineOutcome::Mined { attempts } => {
                info!("Block {} found after {attempts} attempts", candidate.index());
            }
            MineOutcome::Canceled { attempts } => {
                warn!("Mining of block {} canceled", candidate.index());
                return Err(LedgerError::MiningCanceled {
                    index: candidate.index(),
                    attempts,
                });
            }
        }

        self.write().commit_block(candidate).cloned()
    }

    pub fn append_external_block(&self, block: Block) -> Result<(), LedgerError> {
        let _writer = self.exclusive();
        self.write().append_external_block(block)
    }

    pub fn reset(&self, difficulty: u32, mining_reward: f64) {
        let _writer = self.exclusive();
        // Mine the new genesis before taking the write lock.
        let fresh = Ledger::new(difficulty, mining_reward);
        *self.write() = fresh;
    }
}
