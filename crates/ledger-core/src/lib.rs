pub mod canonical;
pub mod chain;
pub mod constants;
pub mod error;
pub mod mine;
pub mod shared;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub use chain::{BlockStore, Ledger, LedgerStats, StoreStats};
pub use error::{IntegrityError, IntegrityFault, LedgerError, TransactionError};
pub use shared::SharedLedger;

use constants::{CANCEL_POLL_INTERVAL, GENESIS_PREVIOUS_HASH, SYSTEM_SENDER};

/// Seconds since the Unix epoch, with sub-second precision.
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: String,
    pub recipient: String,
    pub amount: f64,
    #[serde(default = "now_secs")]
    pub timestamp: f64,
}

impl Transaction {
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>, amount: f64) -> Self {
        Self::with_timestamp(sender, recipient, amount, now_secs())
    }

    pub fn with_timestamp(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: f64,
        timestamp: f64,
    ) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            amount,
            timestamp,
        }
    }

    /// System-issued mining reward.
    pub fn reward(recipient: impl Into<String>, amount: f64) -> Self {
        Self::new(SYSTEM_SENDER, recipient, amount)
    }

    pub fn is_reward(&self) -> bool {
        self.sender == SYSTEM_SENDER
    }

    pub fn validate(&self) -> Result<(), TransactionError> {
        if self.sender.is_empty() {
            return Err(TransactionError::EmptySender);
        }
        if self.recipient.is_empty() {
            return Err(TransactionError::EmptyRecipient);
        }
        // Written so that NaN is rejected too.
        if !(self.amount > 0.0) {
            return Err(TransactionError::NonPositiveAmount(self.amount));
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    fn canonical_value(&self) -> Value {
        json!({
            "sender": self.sender,
            "recipient": self.recipient,
            "amount": self.amount,
            "timestamp": self.timestamp,
        })
    }
}

impl std::fmt::Display for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}: {}", self.sender, self.recipient, self.amount)
    }
}

/// Result of a cancellable nonce search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MineOutcome {
    Mined { attempts: u64 },
    Canceled { attempts: u64 },
}

/// A block of transactions. The record form carries the stored `hash`, which
/// is kept verbatim on decode so tampering shows up as a hash mismatch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    index: u64,
    transactions: Vec<Transaction>,
    previous_hash: String,
    timestamp: f64,
    nonce: u64,
    hash: String,
}

impl Block {
    pub fn new(
        index: u64,
        transactions: Vec<Transaction>,
        previous_hash: impl Into<String>,
        timestamp: f64,
    ) -> Self {
        Self::with_nonce(index, transactions, previous_hash, timestamp, 0)
    }

    pub fn with_nonce(
        index: u64,
        transactions: Vec<Transaction>,
        previous_hash: impl Into<String>,
        timestamp: f64,
        nonce: u64,
    ) -> Self {
        let mut block = Self {
            index,
            transactions,
            previous_hash: previous_hash.into(),
            timestamp,
            nonce,
            hash: String::new(),
        };
        block.hash = block.compute_hash();
        block
    }

    /// Unmined genesis block: index 0, no transactions, sentinel back-link.
    pub fn genesis() -> Self {
        Self::new(0, Vec::new(), GENESIS_PREVIOUS_HASH, now_secs())
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn hash_input(&self) -> String {
        self.hash_input_with_nonce(self.nonce)
    }

    fn hash_input_with_nonce(&self, nonce: u64) -> String {
        let txs: Vec<Value> = self
            .transactions
            .iter()
            .map(Transaction::canonical_value)
            .collect();
        let value = json!({
            "index": self.index,
            "transactions": txs,
            "previous_hash": self.previous_hash,
            "timestamp": self.timestamp,
            "nonce": nonce,
        });
        canonical::to_canonical_string(&value)
    }

    pub fn compute_hash(&self) -> String {
        self.hash_with_nonce(self.nonce)
    }

    pub(crate) fn hash_with_nonce(&self, nonce: u64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.hash_input_with_nonce(nonce).as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Search nonces until the hash has `difficulty` leading zero hex digits.
    pub fn mine(&mut self, difficulty: u32) {
        while !pow::meets_difficulty(&self.hash, difficulty) {
            self.nonce += 1;
            self.hash = self.compute_hash();
        }
    }

    /// Like [`Block::mine`], but gives up once `cancel` is set.
    pub fn mine_until(&mut self, difficulty: u32, cancel: &AtomicBool) -> MineOutcome {
        let mut attempts = 0u64;
        while !pow::meets_difficulty(&self.hash, difficulty) {
            if attempts % CANCEL_POLL_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
                return MineOutcome::Canceled { attempts };
            }
            self.nonce += 1;
            self.hash = self.compute_hash();
            attempts += 1;
        }
        MineOutcome::Mined { attempts }
    }

    /// Stored hash matches the content and every transaction is valid.
    /// Proof-of-work is checked by the chain, not here.
    pub fn is_valid(&self) -> bool {
        self.hash == self.compute_hash() && self.transactions.iter().all(Transaction::is_valid)
    }

    pub(crate) fn set_nonce(&mut self, nonce: u64) {
        self.nonce = nonce;
        self.hash = self.compute_hash();
    }

    #[cfg(test)]
    pub(crate) fn transactions_mut(&mut self) -> &mut Vec<Transaction> {
        &mut self.transactions
    }
}

impl std::fmt::Display for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let short = self.hash.get(..10).unwrap_or(&self.hash);
        write!(
            f,
            "Block #{} [{}...] with {} transaction(s)",
            self.index,
            short,
            self.transactions.len()
        )
    }
}

pub mod pow {
    /// Number of leading `'0'` characters in a hex digest.
    pub fn count_leading_zero_hex(hash: &str) -> u32 {
        hash.bytes().take_while(|b| *b == b'0').count() as u32
    }

    pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
        count_leading_zero_hex(hash) >= difficulty
    }
}
