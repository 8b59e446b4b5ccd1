use std::fs;

use ledger_core::{BlockStore, Ledger, Transaction};
use ledger_storage::sled_store::SledStore;
use tempfile::{tempdir, TempDir};

pub fn create_temp_store() -> (TempDir, SledStore) {
    // Create a temporary directory for the sled database
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let db_path = temp_dir.path().to_path_buf();
    (
        temp_dir,
        SledStore::open(&db_path).expect("Failed to open SledStore"),
    )
}

/// A small mined ledger: genesis plus `blocks` blocks, each carrying one
/// user transaction and the reward.
pub fn mined_ledger(blocks: usize) -> Ledger {
    let mut ledger = Ledger::new(1, 10.0);
    for i in 0..blocks {
        ledger
            .submit_transaction(Transaction::new(format!("user-{i}"), "bob", (i + 1) as f64))
            .expect("valid transaction");
        ledger.mine_block("miner").expect("mined block");
    }
    ledger
}

pub fn persist_chain(store: &SledStore, ledger: &Ledger) {
    for block in ledger.chain() {
        store.persist_block(block).expect("Failed to persist block");
    }
}

pub fn teardown_store(temp_dir: TempDir, store: SledStore) {
    let db_path = temp_dir.path().to_path_buf();
    store.clear().expect("Failed to clear the store");
    drop(store);
    temp_dir.close().expect("Failed to delete temp dir");
    let _ = fs::remove_dir_all(&db_path);
    // Verify the directory is removed
    assert!(!db_path.exists(), "Database directory should be removed");
}
