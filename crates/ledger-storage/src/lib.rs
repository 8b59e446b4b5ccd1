pub mod memory_store;
pub mod sled_store;

pub use ledger_core::{BlockStore, StoreStats};
pub use memory_store::MemoryStore;
pub use sled_store::SledStore;
