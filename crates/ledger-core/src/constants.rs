pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;
/// A hex digest can't carry more leading zeros than it has characters.
pub const MAX_DIFFICULTY: u32 = HASH_HEX_SIZE as u32;
pub const DEFAULT_DIFFICULTY: u32 = 4;
pub const DEFAULT_MINING_REWARD: f64 = 10.0;
pub const SYSTEM_SENDER: &str = "SYSTEM";
pub const GENESIS_PREVIOUS_HASH: &str = "0";
/// How many nonces a cancellable search tries between checks of the cancel flag.
pub const CANCEL_POLL_INTERVAL: u64 = 1024;
