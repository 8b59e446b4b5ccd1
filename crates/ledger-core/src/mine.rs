use crate::{pow::meets_difficulty, Block};
use rayon::prelude::*;
use tracing::info;

/// Mines a copy of `block` by searching nonces in parallel until its hash has at
/// least `difficulty` leading zero hex digits.
///
/// Rayon splits the nonce range across threads, so the winning nonce is any
/// satisfying one, not necessarily the smallest. Returns `None` only if the
/// whole `u64` nonce space is exhausted.
pub fn mine_parallel(block: &Block, difficulty: u32) -> Option<Block> {
    if meets_difficulty(block.hash(), difficulty) {
        return Some(block.clone());
    }

    let found = (block.nonce()..u64::MAX)
        .into_par_iter()
        .find_any(|nonce| meets_difficulty(&block.hash_with_nonce(*nonce), difficulty))?;

    let mut mined = block.clone();
    mined.set_nonce(found);

    info!(
        "Mined block {} with nonce {} and hash {}",
        mined.index(),
        found,
        mined.hash()
    );
    Some(mined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{pow, Transaction};

    #[test]
    fn parallel_mining_meets_difficulty() {
        let txs = vec![Transaction::with_timestamp("Alice", "Bob", 10.0, 1_600_000_000.0)];
        let block = Block::new(1, txs, "abc", 1_600_000_200.0);
        let mined = mine_parallel(&block, 3).expect("nonce found");
        assert!(pow::meets_difficulty(mined.hash(), 3));
        assert!(mined.is_valid());
        assert_eq!(mined.index(), block.index());
        assert_eq!(mined.transactions(), block.transactions());
    }

    #[test]
    fn already_satisfied_block_is_returned_unchanged() {
        let block = Block::new(0, vec![], "0", 1.0);
        let mined = mine_parallel(&block, 0).expect("nonce found");
        assert_eq!(mined, block);
    }
}
