//! Fixtures shared by unit tests.

use crate::block::Block;
use crate::config::{MINING_REWARD, MINING_SENDER};
use crate::pow;
use crate::transaction::Transaction;

/// Mines the block that follows `tip` over `transactions`.
pub(crate) fn mine_next(tip: &Block, transactions: Vec<Transaction>, difficulty: usize) -> Block {
    let nonce = pow::search(&transactions, &tip.get_hash(), difficulty);
    Block::new(nonce, tip.index(), tip.get_hash(), transactions)
}

/// A valid chain of `len` blocks (genesis included), each paying a reward to
/// `miner-<index>`.
pub(crate) fn mined_chain(len: usize, difficulty: usize) -> Vec<Block> {
    let mut blocks = vec![Block::new_genesis_block()];
    while blocks.len() < len {
        let reward = Transaction::new(
            MINING_SENDER,
            &format!("miner-{}", blocks.len()),
            MINING_REWARD,
        );
        let next = mine_next(&blocks[blocks.len() - 1], vec![reward], difficulty);
        blocks.push(next);
    }
    blocks
}
