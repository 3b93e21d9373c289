use log::debug;

use crate::block::block_digest;
use crate::hash::Hash;
use crate::transaction::Transaction;

/// Hash of the trial block used by mining and validation: the real nonce,
/// predecessor and batch, with index and timestamp pinned to zero so the
/// result does not depend on the wall clock.
pub fn proof_hash(nonce: u64, previous_hash: &Hash, transactions: &[Transaction]) -> Hash {
    block_digest(nonce, 0, 0, previous_hash, transactions)
}

pub fn valid_proof(
    nonce: u64,
    previous_hash: &Hash,
    transactions: &[Transaction],
    difficulty: usize,
) -> bool {
    proof_hash(nonce, previous_hash, transactions).has_leading_zeros(difficulty)
}

/// Smallest nonce whose proof hash starts with `difficulty` hex zeros.
///
/// CPU bound and unbounded; callers keep it off async worker threads.
pub fn search(transactions: &[Transaction], previous_hash: &Hash, difficulty: usize) -> u64 {
    let mut nonce = 0;
    while !valid_proof(nonce, previous_hash, transactions, difficulty) {
        nonce += 1;
    }
    debug!(
        "pow: found nonce {} over {} transactions at difficulty {}",
        nonce,
        transactions.len(),
        difficulty
    );
    nonce
}
