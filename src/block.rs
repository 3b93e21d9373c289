use serde::{Deserialize, Serialize};

use crate::hash::{CanonicalEncoder, Hash};
use crate::transaction::{timestamp_nanos, Transaction};

const BLOCK_DOMAIN: &str = "zero-ledger/block";

/// A mined batch of transactions linked to its predecessor.
///
/// There are no mutating accessors: once built, a block only changes by being
/// replaced as part of a whole chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    nonce: u64,
    index: u64,
    // nanoseconds since the unix epoch
    timestamp: u64,
    previous_hash: Hash,
    hash: Hash,
    transactions: Vec<Transaction>,
}

impl Block {
    /// Builds the block that follows `previous_index`, taking ownership of
    /// the batch the proof was found for.
    pub fn new(
        nonce: u64,
        previous_index: u64,
        previous_hash: Hash,
        transactions: Vec<Transaction>,
    ) -> Block {
        Block::assemble(
            nonce,
            previous_index + 1,
            timestamp_nanos(),
            previous_hash,
            transactions,
        )
    }

    pub fn new_genesis_block() -> Block {
        Block::assemble(0, 0, timestamp_nanos(), Hash::ZERO, Vec::new())
    }

    fn assemble(
        nonce: u64,
        index: u64,
        timestamp: u64,
        previous_hash: Hash,
        transactions: Vec<Transaction>,
    ) -> Block {
        let hash = block_digest(nonce, index, timestamp, &previous_hash, &transactions);
        Block {
            nonce,
            index,
            timestamp,
            previous_hash,
            hash,
            transactions,
        }
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn get_prev_hash(&self) -> Hash {
        self.previous_hash
    }

    pub fn get_hash(&self) -> Hash {
        self.hash
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Hash recomputed from the stored fields; equals `get_hash` for any
    /// block that was not tampered with.
    pub fn compute_hash(&self) -> Hash {
        block_digest(
            self.nonce,
            self.index,
            self.timestamp,
            &self.previous_hash,
            &self.transactions,
        )
    }
}

/// Canonical block hash. Mining calls this with index and timestamp set to
/// zero so the proof only depends on nonce, predecessor and batch.
pub(crate) fn block_digest(
    nonce: u64,
    index: u64,
    timestamp: u64,
    previous_hash: &Hash,
    transactions: &[Transaction],
) -> Hash {
    let mut enc = CanonicalEncoder::new(BLOCK_DOMAIN);
    enc.u64(nonce)
        .u64(index)
        .u64(timestamp)
        .hash(previous_hash)
        .count(transactions.len());
    for tx in transactions {
        tx.encode_into(&mut enc);
    }
    enc.digest()
}

#[cfg(test)]
impl Block {
    pub(crate) fn with_nonce(mut self, nonce: u64) -> Block {
        self.nonce = nonce;
        self
    }

    pub(crate) fn with_index(mut self, index: u64) -> Block {
        self.index = index;
        self
    }

    pub(crate) fn with_transactions(mut self, transactions: Vec<Transaction>) -> Block {
        self.transactions = transactions;
        self
    }

    pub(crate) fn with_previous_hash(mut self, previous_hash: Hash) -> Block {
        self.previous_hash = previous_hash;
        self
    }

    pub(crate) fn rehashed(mut self) -> Block {
        self.hash = self.compute_hash();
        self
    }
}
