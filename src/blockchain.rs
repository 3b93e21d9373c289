use log::debug;

use crate::block::Block;
use crate::error::ChainError;
use crate::hash::Hash;
use crate::pow::valid_proof;

/// The ordered blocks of one node. Never empty: index 0 is the genesis block.
#[derive(Debug, Clone)]
pub struct Blockchain {
    blocks: Vec<Block>,
}

impl Default for Blockchain {
    fn default() -> Self {
        Blockchain::new()
    }
}

impl Blockchain {
    pub fn new() -> Blockchain {
        Blockchain {
            blocks: vec![Block::new_genesis_block()],
        }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn last_block(&self) -> &Block {
        // non-empty by construction, see `new` and `replace`
        &self.blocks[self.blocks.len() - 1]
    }

    /// Appends a block that directly follows the current tip.
    pub fn append(&mut self, block: Block) -> Result<(), ChainError> {
        let tip = self.last_block();
        if block.index() != tip.index() + 1 {
            return Err(ChainError::IndexMismatch {
                tip: tip.index(),
                actual: block.index(),
            });
        }
        if block.get_prev_hash() != tip.get_hash() {
            return Err(ChainError::PreviousHashMismatch);
        }
        self.blocks.push(block);
        Ok(())
    }

    /// Swaps in a whole new block sequence. Empty sequences are refused.
    pub fn replace(&mut self, blocks: Vec<Block>) -> bool {
        if blocks.is_empty() {
            return false;
        }
        self.blocks = blocks;
        true
    }

    /// Confirmed balance: everything received minus everything sent, over
    /// every block. Pending pool entries do not count.
    pub fn balance_of(&self, address: &str) -> f64 {
        let mut total = 0.0;
        for block in &self.blocks {
            for tx in block.get_transactions() {
                if tx.recipient() == address {
                    total += tx.value();
                }
                if tx.sender() == address {
                    total -= tx.value();
                }
            }
        }
        total
    }

    /// Full structural and proof-of-work check of a candidate chain.
    ///
    /// The genesis block must be empty, sit at index 0 and point at the zero
    /// hash. Every later block must follow its predecessor's index, point at
    /// the predecessor's recomputed hash, carry a proof meeting `difficulty`
    /// and store its own recomputed hash, as must each of its transactions.
    pub fn is_valid_chain(candidate: &[Block], difficulty: usize) -> bool {
        let genesis = match candidate.first() {
            Some(genesis) => genesis,
            None => {
                debug!("chain: empty candidate");
                return false;
            }
        };
        if genesis.index() != 0
            || genesis.get_prev_hash() != Hash::ZERO
            || !genesis.get_transactions().is_empty()
            || genesis.compute_hash() != genesis.get_hash()
        {
            debug!("chain: malformed genesis block at index {}", genesis.index());
            return false;
        }
        for pair in candidate.windows(2) {
            let (prev, block) = (&pair[0], &pair[1]);

            if block.index() != prev.index() + 1 {
                debug!(
                    "chain: invalid index {} after {}",
                    block.index(),
                    prev.index()
                );
                return false;
            }

            let prev_hash = prev.compute_hash();
            if prev_hash != prev.get_hash() || block.get_prev_hash() != prev_hash {
                debug!(
                    "chain: block {} does not link to {}",
                    block.index(),
                    prev_hash
                );
                return false;
            }

            if !valid_proof(
                block.nonce(),
                &block.get_prev_hash(),
                block.get_transactions(),
                difficulty,
            ) {
                debug!("chain: block {} has no valid proof", block.index());
                return false;
            }

            if block.compute_hash() != block.get_hash() {
                debug!("chain: block {} hash does not recompute", block.index());
                return false;
            }

            if let Some(tx) = block
                .get_transactions()
                .iter()
                .find(|tx| tx.compute_hash() != tx.hash())
            {
                debug!(
                    "chain: block {} carries transaction {} with a forged hash",
                    block.index(),
                    tx.hash()
                );
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MINING_SENDER;
    use crate::test_utils::{mine_next, mined_chain};
    use crate::transaction::Transaction;

    const DIFFICULTY: usize = 2;

    #[test]
    fn genesis_only_chain_is_valid() {
        let chain = Blockchain::new();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.last_block().index(), 0);
        assert!(Blockchain::is_valid_chain(chain.blocks(), DIFFICULTY));
    }

    #[test]
    fn empty_candidate_is_invalid() {
        assert!(!Blockchain::is_valid_chain(&[], DIFFICULTY));
    }

    #[test]
    fn mined_chain_is_valid_and_round_trips() {
        let blocks = mined_chain(4, DIFFICULTY);
        assert!(Blockchain::is_valid_chain(&blocks, DIFFICULTY));
        for block in &blocks {
            assert_eq!(block.compute_hash(), block.get_hash());
        }
    }

    #[test]
    fn proof_below_difficulty_is_rejected() {
        let blocks = mined_chain(3, 0);
        // nonce 0 everywhere; only valid if the hashes happen to start with zeros
        let lucky = blocks[1..]
            .iter()
            .all(|b| valid_proof(b.nonce(), &b.get_prev_hash(), b.get_transactions(), 4));
        assert_eq!(Blockchain::is_valid_chain(&blocks, 4), lucky);
    }

    #[test]
    fn tampered_transaction_is_rejected() {
        let mut blocks = mined_chain(3, DIFFICULTY);
        blocks[1] = blocks[1]
            .clone()
            .with_transactions(vec![Transaction::new(MINING_SENDER, "thief", 1_000.0)]);
        assert!(!Blockchain::is_valid_chain(&blocks, DIFFICULTY));

        // rehashing the forged block does not help: the proof no longer holds
        // or the successor no longer links to it
        blocks[1] = blocks[1].clone().rehashed();
        assert!(!Blockchain::is_valid_chain(&blocks, DIFFICULTY));
    }

    #[test]
    fn tampered_tip_hash_is_rejected() {
        let mut blocks = mined_chain(3, DIFFICULTY);
        let tip = blocks.pop().unwrap();
        blocks.push(tip.with_nonce(u64::MAX));
        assert!(!Blockchain::is_valid_chain(&blocks, DIFFICULTY));
    }

    #[test]
    fn wrong_index_is_rejected() {
        let mut blocks = mined_chain(3, DIFFICULTY);
        blocks[2] = blocks[2].clone().with_index(7).rehashed();
        assert!(!Blockchain::is_valid_chain(&blocks, DIFFICULTY));
    }

    #[test]
    fn broken_link_is_rejected() {
        let mut blocks = mined_chain(3, DIFFICULTY);
        blocks[2] = blocks[2]
            .clone()
            .with_previous_hash(Hash::digest(b"elsewhere"))
            .rehashed();
        assert!(!Blockchain::is_valid_chain(&blocks, DIFFICULTY));
    }

    #[test]
    fn forged_transaction_hash_is_rejected() {
        let mut json = serde_json::to_value(Transaction::new(MINING_SENDER, "alice", 7.0)).unwrap();
        json["hash"] = serde_json::Value::String(Hash::digest(b"forged").to_hex());
        let forged: Transaction = serde_json::from_value(json).unwrap();

        let genesis = Block::new_genesis_block();
        let block = mine_next(&genesis, vec![forged], DIFFICULTY);
        assert!(!Blockchain::is_valid_chain(&[genesis, block], DIFFICULTY));
    }

    #[test]
    fn genesis_must_be_empty_and_unlinked() {
        let forged = Block::new_genesis_block()
            .with_transactions(vec![Transaction::new(MINING_SENDER, "mallory", 1e9)])
            .with_index(42)
            .rehashed();
        let b1 = mine_next(&forged, Vec::new(), DIFFICULTY);
        let b2 = mine_next(&b1, Vec::new(), DIFFICULTY);
        assert!(!Blockchain::is_valid_chain(&[forged.clone(), b1, b2], DIFFICULTY));
        assert!(!Blockchain::is_valid_chain(&[forged], DIFFICULTY));

        let funded = Block::new_genesis_block()
            .with_transactions(vec![Transaction::new(MINING_SENDER, "mallory", 1e9)])
            .rehashed();
        assert!(!Blockchain::is_valid_chain(&[funded], DIFFICULTY));

        let linked = Block::new_genesis_block()
            .with_previous_hash(Hash::digest(b"elsewhere"))
            .rehashed();
        assert!(!Blockchain::is_valid_chain(&[linked], DIFFICULTY));

        let unhashed = Block::new_genesis_block().with_nonce(9);
        assert!(!Blockchain::is_valid_chain(&[unhashed], DIFFICULTY));
    }

    #[test]
    fn tampered_record_metadata_is_rejected() {
        let mut blocks = mined_chain(3, DIFFICULTY);
        let mut json = serde_json::to_value(&blocks[1]).unwrap();
        json["transactions"][0]["timestamp"] = serde_json::json!(1);
        json["transactions"][0]["status"] = serde_json::json!("Confirmed");
        blocks[1] = serde_json::from_value(json).unwrap();

        assert_ne!(blocks[1].compute_hash(), blocks[1].get_hash());
        assert!(!Blockchain::is_valid_chain(&blocks, DIFFICULTY));
    }

    #[test]
    fn append_requires_linkage() {
        let mut chain = Blockchain::new();
        let next = mine_next(chain.last_block(), Vec::new(), 0);
        let stale = next.clone();
        chain.append(next).unwrap();
        assert_eq!(chain.append(stale), Err(ChainError::IndexMismatch { tip: 1, actual: 1 }));

        let unlinked = Block::new(0, 1, Hash::digest(b"elsewhere"), Vec::new());
        assert_eq!(chain.append(unlinked), Err(ChainError::PreviousHashMismatch));
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn replace_refuses_empty() {
        let mut chain = Blockchain::new();
        assert!(!chain.replace(Vec::new()));
        assert_eq!(chain.len(), 1);
        assert!(chain.replace(mined_chain(3, 0)));
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn balance_sums_confirmed_transfers() {
        let mut chain = Blockchain::new();
        let b1 = mine_next(
            chain.last_block(),
            vec![
                Transaction::new(MINING_SENDER, "alice", 7.0),
                Transaction::new(MINING_SENDER, "bob", 1.0),
            ],
            0,
        );
        chain.append(b1).unwrap();
        let b2 = mine_next(
            chain.last_block(),
            vec![Transaction::new("alice", "bob", 2.5)],
            0,
        );
        chain.append(b2).unwrap();

        assert_eq!(chain.balance_of("alice"), 4.5);
        assert_eq!(chain.balance_of("bob"), 3.5);
        assert_eq!(chain.balance_of("carol"), 0.0);
        assert_eq!(chain.balance_of(MINING_SENDER), -8.0);
    }
}
